use crate::config::ThrottleConfig;
use crate::engine::{AdmissionEngine, ThrottleLevel};
use crate::error::Tier;
use crate::identity::{BearerSubject, IdentityExtractor};
use crate::policy::EndpointKey;
use futures::future::BoxFuture;
use http::header::HeaderName;
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;
use tracing::debug;

/// Response header naming the tiers evaluated for a request.
pub const THROTTLE_LEVEL_HEADER: HeaderName = HeaderName::from_static("x-throttle-level");

/// A layer that puts two-tier admission control in front of a service.
///
/// Clones share one [`AdmissionEngine`], so every service produced by the
/// same layer counts against the same limits.
#[derive(Clone, Debug)]
pub struct ThrottleLayer {
    engine: Arc<AdmissionEngine>,
    identity: Arc<dyn IdentityExtractor>,
}

impl ThrottleLayer {
    /// Build from configuration, loading the endpoints file if one is set.
    pub fn new(config: ThrottleConfig) -> Self {
        Self::from_engine(AdmissionEngine::from_config(config))
    }

    pub fn from_engine(engine: AdmissionEngine) -> Self {
        Self { engine: Arc::new(engine), identity: Arc::new(BearerSubject) }
    }

    /// Replace how user IDs are read from requests.
    pub fn with_identity<I>(mut self, identity: I) -> Self
    where
        I: IdentityExtractor + 'static,
    {
        self.identity = Arc::new(identity);
        self
    }

    pub fn engine(&self) -> &Arc<AdmissionEngine> {
        &self.engine
    }
}

impl<S> Layer<S> for ThrottleLayer {
    type Service = ThrottleService<S>;

    fn layer(&self, service: S) -> Self::Service {
        ThrottleService {
            inner: service,
            engine: self.engine.clone(),
            identity: self.identity.clone(),
        }
    }
}

/// Middleware service that admits, delays or rejects each request.
///
/// Rejections are answered with `429 Too Many Requests` and an empty body;
/// the inner service is not called. Errors from the inner service pass
/// through unchanged.
#[derive(Clone, Debug)]
pub struct ThrottleService<S> {
    inner: S,
    engine: Arc<AdmissionEngine>,
    identity: Arc<dyn IdentityExtractor>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ThrottleService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let engine = self.engine.clone();
        // Keep the service that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let user_id = self.identity.user_id(req.headers());
        let key = EndpointKey::new(req.uri().path(), req.method().as_str());

        Box::pin(async move {
            let identified = user_id.is_some();
            match engine.acquire::<Infallible>(&key, user_id.as_deref()).await {
                Ok(permit) => {
                    let result = inner.call(req).await;
                    drop(permit);
                    let mut response = result?;
                    append_levels(response.headers_mut(), ThrottleLevel::evaluated(identified, false));
                    Ok(response)
                }
                Err(rejection) => {
                    let user_rejected = rejection.tier() == Some(Tier::User);
                    debug!(
                        target: "throttle::middleware",
                        endpoint = %key,
                        user = user_id.as_deref().unwrap_or("-"),
                        reason = %rejection,
                        "request throttled"
                    );
                    let mut response = Response::new(ResBody::default());
                    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
                    append_levels(
                        response.headers_mut(),
                        ThrottleLevel::evaluated(identified, user_rejected),
                    );
                    Ok(response)
                }
            }
        })
    }
}

fn append_levels(headers: &mut HeaderMap, levels: &[ThrottleLevel]) {
    for level in levels {
        headers.append(THROTTLE_LEVEL_HEADER, HeaderValue::from_static(level.as_str()));
    }
}

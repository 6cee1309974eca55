//! Compile-time prelude coverage test.
use http::{Request, Response, StatusCode};
use std::convert::Infallible;
use throttle::prelude::*;
use tower::{service_fn, ServiceExt};
use tower_layer::Layer;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let config = ThrottleConfig::default().endpoint(
        "/health",
        "GET",
        EndpointOverride::default().max_requests(1),
    );
    let engine = AdmissionEngine::new(PolicyStore::from_config(&config)).with_sleeper(TokioSleeper);
    let layer = ThrottleLayer::from_engine(engine).with_identity(BearerSubject);

    let svc: ThrottleService<_> = layer.layer(service_fn(|_req: Request<String>| async {
        Ok::<_, Infallible>(Response::new(String::new()))
    }));
    let response = svc
        .oneshot(Request::get("/health").body(String::new()).expect("request"))
        .await
        .expect("service call failed");
    assert_eq!(response.status(), StatusCode::OK);

    let policy: &RateLimitPolicy = layer.engine().policies().resolve(&EndpointKey::new("/health", "get"));
    assert_eq!(policy.max_requests, 1);
    let err: ThrottleError<Infallible> = ThrottleError::RetryExhausted { attempts: 1 };
    assert_eq!(err.tier(), Some(Tier::Endpoint));
    assert_eq!(ThrottleLevel::evaluated(false, false), &[ThrottleLevel::Endpoint]);
}

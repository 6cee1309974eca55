//! Two-tier admission for one request.
//!
//! Order: user tier (when a user ID is known) → endpoint tier → operation.
//! A user-tier rejection is final; the endpoint tier may wait and retry. The
//! two tiers never hold their locks at the same time.

use crate::config::ThrottleConfig;
use crate::endpoint::EndpointPermit;
use crate::error::ThrottleError;
use crate::policy::{EndpointKey, PolicyStore};
use crate::registry::StateRegistry;
use crate::sleeper::{Sleeper, TokioSleeper};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Tiers evaluated for a request, as reported in the `x-throttle-level` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleLevel {
    /// Anonymous request; only the endpoint tier applied.
    Endpoint,
    /// The user tier was evaluated.
    User,
    /// The user tier admitted the request and the endpoint tier was evaluated.
    EndpointOrGlobal,
}

impl ThrottleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThrottleLevel::Endpoint => "endpoint",
            ThrottleLevel::User => "user",
            ThrottleLevel::EndpointOrGlobal => "endpoint or global",
        }
    }

    /// Levels to report, in evaluation order.
    pub fn evaluated(identified: bool, user_rejected: bool) -> &'static [ThrottleLevel] {
        match (identified, user_rejected) {
            (false, _) => &[ThrottleLevel::Endpoint],
            (true, true) => &[ThrottleLevel::User],
            (true, false) => &[ThrottleLevel::User, ThrottleLevel::EndpointOrGlobal],
        }
    }
}

impl fmt::Display for ThrottleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policies, live state and the backoff sleeper for one middleware instance.
pub struct AdmissionEngine {
    policies: PolicyStore,
    registry: StateRegistry,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for AdmissionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionEngine")
            .field("policies", &self.policies)
            .field("endpoints", &self.registry.endpoint_count())
            .field("users", &self.registry.user_count())
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl AdmissionEngine {
    pub fn new(policies: PolicyStore) -> Self {
        Self { policies, registry: StateRegistry::new(), sleeper: Arc::new(TokioSleeper) }
    }

    /// Load the endpoints file if one is configured, then resolve policies.
    pub fn from_config(config: ThrottleConfig) -> Self {
        let config = config.with_endpoints_file();
        Self::new(PolicyStore::from_config(&config))
    }

    /// Replace the sleeper used between endpoint admission attempts.
    pub fn with_sleeper<S>(mut self, sleeper: S) -> Self
    where
        S: Sleeper + 'static,
    {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn policies(&self) -> &PolicyStore {
        &self.policies
    }

    pub fn registry(&self) -> &StateRegistry {
        &self.registry
    }

    /// Run both tiers and return the endpoint permit on admission.
    ///
    /// An empty user ID counts as anonymous.
    pub async fn acquire<E>(
        &self,
        key: &EndpointKey,
        user_id: Option<&str>,
    ) -> Result<EndpointPermit, ThrottleError<E>> {
        if let Some(user_id) = user_id.filter(|id| !id.is_empty()) {
            self.registry.user(key, user_id, &self.policies).try_admit::<E>()?;
        }
        let state = self.registry.endpoint(key, &self.policies);
        state.acquire(self.sleeper.as_ref()).await
    }

    /// Admit, run `operation`, then free the endpoint slot.
    pub async fn execute<T, E, Fut, Op>(
        &self,
        key: &EndpointKey,
        user_id: Option<&str>,
        operation: Op,
    ) -> Result<T, ThrottleError<E>>
    where
        Fut: Future<Output = Result<T, E>>,
        Op: FnOnce() -> Fut,
    {
        let permit = self.acquire::<E>(key, user_id).await?;
        let result = operation().await.map_err(ThrottleError::Inner);
        drop(permit);
        result
    }
}

//! Convenient re-exports for common throttle types.
pub use crate::{
    config::{EndpointOverride, ThrottleConfig},
    engine::{AdmissionEngine, ThrottleLevel},
    error::{ThrottleError, Tier},
    identity::{BearerSubject, IdentityExtractor},
    middleware::{ThrottleLayer, ThrottleService},
    policy::{EndpointKey, PolicyStore, RateLimitPolicy},
    sleeper::{Sleeper, TokioSleeper},
};

#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # throttle
//!
//! In-process admission control for tower HTTP services. Every request passes
//! two independent tiers before it reaches the inner service:
//!
//! - **User tier**, keyed by (path, method, user): at most `userMaxRequests`
//!   outstanding admissions; each slot is given back `userRetryDelay` after it
//!   was taken. No waiting; a user at the limit gets `429` straight away.
//! - **Endpoint tier**, keyed by (path, method): at most `maxRequests`
//!   concurrent requests, with up to `maxQueue` requests waiting and
//!   `retryCount` extra attempts spaced `retryDelay` apart.
//!
//! Users are identified by the `sub` claim of an `Authorization: Bearer` JWT,
//! decoded without signature verification. Requests without one skip the user
//! tier.
//!
//! All state is local to one process and is never evicted.
//!
//! ## Quick Start
//!
//! ```rust
//! use http::{Request, Response, StatusCode};
//! use std::convert::Infallible;
//! use throttle::{EndpointOverride, ThrottleConfig, ThrottleLayer};
//! use tower::{ServiceBuilder, ServiceExt};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let config = ThrottleConfig::from_yaml_str("maxRequests: 20\nmaxQueue: 5\nretryDelay: 50ms")
//!     .expect("valid config")
//!     .endpoint("/api/v1/resource", "GET", EndpointOverride::default().max_requests(2));
//!
//! let service = ServiceBuilder::new()
//!     .layer(ThrottleLayer::new(config))
//!     .service_fn(|_req: Request<String>| async {
//!         Ok::<_, Infallible>(Response::new(String::from("ok")))
//!     });
//!
//! let request = Request::get("/api/v1/resource").body(String::new()).unwrap();
//! let response = service.oneshot(request).await.unwrap();
//! assert_eq!(response.status(), StatusCode::OK);
//! assert_eq!(response.headers()["x-throttle-level"], "endpoint");
//! # });
//! ```

pub mod config;
pub mod duration;
pub mod endpoint;
pub mod engine;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod policy;
pub mod prelude;
pub mod registry;
pub mod sleeper;
pub mod user;

// Re-exports
pub use config::{EndpointOverride, ThrottleConfig};
pub use endpoint::{EndpointPermit, EndpointState};
pub use engine::{AdmissionEngine, ThrottleLevel};
pub use error::{ConfigError, ThrottleError, Tier};
pub use identity::{Anonymous, BearerSubject, IdentityExtractor};
pub use middleware::{ThrottleLayer, ThrottleService, THROTTLE_LEVEL_HEADER};
pub use policy::{EndpointKey, EndpointLimits, PolicyStore, RateLimitPolicy, UserLimits};
pub use registry::StateRegistry;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use user::UserState;

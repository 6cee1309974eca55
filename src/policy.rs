//! Resolved rate-limit policies.
//!
//! [`PolicyStore`] turns a [`ThrottleConfig`] into fully-populated
//! [`RateLimitPolicy`] values once, at construction. Every duration string is
//! parsed here; nothing is parsed on the request path. After construction the
//! store is read-only.

use crate::config::{EndpointOverride, ThrottleConfig};
use crate::duration::{parse_logged, DEFAULT_RETRY_DELAY, DEFAULT_USER_RETRY_DELAY};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Identity of an endpoint: request path plus HTTP method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    path: String,
    method: String,
}

impl EndpointKey {
    /// Methods are compared upper-cased.
    pub fn new(path: impl Into<String>, method: impl AsRef<str>) -> Self {
        Self { path: path.into(), method: method.as_ref().to_ascii_uppercase() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.path, self.method)
    }
}

/// Every limit that applies to one endpoint, with no unset fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: usize,
    pub max_queue: usize,
    pub retry_count: usize,
    pub retry_delay: Duration,
    pub user_max_requests: usize,
    /// How long a user slot stays taken after admission.
    pub user_retry_delay: Duration,
}

impl RateLimitPolicy {
    /// The endpoint-tier part of this policy.
    pub fn endpoint_limits(&self) -> EndpointLimits {
        EndpointLimits {
            max_requests: self.max_requests,
            max_queue: self.max_queue,
            retry_count: self.retry_count,
            retry_delay: self.retry_delay,
        }
    }

    /// The user-tier part of this policy.
    pub fn user_limits(&self) -> UserLimits {
        UserLimits { max_requests: self.user_max_requests, release_delay: self.user_retry_delay }
    }

    /// Apply `over` on top of `self`, field by field.
    fn merged(&self, over: &EndpointOverride, scope: &str) -> Self {
        let retry_delay = match over.retry_delay.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                parse_logged(raw, DEFAULT_RETRY_DELAY, scope, "retryDelay")
            }
            _ => self.retry_delay,
        };
        let user_retry_delay = match over.user_retry_delay.as_deref() {
            Some(raw) if !raw.trim().is_empty() => {
                parse_logged(raw, DEFAULT_USER_RETRY_DELAY, scope, "userRetryDelay")
            }
            _ => self.user_retry_delay,
        };
        Self {
            max_requests: over.max_requests.unwrap_or(self.max_requests),
            max_queue: over.max_queue.unwrap_or(self.max_queue),
            retry_count: over.retry_count.unwrap_or(self.retry_count),
            retry_delay,
            user_max_requests: over
                .user_max_requests
                .filter(|n| *n > 0)
                .unwrap_or(self.user_max_requests),
            user_retry_delay,
        }
    }
}

/// Limits copied into an [`EndpointState`](crate::endpoint::EndpointState).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointLimits {
    pub max_requests: usize,
    pub max_queue: usize,
    /// Extra attempts after the first.
    pub retry_count: usize,
    pub retry_delay: Duration,
}

/// Limits copied into a [`UserState`](crate::user::UserState).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserLimits {
    pub max_requests: usize,
    pub release_delay: Duration,
}

/// Global policy plus per-endpoint overrides, resolved once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStore {
    global: RateLimitPolicy,
    overrides: HashMap<EndpointKey, RateLimitPolicy>,
}

impl PolicyStore {
    /// A store with only a global policy.
    pub fn new(global: RateLimitPolicy) -> Self {
        Self { global, overrides: HashMap::new() }
    }

    /// Add a fully-resolved override for `key`.
    pub fn with_override(mut self, key: EndpointKey, policy: RateLimitPolicy) -> Self {
        self.overrides.insert(key, policy);
        self
    }

    /// Resolve a configuration tree. Bad durations are logged and replaced.
    pub fn from_config(config: &ThrottleConfig) -> Self {
        let global = RateLimitPolicy {
            max_requests: config.max_requests,
            max_queue: config.max_queue,
            retry_count: config.retry_count,
            retry_delay: parse_logged(&config.retry_delay, DEFAULT_RETRY_DELAY, "global", "retryDelay"),
            user_max_requests: config.user_max_requests,
            user_retry_delay: parse_logged(
                &config.user_retry_delay,
                DEFAULT_USER_RETRY_DELAY,
                "global",
                "userRetryDelay",
            ),
        };

        let mut overrides = HashMap::new();
        for (path, methods) in &config.endpoints {
            for (method, over) in methods {
                let key = EndpointKey::new(path.clone(), method);
                let policy = global.merged(over, &key.to_string());
                overrides.insert(key, policy);
            }
        }

        Self { global, overrides }
    }

    pub fn global(&self) -> &RateLimitPolicy {
        &self.global
    }

    /// The override for `key`, or the global policy.
    pub fn resolve(&self, key: &EndpointKey) -> &RateLimitPolicy {
        self.overrides.get(key).unwrap_or(&self.global)
    }

    /// Whether `key` has its own override.
    pub fn has_override(&self, key: &EndpointKey) -> bool {
        self.overrides.contains_key(key)
    }
}

impl Default for PolicyStore {
    fn default() -> Self {
        Self::from_config(&ThrottleConfig::default())
    }
}

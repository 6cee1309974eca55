//! Error types for admission control
use std::fmt;

/// Which admission tier produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Shared limit for a (path, method) pair.
    Endpoint,
    /// Limit for one user at a (path, method) pair.
    User,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Endpoint => write!(f, "endpoint"),
            Tier::User => write!(f, "user"),
        }
    }
}

/// Unified error type for admission decisions and the wrapped operation.
///
/// Every variant except `Inner` is a rate-limit rejection and maps to
/// `429 Too Many Requests` at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleError<E> {
    /// The endpoint wait queue was full when the request tried to wait.
    QueueFull { queued: usize, max_queue: usize },
    /// Every endpoint admission attempt found the endpoint at capacity.
    RetryExhausted { attempts: usize },
    /// The user already holds all of their slots for this endpoint.
    UserLimit { in_flight: usize, max: usize },
    /// The admitted operation itself failed.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for ThrottleError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull { queued, max_queue } => {
                write!(f, "endpoint queue full ({} queued, max {})", queued, max_queue)
            }
            Self::RetryExhausted { attempts } => {
                write!(f, "endpoint at capacity after {} admission attempts", attempts)
            }
            Self::UserLimit { in_flight, max } => {
                write!(f, "user limit reached ({} outstanding, max {})", in_flight, max)
            }
            Self::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ThrottleError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> ThrottleError<E> {
    /// True for every admission rejection.
    pub fn is_rate_limited(&self) -> bool {
        !self.is_inner()
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }

    pub fn is_retry_exhausted(&self) -> bool {
        matches!(self, Self::RetryExhausted { .. })
    }

    pub fn is_user_limit(&self) -> bool {
        matches!(self, Self::UserLimit { .. })
    }

    /// Check if this error wraps an inner error.
    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    /// The tier that rejected the request, `None` for inner errors.
    pub fn tier(&self) -> Option<Tier> {
        match self {
            Self::QueueFull { .. } | Self::RetryExhausted { .. } => Some(Tier::Endpoint),
            Self::UserLimit { .. } => Some(Tier::User),
            Self::Inner(_) => None,
        }
    }

    /// Get the inner error if this is an Inner variant
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

/// Failure to read or decode a throttle configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to open config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);
    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for DummyError {}

    #[test]
    fn queue_full_display() {
        let err: ThrottleError<io::Error> = ThrottleError::QueueFull { queued: 4, max_queue: 4 };
        let msg = err.to_string();
        assert!(msg.contains("queue full"));
        assert!(msg.contains("4"));
    }

    #[test]
    fn user_limit_display() {
        let err: ThrottleError<io::Error> = ThrottleError::UserLimit { in_flight: 2, max: 2 };
        assert!(err.to_string().contains("user limit"));
    }

    #[test]
    fn tiers_follow_variants() {
        let q: ThrottleError<DummyError> = ThrottleError::QueueFull { queued: 1, max_queue: 1 };
        let r: ThrottleError<DummyError> = ThrottleError::RetryExhausted { attempts: 3 };
        let u: ThrottleError<DummyError> = ThrottleError::UserLimit { in_flight: 1, max: 1 };
        let i = ThrottleError::Inner(DummyError("boom"));
        assert_eq!(q.tier(), Some(Tier::Endpoint));
        assert_eq!(r.tier(), Some(Tier::Endpoint));
        assert_eq!(u.tier(), Some(Tier::User));
        assert_eq!(i.tier(), None);
        assert!(q.is_rate_limited() && r.is_rate_limited() && u.is_rate_limited());
        assert!(!i.is_rate_limited());
    }

    #[test]
    fn source_only_for_inner() {
        let inner = ThrottleError::Inner(DummyError("x"));
        assert_eq!(inner.source().unwrap().to_string(), "x");
        let rejected: ThrottleError<DummyError> = ThrottleError::RetryExhausted { attempts: 1 };
        assert!(rejected.source().is_none());
    }
}

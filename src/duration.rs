//! Duration strings from configuration.
//!
//! Configuration carries delays as human-readable strings (`"200ms"`, `"1s"`,
//! `"1h 30m"`). Fractional values such as `"1.5s"` or `"0.5m"` are not
//! accepted; write `"1500ms"` or `"30s"` instead.
//!
//! A bad value never stops the middleware from starting: the caller gets the
//! fallback back together with the parse error so it can log and carry on.

use std::time::Duration;

/// Fallback for an endpoint retry delay that is missing or unparsable.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Fallback for a user release delay that is missing or unparsable.
pub const DEFAULT_USER_RETRY_DELAY: Duration = Duration::from_secs(1);

/// A duration string that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid duration {value:?} ({reason}); using {fallback:?}")]
pub struct DurationError {
    /// The rejected input.
    pub value: String,
    /// Parser message.
    pub reason: String,
    /// The value substituted for the bad input.
    pub fallback: Duration,
}

/// Parse `value`, returning `fallback` for an empty string.
///
/// On a parse failure the error carries `fallback`; use
/// [`DurationError::fallback`] as the effective value.
pub fn parse_duration_or(value: &str, fallback: Duration) -> Result<Duration, DurationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(fallback);
    }
    humantime::parse_duration(trimmed).map_err(|e| DurationError {
        value: value.to_string(),
        reason: e.to_string(),
        fallback,
    })
}

/// Parse `value` and log a warning for `scope` when it falls back.
pub(crate) fn parse_logged(value: &str, fallback: Duration, scope: &str, field: &str) -> Duration {
    match parse_duration_or(value, fallback) {
        Ok(d) => d,
        Err(err) => {
            tracing::warn!(
                target: "throttle::config",
                scope = %scope,
                field = %field,
                value = %err.value,
                fallback = ?err.fallback,
                "invalid duration in throttle config; using fallback"
            );
            err.fallback
        }
    }
}

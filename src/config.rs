//! Throttle configuration tree.
//!
//! A configuration has one set of global limits plus optional overrides keyed
//! by path and then HTTP method:
//!
//! ```yaml
//! maxRequests: 10
//! maxQueue: 2
//! retryCount: 3
//! retryDelay: 200ms
//! userMaxRequests: 1
//! userRetryDelay: 1s
//! endpoints:
//!   /api/v1/resource:
//!     GET:
//!       maxRequests: 2
//!       userMaxRequests: 5
//! ```
//!
//! Fields an override leaves out are inherited from the global values when the
//! [`PolicyStore`](crate::policy::PolicyStore) is resolved.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level configuration as decoded from YAML or JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThrottleConfig {
    /// Optional YAML file that replaces this whole configuration when loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoints_config_location: Option<PathBuf>,
    /// Concurrent requests allowed per (path, method).
    pub max_requests: usize,
    /// Requests allowed to wait per (path, method).
    pub max_queue: usize,
    /// Extra admission attempts after the first.
    pub retry_count: usize,
    /// Pause between admission attempts.
    pub retry_delay: String,
    /// Outstanding admissions allowed per user per (path, method).
    pub user_max_requests: usize,
    /// How long a user slot stays taken after admission.
    pub user_retry_delay: String,
    /// Overrides by path, then by method.
    pub endpoints: HashMap<String, HashMap<String, EndpointOverride>>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            endpoints_config_location: None,
            max_requests: 10,
            max_queue: 0,
            retry_count: 3,
            retry_delay: "200ms".to_string(),
            user_max_requests: 1,
            user_retry_delay: "1s".to_string(),
            endpoints: HashMap::new(),
        }
    }
}

/// Per-(path, method) override. `None` inherits the global value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_queue: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<String>,
    /// `Some(0)` is treated like `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_max_requests: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_retry_delay: Option<String>,
}

impl EndpointOverride {
    pub fn max_requests(mut self, n: usize) -> Self {
        self.max_requests = Some(n);
        self
    }

    pub fn max_queue(mut self, n: usize) -> Self {
        self.max_queue = Some(n);
        self
    }

    pub fn retry_count(mut self, n: usize) -> Self {
        self.retry_count = Some(n);
        self
    }

    pub fn retry_delay(mut self, delay: impl Into<String>) -> Self {
        self.retry_delay = Some(delay.into());
        self
    }

    pub fn user_max_requests(mut self, n: usize) -> Self {
        self.user_max_requests = Some(n);
        self
    }

    pub fn user_retry_delay(mut self, delay: impl Into<String>) -> Self {
        self.user_retry_delay = Some(delay.into());
        self
    }
}

impl ThrottleConfig {
    /// Decode a YAML document. Missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Decode a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and decode a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Add or replace the override for `path` and `method`.
    pub fn endpoint(
        mut self,
        path: impl Into<String>,
        method: impl Into<String>,
        limits: EndpointOverride,
    ) -> Self {
        self.endpoints.entry(path.into()).or_default().insert(method.into(), limits);
        self
    }

    /// Replace this configuration with the one at `endpoints_config_location`.
    ///
    /// Without a location (or with an empty one) this is a no-op. A file that cannot be read or
    /// decoded is logged and the current configuration is kept.
    pub fn with_endpoints_file(self) -> Self {
        let Some(location) =
            self.endpoints_config_location.clone().filter(|p| !p.as_os_str().is_empty())
        else {
            return self;
        };
        match Self::from_yaml_file(&location) {
            Ok(loaded) => {
                tracing::debug!(
                    target: "throttle::config",
                    path = %location.display(),
                    endpoints = loaded.endpoints.len(),
                    "loaded endpoints config"
                );
                loaded
            }
            Err(err) => {
                tracing::warn!(
                    target: "throttle::config",
                    path = %location.display(),
                    error = %err,
                    "failed to load endpoints config from file; keeping current config"
                );
                self
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ThrottleConfig::default();
        assert_eq!(cfg.max_requests, 10);
        assert_eq!(cfg.max_queue, 0);
        assert_eq!(cfg.retry_count, 3);
        assert_eq!(cfg.retry_delay, "200ms");
        assert_eq!(cfg.user_max_requests, 1);
        assert_eq!(cfg.user_retry_delay, "1s");
        assert!(cfg.endpoints.is_empty());
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let cfg = ThrottleConfig::from_yaml_str(
            r#"
maxRequests: 4
endpoints:
  /api/v1/resource:
    GET:
      maxRequests: 1
      retryDelay: 10ms
"#,
        )
        .expect("valid yaml");
        assert_eq!(cfg.max_requests, 4);
        assert_eq!(cfg.retry_count, 3);
        let over = &cfg.endpoints["/api/v1/resource"]["GET"];
        assert_eq!(over.max_requests, Some(1));
        assert_eq!(over.retry_delay.as_deref(), Some("10ms"));
        assert_eq!(over.max_queue, None);
        assert_eq!(over.user_max_requests, None);
    }

    #[test]
    fn json_uses_camel_case() {
        let cfg = ThrottleConfig::from_json_str(
            r#"{"maxQueue": 3, "userMaxRequests": 2, "endpoints": {"/x": {"POST": {"retryCount": 0}}}}"#,
        )
        .expect("valid json");
        assert_eq!(cfg.max_queue, 3);
        assert_eq!(cfg.user_max_requests, 2);
        assert_eq!(cfg.endpoints["/x"]["POST"].retry_count, Some(0));
    }

    #[test]
    fn bad_yaml_is_an_error() {
        let err = ThrottleConfig::from_yaml_str("maxRequests: [nope").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn endpoints_file_replaces_config() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "maxRequests: 2\nretryDelay: 5ms").expect("write");

        let cfg = ThrottleConfig {
            endpoints_config_location: Some(file.path().to_path_buf()),
            max_requests: 99,
            ..ThrottleConfig::default()
        }
        .with_endpoints_file();

        assert_eq!(cfg.max_requests, 2);
        assert_eq!(cfg.retry_delay, "5ms");
        assert_eq!(cfg.endpoints_config_location, None);
    }

    #[test]
    fn unreadable_endpoints_file_keeps_config() {
        let cfg = ThrottleConfig {
            endpoints_config_location: Some(PathBuf::from("/definitely/not/here.yaml")),
            max_requests: 7,
            ..ThrottleConfig::default()
        };
        let kept = cfg.clone().with_endpoints_file();
        assert_eq!(kept, cfg);
    }

    #[test]
    fn endpoint_builder_inserts_by_path_and_method() {
        let cfg = ThrottleConfig::default()
            .endpoint("/a", "GET", EndpointOverride::default().max_requests(1))
            .endpoint("/a", "POST", EndpointOverride::default().max_queue(4));
        assert_eq!(cfg.endpoints["/a"].len(), 2);
        assert_eq!(cfg.endpoints["/a"]["POST"].max_queue, Some(4));
    }

    #[test]
    fn empty_endpoints_location_is_ignored() {
        let cfg = ThrottleConfig::from_yaml_str("endpointsConfigLocation: \"\"\nmaxRequests: 5").expect("yaml");
        assert_eq!(cfg.endpoints_config_location, Some(PathBuf::new()));
        let kept = cfg.clone().with_endpoints_file();
        assert_eq!(kept, cfg);
    }
}

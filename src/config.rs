//! Engine configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides:
//!
//! ```json
//! { "discoveryWindowMs": 5000, "emptyResult": "fail" }
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What a session reports when its window closes with nothing found
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyResultPolicy {
    /// `on_completed` with no prior `on_resources_found`
    #[default]
    Complete,
    /// `on_failed` with a timeout cause
    Fail,
}

/// Terminal notification delivered when a caller cancels a session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancellationPolicy {
    /// `on_failed` with a cancellation cause
    #[default]
    Notify,
    /// No terminal callback; the notifier is released silently
    Silent,
}

/// Send retry schedule for discovery requests
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before each retry; the last entry repeats when attempts outnumber it
    pub backoff_ms: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: vec![100, 500, 2000],
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: Vec::new(),
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let idx = attempt.saturating_sub(1) as usize;
        let ms = self
            .backoff_ms
            .get(idx)
            .or_else(|| self.backoff_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub discovery_window_ms: u64,
    pub retry: RetryPolicy,
    pub empty_result: EmptyResultPolicy,
    pub cancellation: CancellationPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            discovery_window_ms: 3000,
            retry: RetryPolicy::default(),
            empty_result: EmptyResultPolicy::default(),
            cancellation: CancellationPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_millis(self.discovery_window_ms)
    }

    pub fn with_discovery_window(mut self, window: Duration) -> Self {
        self.discovery_window_ms = window.as_millis() as u64;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_empty_result(mut self, policy: EmptyResultPolicy) -> Self {
        self.empty_result = policy;
        self
    }

    pub fn with_cancellation(mut self, policy: CancellationPolicy) -> Self {
        self.cancellation = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.discovery_window(), Duration::from_secs(3));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.empty_result, EmptyResultPolicy::Complete);
        assert_eq!(config.cancellation, CancellationPolicy::Notify);
    }

    #[test]
    fn test_partial_json_overrides() {
        let config =
            EngineConfig::from_json_str(r#"{"discoveryWindowMs":500,"emptyResult":"fail"}"#)
                .unwrap();
        assert_eq!(config.discovery_window_ms, 500);
        assert_eq!(config.empty_result, EmptyResultPolicy::Fail);
        assert_eq!(config.retry, RetryPolicy::default());

        assert!(EngineConfig::from_json_str(r#"{"emptyResult":"maybe"}"#).is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"cancellation":"silent","retry":{{"maxAttempts":5,"backoffMs":[10]}}}}"#
        )
        .unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.cancellation, CancellationPolicy::Silent);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.discovery_window_ms, 3000);
    }

    #[test]
    fn test_backoff_schedule() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(500));
        assert_eq!(retry.backoff(3), Duration::from_millis(2000));
        assert_eq!(retry.backoff(7), Duration::from_millis(2000));
        assert_eq!(RetryPolicy::no_retry().backoff(1), Duration::ZERO);
    }
}

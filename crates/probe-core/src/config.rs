//! Probe configuration
//!
//! Every field has a default, so an empty TOML document is a complete
//! configuration that measures `my-secret`/`time` through `my-pod`.

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use crate::types::ConsumerSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level probe configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// What to measure
    pub target: TargetConfig,
    /// Updater behavior
    pub update: UpdateConfig,
    /// Watcher behavior
    pub watch: WatchConfig,
    /// Session wiring
    pub session: SessionConfig,
}

impl ProbeConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    ///
    /// # Errors
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize configuration to TOML
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// With secret name and key
    #[inline]
    #[must_use]
    pub fn with_secret(mut self, name: impl Into<String>, key: impl Into<String>) -> Self {
        self.target.secret_name = name.into();
        self.target.secret_key = key.into();
        self
    }

    /// With pod name
    #[inline]
    #[must_use]
    pub fn with_pod(mut self, name: impl Into<String>) -> Self {
        self.target.pod_name = name.into();
        self
    }

    /// With poll interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.watch.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With write retry policy
    #[inline]
    #[must_use]
    pub fn with_write_retry(mut self, retry: RetryPolicy) -> Self {
        self.update.retry = retry;
        self
    }

    /// Reject values the session cannot run with
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.target;
        require_name("target.secret_name", &t.secret_name)?;
        require_name("target.pod_name", &t.pod_name)?;
        if t.secret_key.is_empty() {
            return Err(ConfigError::invalid("target.secret_key", "must not be empty"));
        }
        if t.secret_key.contains('/') {
            return Err(ConfigError::invalid(
                "target.secret_key",
                "must be a file name, not a path",
            ));
        }
        if t.image.trim().is_empty() {
            return Err(ConfigError::invalid("target.image", "must not be empty"));
        }
        if !t.mount_path.starts_with('/') {
            return Err(ConfigError::invalid(
                "target.mount_path",
                format!("{:?} is not an absolute path", t.mount_path),
            ));
        }
        if self.update.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("update.retry.max_attempts", "must be at least 1"));
        }
        if self.update.annotate_consumer && self.update.annotation_key.is_empty() {
            return Err(ConfigError::invalid(
                "update.annotation_key",
                "required when annotate_consumer is enabled",
            ));
        }
        if self.watch.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("watch.poll_interval_ms", "must be positive"));
        }
        if self.session.channel_capacity == 0 {
            return Err(ConfigError::invalid("session.channel_capacity", "must be positive"));
        }
        Ok(())
    }

    /// Consumer described by this configuration
    #[must_use]
    pub fn consumer_spec(&self) -> ConsumerSpec {
        ConsumerSpec {
            name: self.target.pod_name.clone(),
            object_name: self.target.secret_name.clone(),
            image: self.target.image.clone(),
            mount_path: self.target.mount_path.clone(),
        }
    }
}

fn require_name(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    let valid = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    if !valid || value.starts_with('-') || value.ends_with('-') {
        return Err(ConfigError::invalid(
            field,
            format!("{value:?} is not a valid object name"),
        ));
    }
    Ok(())
}

/// Object, key and consumer under measurement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Data object name
    pub secret_name: String,
    /// Key inside the object (also the mounted file name)
    pub secret_key: String,
    /// Consumer name
    pub pod_name: String,
    /// Consumer image; needs `sh`, `cat` and `sleep`
    pub image: String,
    /// Directory the object is mounted at
    pub mount_path: String,
    /// Value written during setup, before the first measured write
    pub initial_value: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            secret_name: "my-secret".to_string(),
            secret_key: "time".to_string(),
            pod_name: "my-pod".to_string(),
            image: "busybox".to_string(),
            mount_path: "/secrets".to_string(),
            initial_value: "initial-value".to_string(),
        }
    }
}

/// Updater configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Annotate the consumer with every written value
    pub annotate_consumer: bool,
    /// Annotation key used when `annotate_consumer` is set
    pub annotation_key: String,
    /// Retry policy for each write
    pub retry: RetryPolicy,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            annotate_consumer: false,
            annotation_key: "example.com/time-annotation".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Watcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// How often the consumer re-reads the mounted file
    pub poll_interval_ms: u64,
    /// Times the stream may be reopened after it ends
    pub max_reopens: u32,
    /// Delay before the first reopen; doubles per consecutive attempt
    pub reopen_backoff_ms: u64,
}

impl WatchConfig {
    /// Poll interval as a duration
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff policy for reopening the stream
    #[inline]
    #[must_use]
    pub fn reopen_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_reopens,
            initial_backoff_ms: self.reopen_backoff_ms,
            max_backoff_ms: self.reopen_backoff_ms.saturating_mul(16),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_reopens: 0,
            reopen_backoff_ms: 1000,
        }
    }
}

/// Session wiring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the write and observation channels
    pub channel_capacity: usize,
    /// Delete the consumer and object after a clean shutdown
    pub teardown_on_exit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1,
            teardown_on_exit: false,
        }
    }
}

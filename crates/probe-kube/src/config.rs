//! kubectl invocation settings

use probe_core::ConfigError;
use serde::{Deserialize, Serialize};

/// How kubectl is invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubectlConfig {
    /// Executable name or path
    pub binary: String,
    /// Namespace passed as `--namespace`
    pub namespace: Option<String>,
    /// Context passed as `--context`
    pub context: Option<String>,
    /// Readiness wait limit; kubectl's own default applies when unset
    pub ready_timeout_secs: Option<u64>,
}

impl Default for KubectlConfig {
    fn default() -> Self {
        Self {
            binary: "kubectl".to_string(),
            namespace: None,
            context: None,
            ready_timeout_secs: None,
        }
    }
}

impl KubectlConfig {
    /// Create new config with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set executable
    #[inline]
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Set namespace
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set context
    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Set readiness wait limit
    #[inline]
    #[must_use]
    pub fn with_ready_timeout(mut self, secs: u64) -> Self {
        self.ready_timeout_secs = Some(secs);
        self
    }

    /// Flags placed before every subcommand
    #[must_use]
    pub fn global_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        if let Some(namespace) = &self.namespace {
            args.push("--namespace".to_string());
            args.push(namespace.clone());
        }
        args
    }

    /// Check the settings before any command runs
    ///
    /// # Errors
    /// Returns `ConfigError::Invalid` for an empty binary, namespace or context.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.binary.trim().is_empty() {
            return Err(ConfigError::invalid("kubectl.binary", "must not be empty"));
        }
        if self.namespace.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::invalid("kubectl.namespace", "must not be empty when set"));
        }
        if self.context.as_deref().is_some_and(str::is_empty) {
            return Err(ConfigError::invalid("kubectl.context", "must not be empty when set"));
        }
        if self.ready_timeout_secs == Some(0) {
            return Err(ConfigError::invalid("kubectl.ready_timeout_secs", "must be greater than zero"));
        }
        Ok(())
    }
}

//! Error types for the probe
//!
//! Errors fall into two groups:
//! - Cycle-local failures (parse, write) that are logged and skipped
//! - Structural failures (setup, closed channels) that end the session

use std::fmt;
use std::num::ParseIntError;

/// Main probe error type
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// Provisioning the object or consumer failed
    #[error("setup failed while trying to {stage}: {source}")]
    Setup {
        /// Step that failed
        stage: SetupStage,
        /// Underlying controller failure
        #[source]
        source: ControllerError,
    },

    /// The observation stream could not be opened
    #[error("failed to open observation stream: {0}")]
    ObservationOpen(#[source] ObservationError),

    /// The watcher stopped producing observations
    #[error("observation stream closed; consumer exited or transport was severed")]
    ObservationStreamClosed,

    /// The updater stopped accepting triggers or producing writes
    #[error("updater stopped; no further writes can be measured")]
    UpdaterClosed,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Writing the primary output failed
    #[error("failed to write latency report: {0}")]
    Report(#[from] std::io::Error),
}

impl ProbeError {
    /// Whether the error was raised before measurement began
    #[inline]
    #[must_use]
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            Self::Setup { .. } | Self::ObservationOpen(_) | Self::Config(_)
        )
    }

    /// Whether a task channel closed underneath the correlator
    #[inline]
    #[must_use]
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, Self::ObservationStreamClosed | Self::UpdaterClosed)
    }

    /// Create setup error for a stage
    #[inline]
    pub fn setup(stage: SetupStage, source: ControllerError) -> Self {
        Self::Setup { stage, source }
    }
}

/// Provisioning steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// Remove a stale data object
    DeleteObject,
    /// Create the data object with its initial value
    CreateObject,
    /// Remove a stale consumer
    DeleteConsumer,
    /// Create the consumer mounting the object
    CreateConsumer,
    /// Wait for the consumer to become ready
    WaitReady,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SetupStage::DeleteObject => "delete the existing secret",
            SetupStage::CreateObject => "create the secret",
            SetupStage::DeleteConsumer => "delete the existing pod",
            SetupStage::CreateConsumer => "create the pod",
            SetupStage::WaitReady => "wait for the pod to become ready",
        };
        f.write_str(s)
    }
}

/// Resource controller failures
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Command ran but reported failure
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// Rendered command line
        command: String,
        /// Exit status description
        status: String,
        /// Captured standard error
        stderr: String,
    },

    /// Command could not be started
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Rendered command line
        command: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Manifest could not be rendered
    #[error("invalid manifest: {0}")]
    Manifest(String),

    /// Any other backend failure
    #[error("{0}")]
    Other(String),
}

impl ControllerError {
    /// Check if a retry may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CommandFailed { .. } | Self::Other(_))
    }
}

/// Observation channel failures
#[derive(Debug, thiserror::Error)]
pub enum ObservationError {
    /// Stream could not be started
    #[error("failed to open stream for {consumer}: {reason}")]
    Open {
        /// Consumer being observed
        consumer: String,
        /// Failure description
        reason: String,
    },

    /// Reading the next line failed
    #[error("failed to read observation: {0}")]
    Read(#[from] std::io::Error),
}

/// Value parser failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Line had no content
    #[error("observed value is empty")]
    Empty,

    /// Line was not an integer
    #[error("observed value {line:?} is not an integer: {source}")]
    NotAnInteger {
        /// Offending line, trimmed
        line: String,
        /// Integer parse failure
        #[source]
        source: ParseIntError,
    },

    /// Integer did not fit the timestamp range
    #[error("observed value {secs} is outside the supported timestamp range")]
    OutOfRange {
        /// Parsed seconds
        secs: i64,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the file failed
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML was invalid
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serializing failed
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value was rejected
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted field path
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    /// Create validation error
    #[inline]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

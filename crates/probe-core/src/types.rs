//! Core types for the probe
//!
//! Defines the fundamental values passed between tasks:
//! - Write and observation events
//! - Latency records
//! - The clock used to timestamp them

use chrono::{DateTime, Timelike, Utc};
use std::fmt;
use std::sync::Arc;

/// Wall-clock instant. Values written upstream carry second resolution.
pub type Timestamp = DateTime<Utc>;

/// Drop the sub-second part of a timestamp
#[inline]
#[must_use]
pub fn truncate_to_second(ts: Timestamp) -> Timestamp {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Source of "now" for every task
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time
    fn now(&self) -> Timestamp;
}

/// Clock shared between tasks
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Request for the updater to perform the next write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    /// Measurement cycle this write starts (1-based)
    pub cycle: u64,
}

impl Trigger {
    /// Create trigger for a cycle
    #[inline]
    #[must_use]
    pub fn new(cycle: u64) -> Self {
        Self { cycle }
    }
}

/// A write that completed upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteEvent {
    /// Value written (second resolution)
    pub value: Timestamp,
    /// When the write call returned
    pub applied_at: Timestamp,
}

/// A value the consumer reported seeing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationEvent {
    /// Parsed value
    pub value: Timestamp,
    /// When the line was received
    pub observed_at: Timestamp,
}

/// One row of the primary output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyRecord {
    /// Time the observation was correlated
    pub now: Timestamp,
    /// Most recent write value
    pub last_write_value: Timestamp,
    /// Most recent observed value
    pub last_observed_value: Timestamp,
}

impl LatencyRecord {
    /// Whether the observation reflects the most recent write
    #[inline]
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.last_write_value == self.last_observed_value
    }

    /// Render as `now,last_write,last_observed` in unix seconds
    #[must_use]
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{}",
            self.now.timestamp(),
            self.last_write_value.timestamp(),
            self.last_observed_value.timestamp()
        )
    }
}

/// Kind of upstream object the controller can delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// The data object holding the measured value
    Secret,
    /// The consumer mounting the data object
    Pod,
}

impl ObjectKind {
    /// Resource name as understood by the controller
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Secret => "secret",
            ObjectKind::Pod => "pod",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer to provision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    /// Consumer name
    pub name: String,
    /// Data object mounted into the consumer
    pub object_name: String,
    /// Container image
    pub image: String,
    /// Directory the object is mounted at
    pub mount_path: String,
}

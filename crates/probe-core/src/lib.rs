//! Probe Core - Secret propagation latency measurement
//!
//! The measurement loop that:
//! - Triggers a new value to be written upstream
//! - Continuously samples the value visible to the consumer
//! - Correlates writes with the first observation that reflects them
//! - Emits one latency record per observation
//! - Decides when the next write may start
//!
//! Provisioning and observation transport live behind the
//! [`ResourceController`] and [`ObservationChannel`] traits.
//!
//! # Architecture
//!
//! ```text
//!            Trigger (cap 1)
//!   ┌──────────────────────────────┐
//!   ↓                              │
//! Updater ──WriteEvent──→ Correlator ──→ CSV rows (stdout)
//!                              ↑
//! Watcher ──ObservationEvent───┘
//!   ↑
//! ObservationChannel (raw lines)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use probe_core::{ProbeConfig, ProbeSession};
//!
//! # async fn example(controller: Arc<dyn ResourceController>, channel: Arc<dyn ObservationChannel>)
//! #     -> Result<(), probe_core::ProbeError> {
//! let session = ProbeSession::new(ProbeConfig::default(), controller, channel);
//! let summary = session.run(std::io::stdout()).await?;
//! println!("completed {} cycles", summary.stats.cycles_completed);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

// Core modules
pub mod config;
pub mod controller;
pub mod correlator;
pub mod error;
pub mod observability;
pub mod observation;
pub mod parser;
pub mod report;
pub mod retry;
pub mod session;
pub mod types;
pub mod updater;
pub mod watcher;

// Re-exports for convenience
pub use config::{ProbeConfig, SessionConfig, TargetConfig, UpdateConfig, WatchConfig};
pub use controller::ResourceController;
pub use correlator::{Correlator, CorrelatorStats};
pub use error::{ConfigError, ControllerError, ObservationError, ParseError, ProbeError, SetupStage};
pub use observation::{LineStream, ObservationChannel};
pub use parser::parse_observation;
pub use report::{ReportWriter, CSV_HEADER};
pub use retry::RetryPolicy;
pub use session::{ProbeSession, SessionSummary};
pub use types::{
    truncate_to_second, Clock, ConsumerSpec, LatencyRecord, ObjectKind, ObservationEvent,
    SharedClock, SystemClock, Timestamp, Trigger, WriteEvent,
};
pub use updater::Updater;
pub use watcher::{Watcher, WatcherExit};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with the probe
    pub use crate::{
        Clock, ObservationChannel, ProbeConfig, ProbeError, ProbeSession, ResourceController,
        SystemClock, Timestamp,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

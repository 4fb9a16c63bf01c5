//! Probe Kube - kubectl collaborators for the latency probe
//!
//! Implements the two seams of `probe-core` by shelling out to kubectl:
//! - [`KubectlController`] recreates the Secret and the Pod and applies
//!   each measured value
//! - [`KubectlObservationChannel`] samples the mounted file through
//!   `kubectl exec`
//!
//! # Example
//!
//! ```rust,ignore
//! use probe_core::ProbeConfig;
//! use probe_kube::{KubectlConfig, KubectlController, KubectlObservationChannel};
//!
//! let config = ProbeConfig::default();
//! let kubectl = KubectlConfig::new().with_namespace("probe");
//! let controller = KubectlController::new(kubectl.clone());
//! let channel = KubectlObservationChannel::new(kubectl, &config.target, &config.watch);
//! ```

#![warn(unreachable_pub)]

pub mod channel;
pub mod command;
pub mod config;
pub mod controller;
pub mod manifest;

pub use channel::{format_sleep, KubectlObservationChannel};
pub use command::{args, KubectlCommand};
pub use config::KubectlConfig;
pub use controller::KubectlController;
pub use manifest::PodManifest;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Probe session
//!
//! Wires the three tasks together for one measurement run:
//! 1. Provision the object and the consumer
//! 2. Open the observation stream
//! 3. Spawn the watcher and the updater, then drive the correlator
//! 4. Stop the tasks and optionally tear the resources down

use crate::config::ProbeConfig;
use crate::controller::ResourceController;
use crate::correlator::{Correlator, CorrelatorStats};
use crate::error::{ControllerError, ProbeError, SetupStage};
use crate::observability::session_span;
use crate::observation::ObservationChannel;
use crate::report::ReportWriter;
use crate::types::{ObjectKind, SharedClock, SystemClock};
use crate::updater::Updater;
use crate::watcher::{Watcher, WatcherExit};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Outcome of a session that shut down cleanly
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Correlator counters at shutdown
    pub stats: CorrelatorStats,
    /// CSV data rows written
    pub rows: u64,
}

/// One measurement run against a single object and consumer
pub struct ProbeSession {
    config: ProbeConfig,
    controller: Arc<dyn ResourceController>,
    channel: Arc<dyn ObservationChannel>,
    clock: SharedClock,
    cancel: CancellationToken,
}

impl ProbeSession {
    /// Create new session using the system clock
    #[must_use]
    pub fn new(
        config: ProbeConfig,
        controller: Arc<dyn ResourceController>,
        channel: Arc<dyn ObservationChannel>,
    ) -> Self {
        Self {
            config,
            controller,
            channel,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the clock shared by all tasks
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Use an externally owned cancellation token
    #[inline]
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the session when cancelled
    #[inline]
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Configuration in use
    #[inline]
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Recreate the object and the consumer from scratch
    ///
    /// # Errors
    /// Returns `ProbeError::Setup` naming the step that failed.
    pub async fn provision(&self) -> Result<(), ProbeError> {
        let target = &self.config.target;
        let controller = self.controller.as_ref();

        tracing::info!(secret = %target.secret_name, "recreating secret");
        controller
            .delete_object(ObjectKind::Secret, &target.secret_name)
            .await
            .map_err(|e| ProbeError::setup(SetupStage::DeleteObject, e))?;
        controller
            .create_or_replace_value(&target.secret_name, &target.secret_key, &target.initial_value)
            .await
            .map_err(|e| ProbeError::setup(SetupStage::CreateObject, e))?;

        tracing::info!(pod = %target.pod_name, image = %target.image, "recreating pod");
        controller
            .delete_object(ObjectKind::Pod, &target.pod_name)
            .await
            .map_err(|e| ProbeError::setup(SetupStage::DeleteConsumer, e))?;
        controller
            .create_consumer(&self.config.consumer_spec())
            .await
            .map_err(|e| ProbeError::setup(SetupStage::CreateConsumer, e))?;

        tracing::info!(pod = %target.pod_name, "waiting for pod to become ready");
        controller
            .wait_ready(&target.pod_name)
            .await
            .map_err(|e| ProbeError::setup(SetupStage::WaitReady, e))?;

        Ok(())
    }

    /// Delete the consumer and the object
    ///
    /// Both deletions are attempted; the first failure is returned.
    ///
    /// # Errors
    /// Returns the first controller failure.
    pub async fn teardown(&self) -> Result<(), ControllerError> {
        let target = &self.config.target;
        tracing::info!(secret = %target.secret_name, pod = %target.pod_name, "tearing down");

        let pod = self
            .controller
            .delete_object(ObjectKind::Pod, &target.pod_name)
            .await;
        let secret = self
            .controller
            .delete_object(ObjectKind::Secret, &target.secret_name)
            .await;
        pod.and(secret)
    }

    /// Run until cancelled or a task stops
    ///
    /// CSV rows are written to `out` as they are produced.
    ///
    /// # Errors
    /// - `ProbeError::Config` for an invalid configuration
    /// - `ProbeError::Setup` / `ProbeError::ObservationOpen` before measuring
    /// - `ProbeError::ObservationStreamClosed` / `ProbeError::UpdaterClosed`
    ///   when a task stops underneath the correlator
    pub async fn run<W: Write>(&self, out: W) -> Result<SessionSummary, ProbeError> {
        self.config.validate()?;
        let span = session_span(&self.config.target.secret_name, &self.config.target.pod_name);
        self.run_inner(out).instrument(span).await
    }

    async fn run_inner<W: Write>(&self, out: W) -> Result<SessionSummary, ProbeError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::info!("cancelled during setup");
                return Ok(SessionSummary::default());
            }
            provisioned = self.provision() => provisioned?,
        }

        let config = &self.config;
        let watcher = Watcher::new(
            self.channel.clone(),
            self.clock.clone(),
            &config.target,
            &config.watch,
        );
        let stream = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                tracing::info!("cancelled while opening the pod watch");
                return Ok(SessionSummary::default());
            }
            opened = watcher.open() => opened.map_err(ProbeError::ObservationOpen)?,
        };

        let capacity = config.session.channel_capacity;
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (write_tx, write_rx) = mpsc::channel(capacity);
        let (observation_tx, observation_rx) = mpsc::channel(capacity);

        let tasks = self.cancel.child_token();
        let watcher_handle = watcher.spawn(stream, observation_tx, tasks.clone());
        let updater = Updater::new(
            self.controller.clone(),
            self.clock.clone(),
            &config.target,
            &config.update,
        );
        let updater_handle = updater.spawn(trigger_rx, write_tx, tasks.clone());

        tracing::info!(
            poll_interval_ms = config.watch.poll_interval_ms,
            "measuring propagation latency"
        );

        let mut correlator = Correlator::new(self.clock.clone(), ReportWriter::new(out), trigger_tx);
        let result = async {
            correlator.write_header()?;
            correlator.start().await?;
            correlator.run(write_rx, observation_rx, self.cancel.clone()).await
        }
        .await;
        let rows = correlator.report().rows();
        drop(correlator);

        tasks.cancel();
        match watcher_handle.await {
            Ok(exit @ WatcherExit::StreamEnded) => tracing::warn!(?exit, "watcher stopped"),
            Ok(exit) => tracing::debug!(?exit, "watcher stopped"),
            Err(error) => tracing::error!(%error, "watcher task failed"),
        }
        if let Err(error) = updater_handle.await {
            tracing::error!(%error, "updater task failed");
        }

        let stats = result?;
        tracing::info!(
            cycles = stats.cycles_completed,
            records = stats.records,
            last_latency_ms = stats.last_latency.map(|d| d.num_milliseconds()),
            min_latency_ms = stats.min_latency.map(|d| d.num_milliseconds()),
            max_latency_ms = stats.max_latency.map(|d| d.num_milliseconds()),
            "probe finished"
        );

        if config.session.teardown_on_exit {
            if let Err(error) = self.teardown().await {
                tracing::warn!(%error, "teardown failed");
            }
        }

        Ok(SessionSummary { stats, rows })
    }
}

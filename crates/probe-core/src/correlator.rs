//! Correlator (main loop)
//!
//! The single owner of correlation state. It selects over the write and
//! observation channels, emits one latency record per observation once a
//! write exists, and starts the next cycle when the consumer catches up with
//! the latest write.
//!
//! # Single outstanding write
//!
//! A trigger is sent only when the latest write is observed for the first
//! time. Seeing the same value again before the next write arrives does not
//! re-trigger, so the updater never holds more than one unconfirmed write.

use crate::error::ProbeError;
use crate::report::ReportWriter;
use crate::types::{LatencyRecord, ObservationEvent, SharedClock, Timestamp, Trigger, WriteEvent};
use chrono::TimeDelta;
use std::io::Write;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Write awaiting confirmation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingWrite {
    event: WriteEvent,
    confirmed: bool,
}

/// Running counters, logged at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    /// Write events received
    pub writes: u64,
    /// Observation events received
    pub observations: u64,
    /// Latency rows emitted
    pub records: u64,
    /// Writes confirmed as visible to the consumer
    pub cycles_completed: u64,
    /// Latency of the most recent completed cycle
    pub last_latency: Option<TimeDelta>,
    /// Smallest latency seen
    pub min_latency: Option<TimeDelta>,
    /// Largest latency seen
    pub max_latency: Option<TimeDelta>,
}

impl CorrelatorStats {
    fn record_latency(&mut self, latency: TimeDelta) {
        self.cycles_completed += 1;
        self.last_latency = Some(latency);
        self.min_latency = Some(self.min_latency.map_or(latency, |m| m.min(latency)));
        self.max_latency = Some(self.max_latency.map_or(latency, |m| m.max(latency)));
    }
}

/// Correlates writes with the observations that reflect them
pub struct Correlator<W: Write> {
    clock: SharedClock,
    report: ReportWriter<W>,
    triggers: mpsc::Sender<Trigger>,
    last_write: Option<PendingWrite>,
    last_observed: Option<Timestamp>,
    next_cycle: u64,
    stats: CorrelatorStats,
}

impl<W: Write> Correlator<W> {
    /// Create correlator writing rows to `report`
    pub fn new(clock: SharedClock, report: ReportWriter<W>, triggers: mpsc::Sender<Trigger>) -> Self {
        Self {
            clock,
            report,
            triggers,
            last_write: None,
            last_observed: None,
            next_cycle: 1,
            stats: CorrelatorStats::default(),
        }
    }

    /// Write the CSV header
    ///
    /// # Errors
    /// Returns `ProbeError::Report` if the output fails.
    pub fn write_header(&mut self) -> Result<(), ProbeError> {
        self.report.write_header()?;
        Ok(())
    }

    /// Send the first trigger
    ///
    /// # Errors
    /// Returns `ProbeError::UpdaterClosed` if the updater is gone.
    pub async fn start(&mut self) -> Result<(), ProbeError> {
        self.trigger().await
    }

    /// Select over both inputs until cancelled or an input closes
    ///
    /// # Errors
    /// - `ProbeError::ObservationStreamClosed` when the watcher stops
    /// - `ProbeError::UpdaterClosed` when the updater stops
    /// - `ProbeError::Report` when the output fails
    pub async fn run(
        &mut self,
        mut writes: mpsc::Receiver<WriteEvent>,
        mut observations: mpsc::Receiver<ObservationEvent>,
        cancel: CancellationToken,
    ) -> Result<CorrelatorStats, ProbeError> {
        loop {
            // Cancellation wins over a channel that closed because of it.
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::info!("correlator cancelled");
                    return Ok(self.stats);
                }
                write = writes.recv() => match write {
                    Some(event) => self.on_write(event),
                    None => return Err(ProbeError::UpdaterClosed),
                },
                observation = observations.recv() => match observation {
                    Some(event) => {
                        self.on_observation(event).await?;
                    }
                    None => return Err(ProbeError::ObservationStreamClosed),
                },
            }
        }
    }

    /// Record a completed write
    pub fn on_write(&mut self, event: WriteEvent) {
        self.stats.writes += 1;
        tracing::debug!(value = event.value.timestamp(), "write recorded");
        self.last_write = Some(PendingWrite {
            event,
            confirmed: false,
        });
    }

    /// Record an observation and emit its latency row
    ///
    /// Returns the emitted record, or `None` before the first write.
    ///
    /// # Errors
    /// - `ProbeError::Report` when the output fails
    /// - `ProbeError::UpdaterClosed` when the next trigger cannot be sent
    pub async fn on_observation(
        &mut self,
        event: ObservationEvent,
    ) -> Result<Option<LatencyRecord>, ProbeError> {
        let now = self.clock.now();
        self.stats.observations += 1;
        self.last_observed = Some(event.value);

        let Some(pending) = self.last_write.as_mut() else {
            tracing::debug!(
                value = event.value.timestamp(),
                "observation before first write, no record"
            );
            return Ok(None);
        };

        let record = LatencyRecord {
            now,
            last_write_value: pending.event.value,
            last_observed_value: event.value,
        };
        self.report.write_record(&record)?;
        self.stats.records += 1;

        if record.is_match() && !pending.confirmed {
            pending.confirmed = true;
            let latency = now - pending.event.value;
            let since_applied = now - pending.event.applied_at;
            self.stats.record_latency(latency);
            tracing::info!(
                value = pending.event.value.timestamp(),
                latency_ms = latency.num_milliseconds(),
                since_applied_ms = since_applied.num_milliseconds(),
                "pod caught up with last secret update"
            );
            self.trigger().await?;
        }

        Ok(Some(record))
    }

    /// Most recent write value
    #[inline]
    #[must_use]
    pub fn last_write(&self) -> Option<Timestamp> {
        self.last_write.map(|p| p.event.value)
    }

    /// Most recent observed value
    #[inline]
    #[must_use]
    pub fn last_observed(&self) -> Option<Timestamp> {
        self.last_observed
    }

    /// Whether the latest write still awaits confirmation
    #[inline]
    #[must_use]
    pub fn awaiting_confirmation(&self) -> bool {
        self.last_write.is_some_and(|p| !p.confirmed)
    }

    /// Counters so far
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CorrelatorStats {
        self.stats
    }

    /// Borrow the report writer
    #[inline]
    pub fn report(&self) -> &ReportWriter<W> {
        &self.report
    }

    async fn trigger(&mut self) -> Result<(), ProbeError> {
        let trigger = Trigger::new(self.next_cycle);
        self.triggers
            .send(trigger)
            .await
            .map_err(|_| ProbeError::UpdaterClosed)?;
        tracing::debug!(cycle = trigger.cycle, "next write triggered");
        self.next_cycle += 1;
        Ok(())
    }
}

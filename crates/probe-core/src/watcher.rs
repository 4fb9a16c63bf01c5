//! Watcher task
//!
//! Wraps the observation channel, parses every line and forwards the values
//! it can read. The observation timestamp is the moment the line arrived,
//! not the value it carries.

use crate::config::{TargetConfig, WatchConfig};
use crate::error::ObservationError;
use crate::observation::{LineStream, ObservationChannel};
use crate::parser::parse_observation;
use crate::retry::RetryPolicy;
use crate::types::{ObservationEvent, SharedClock};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Why the watcher stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherExit {
    /// The stream ended and could not be reopened
    StreamEnded,
    /// Cancellation was requested
    Cancelled,
    /// Nobody is listening for observations any more
    ReceiverDropped,
}

/// Turns raw observation lines into observation events
pub struct Watcher {
    channel: Arc<dyn ObservationChannel>,
    clock: SharedClock,
    consumer: String,
    key: String,
    reopen: RetryPolicy,
}

impl Watcher {
    /// Create watcher for the configured target
    #[must_use]
    pub fn new(
        channel: Arc<dyn ObservationChannel>,
        clock: SharedClock,
        target: &TargetConfig,
        watch: &WatchConfig,
    ) -> Self {
        Self {
            channel,
            clock,
            consumer: target.pod_name.clone(),
            key: target.secret_key.clone(),
            reopen: watch.reopen_policy(),
        }
    }

    /// Open the observation stream
    ///
    /// # Errors
    /// Returns the channel's error; the caller decides whether it is fatal.
    pub async fn open(&self) -> Result<LineStream, ObservationError> {
        self.channel.open_stream(&self.consumer, &self.key).await
    }

    /// Spawn the watcher loop on the runtime
    pub fn spawn(
        self,
        stream: LineStream,
        events: mpsc::Sender<ObservationEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<WatcherExit> {
        tokio::spawn(self.run(stream, events, cancel))
    }

    /// Forward observations until the stream ends for good
    ///
    /// Dropping `events` on return is what tells the correlator the
    /// observation side is gone.
    pub async fn run(
        self,
        mut stream: LineStream,
        events: mpsc::Sender<ObservationEvent>,
        cancel: CancellationToken,
    ) -> WatcherExit {
        let mut reopens_used = 0u32;

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return WatcherExit::Cancelled,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(line)) => {
                    let observed_at = self.clock.now();
                    match parse_observation(&line) {
                        Ok(value) => {
                            reopens_used = 0;
                            tracing::debug!(value = value.timestamp(), "observed value");
                            let event = ObservationEvent { value, observed_at };
                            if events.send(event).await.is_err() {
                                return WatcherExit::ReceiverDropped;
                            }
                        }
                        Err(error) => {
                            tracing::warn!(%line, %error, "failed to parse observed value as time");
                        }
                    }
                }
                Some(Err(error)) => {
                    tracing::warn!(%error, "observation stream read error");
                }
                None => match self.reopen(&mut reopens_used, &cancel).await {
                    Some(reopened) => stream = reopened,
                    None if cancel.is_cancelled() => return WatcherExit::Cancelled,
                    None => {
                        tracing::error!(consumer = %self.consumer, "observation stream ended");
                        return WatcherExit::StreamEnded;
                    }
                },
            }
        }
    }

    async fn reopen(&self, used: &mut u32, cancel: &CancellationToken) -> Option<LineStream> {
        while *used < self.reopen.max_attempts {
            *used += 1;
            let delay = self.reopen.backoff(*used);
            tracing::warn!(
                consumer = %self.consumer,
                attempt = *used,
                max_reopens = self.reopen.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "observation stream ended, reopening"
            );

            tokio::select! {
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }

            match self.open().await {
                Ok(stream) => return Some(stream),
                Err(error) => {
                    tracing::warn!(consumer = %self.consumer, %error, "failed to reopen observation stream");
                }
            }
        }
        None
    }
}

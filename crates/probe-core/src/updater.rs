//! Updater task
//!
//! Waits for a trigger, writes the current second upstream and reports the
//! write. Exactly one write is in flight at a time; a failed write skips the
//! cycle without emitting anything.

use crate::config::{TargetConfig, UpdateConfig};
use crate::controller::ResourceController;
use crate::error::ControllerError;
use crate::retry::RetryPolicy;
use crate::types::{truncate_to_second, SharedClock, Timestamp, Trigger, WriteEvent};
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Writes a fresh value upstream on every trigger
pub struct Updater {
    controller: Arc<dyn ResourceController>,
    clock: SharedClock,
    object: String,
    key: String,
    consumer: String,
    retry: RetryPolicy,
    annotation_key: Option<String>,
    last_written: Option<Timestamp>,
}

impl Updater {
    /// Create updater for the configured target
    #[must_use]
    pub fn new(
        controller: Arc<dyn ResourceController>,
        clock: SharedClock,
        target: &TargetConfig,
        update: &UpdateConfig,
    ) -> Self {
        Self {
            controller,
            clock,
            object: target.secret_name.clone(),
            key: target.secret_key.clone(),
            consumer: target.pod_name.clone(),
            retry: update.retry,
            annotation_key: update
                .annotate_consumer
                .then(|| update.annotation_key.clone()),
            last_written: None,
        }
    }

    /// Spawn the updater loop on the runtime
    pub fn spawn(
        self,
        triggers: mpsc::Receiver<Trigger>,
        events: mpsc::Sender<WriteEvent>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(triggers, events, cancel))
    }

    /// Serve triggers until cancelled or either channel closes
    pub async fn run(
        mut self,
        mut triggers: mpsc::Receiver<Trigger>,
        events: mpsc::Sender<WriteEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let trigger = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("updater cancelled");
                    break;
                }
                trigger = triggers.recv() => match trigger {
                    Some(trigger) => trigger,
                    None => {
                        tracing::debug!("trigger channel closed, updater exiting");
                        break;
                    }
                },
            };

            let applied = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(cycle = trigger.cycle, "updater cancelled mid-write");
                    break;
                }
                applied = self.apply(trigger) => applied,
            };
            let Some(event) = applied else {
                continue;
            };

            if events.send(event).await.is_err() {
                tracing::debug!("write events receiver dropped, updater exiting");
                break;
            }
        }
    }

    /// Perform one write cycle
    ///
    /// Returns `None` when the write failed after all retries.
    pub async fn apply(&mut self, trigger: Trigger) -> Option<WriteEvent> {
        let value = self.next_value().await;
        let rendered = value.timestamp().to_string();

        match self.write(&rendered).await {
            Ok(()) => {
                let applied_at = self.clock.now();
                self.last_written = Some(value);
                tracing::info!(cycle = trigger.cycle, value = %rendered, "secret updated");
                self.annotate(&rendered).await;
                Some(WriteEvent { value, applied_at })
            }
            Err(error) => {
                tracing::warn!(
                    cycle = trigger.cycle,
                    value = %rendered,
                    %error,
                    "secret update failed, skipping cycle"
                );
                None
            }
        }
    }

    /// Last value successfully written
    #[inline]
    #[must_use]
    pub fn last_written(&self) -> Option<Timestamp> {
        self.last_written
    }

    async fn write(&self, value: &str) -> Result<(), ControllerError> {
        let controller: &dyn ResourceController = self.controller.as_ref();
        let object = self.object.as_str();
        let key = self.key.as_str();
        self.retry
            .retry_if(
                "update secret",
                ControllerError::is_retryable,
                move |_| controller.create_or_replace_value(object, key, value),
            )
            .await
    }

    async fn annotate(&self, value: &str) {
        let Some(annotation_key) = &self.annotation_key else {
            return;
        };
        if let Err(error) = self
            .controller
            .annotate_consumer(&self.consumer, annotation_key, value)
            .await
        {
            tracing::warn!(consumer = %self.consumer, %error, "failed to annotate consumer");
        }
    }

    // Each write must be distinguishable from the previous one, so a value
    // never repeats or goes backwards.
    async fn next_value(&self) -> Timestamp {
        let value = truncate_to_second(self.clock.now());
        let Some(previous) = self.last_written else {
            return value;
        };
        if value > previous {
            return value;
        }

        let next = previous + TimeDelta::seconds(1);
        let wait = (next - self.clock.now())
            .to_std()
            .unwrap_or_default()
            .min(Duration::from_secs(1));
        tokio::time::sleep(wait).await;

        truncate_to_second(self.clock.now()).max(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::MockResourceController;
    use crate::types::Clock;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct FixedClock(Mutex<Timestamp>);

    impl FixedClock {
        fn at(secs: i64, nanos: u32) -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc.timestamp_opt(secs, nanos).unwrap())))
        }

        fn set(&self, secs: i64) {
            *self.0.lock().unwrap() = Utc.timestamp_opt(secs, 0).unwrap();
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> Timestamp {
            *self.0.lock().unwrap()
        }
    }

    fn updater(mock: MockResourceController, clock: SharedClock, update: UpdateConfig) -> Updater {
        Updater::new(Arc::new(mock), clock, &TargetConfig::default(), &update)
    }

    fn failure() -> ControllerError {
        ControllerError::CommandFailed {
            command: "kubectl apply -f -".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "the server is currently unable to handle the request".to_string(),
        }
    }

    #[tokio::test]
    async fn writes_truncated_now() {
        let mut mock = MockResourceController::new();
        mock.expect_create_or_replace_value()
            .withf(|object, key, value| object == "my-secret" && key == "time" && value == "1000")
            .times(1)
            .returning(|_, _, _| Ok(()));

        let clock = FixedClock::at(1000, 750_000_000);
        let mut updater = updater(mock, clock, UpdateConfig::default());

        let event = updater.apply(Trigger::new(1)).await.unwrap();
        assert_eq!(event.value.timestamp(), 1000);
        assert_eq!(event.applied_at, Utc.timestamp_opt(1000, 750_000_000).unwrap());
        assert_eq!(updater.last_written(), Some(event.value));
    }

    #[tokio::test]
    async fn failed_write_emits_nothing() {
        let mut mock = MockResourceController::new();
        mock.expect_create_or_replace_value()
            .times(1)
            .returning(|_, _, _| Err(failure()));

        let mut updater = updater(mock, FixedClock::at(1000, 0), UpdateConfig::default());

        assert!(updater.apply(Trigger::new(1)).await.is_none());
        assert_eq!(updater.last_written(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_write_is_retried_when_configured() {
        let mut mock = MockResourceController::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_create_or_replace_value()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(failure()));
        mock.expect_create_or_replace_value()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let update = UpdateConfig {
            retry: RetryPolicy::default().with_max_attempts(3),
            ..UpdateConfig::default()
        };
        let mut updater = updater(mock, FixedClock::at(1000, 0), update);

        let event = updater.apply(Trigger::new(1)).await.unwrap();
        assert_eq!(event.value.timestamp(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn value_never_repeats() {
        let mut mock = MockResourceController::new();
        mock.expect_create_or_replace_value()
            .times(2)
            .returning(|_, _, _| Ok(()));

        let clock = FixedClock::at(1000, 0);
        let mut updater = updater(mock, clock.clone(), UpdateConfig::default());

        let first = updater.apply(Trigger::new(1)).await.unwrap();
        let second = updater.apply(Trigger::new(2)).await.unwrap();

        assert_eq!(first.value.timestamp(), 1000);
        assert_eq!(second.value.timestamp(), 1001);
    }

    #[tokio::test]
    async fn value_follows_clock_when_it_advances() {
        let mut mock = MockResourceController::new();
        mock.expect_create_or_replace_value()
            .times(2)
            .returning(|_, _, _| Ok(()));

        let clock = FixedClock::at(1000, 0);
        let mut updater = updater(mock, clock.clone(), UpdateConfig::default());

        updater.apply(Trigger::new(1)).await.unwrap();
        clock.set(1005);
        let second = updater.apply(Trigger::new(2)).await.unwrap();
        assert_eq!(second.value.timestamp(), 1005);
    }

    #[tokio::test]
    async fn annotates_consumer_when_enabled() {
        let mut mock = MockResourceController::new();
        mock.expect_create_or_replace_value()
            .returning(|_, _, _| Ok(()));
        mock.expect_annotate_consumer()
            .withf(|name, key, value| {
                name == "my-pod" && key == "example.com/time-annotation" && value == "1000"
            })
            .times(1)
            .returning(|_, _, _| Err(failure()));

        let update = UpdateConfig {
            annotate_consumer: true,
            ..UpdateConfig::default()
        };
        let mut updater = updater(mock, FixedClock::at(1000, 0), update);

        // Annotation failures do not fail the write.
        assert!(updater.apply(Trigger::new(1)).await.is_some());
    }

    #[tokio::test]
    async fn run_waits_for_triggers() {
        let mut mock = MockResourceController::new();
        mock.expect_create_or_replace_value()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let updater = updater(mock, FixedClock::at(1000, 0), UpdateConfig::default());
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (event_tx, mut event_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let handle = updater.spawn(trigger_rx, event_tx, cancel.clone());

        trigger_tx.send(Trigger::new(1)).await.unwrap();
        let event = event_rx.recv().await.unwrap();
        assert_eq!(event.value.timestamp(), 1000);

        // No trigger, no write.
        let idle = tokio::time::timeout(Duration::from_millis(50), event_rx.recv()).await;
        assert!(idle.is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn run_exits_when_triggers_close() {
        let mock = MockResourceController::new();
        let updater = updater(mock, FixedClock::at(1000, 0), UpdateConfig::default());
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (event_tx, mut event_rx) = mpsc::channel(1);

        let handle = updater.spawn(trigger_rx, event_tx, CancellationToken::new());
        drop(trigger_tx);
        handle.await.unwrap();

        assert!(event_rx.recv().await.is_none());
    }
}

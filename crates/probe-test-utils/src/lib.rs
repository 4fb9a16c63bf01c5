//! Testing utilities for the secret probe workspace
//!
//! In-memory stand-ins for the cluster: a controller that records calls and
//! a channel that samples the value the fake pod sees.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{TimeDelta, TimeZone, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use probe_core::{
    Clock, ConsumerSpec, ControllerError, LineStream, ObjectKind, ObservationChannel,
    ObservationError, ResourceController, Timestamp,
};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

pub fn ts(secs: i64) -> Timestamp {
    Utc.timestamp_opt(secs, 0).unwrap()
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock(Mutex<Timestamp>);

impl ManualClock {
    pub fn at(secs: i64) -> Arc<Self> {
        Arc::new(Self(Mutex::new(ts(secs))))
    }

    pub fn set(&self, secs: i64) {
        *self.0.lock() = ts(secs);
    }

    pub fn advance(&self, secs: i64) {
        *self.0.lock() += TimeDelta::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.0.lock()
    }
}

/// Cloneable in-memory output for the CSV report
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Value currently visible inside the fake pod
#[derive(Debug, Clone, Default)]
pub struct MountedValue(Arc<Mutex<Option<String>>>);

impl MountedValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: impl Into<String>) {
        *self.0.lock() = Some(value.into());
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().clone()
    }
}

/// A controller call, as recorded by [`FakeController`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Write {
        object: String,
        key: String,
        value: String,
    },
    Delete {
        kind: ObjectKind,
        name: String,
    },
    CreateConsumer(ConsumerSpec),
    WaitReady(String),
    Annotate {
        name: String,
        key: String,
        value: String,
    },
}

/// Where [`FakeController`] should report failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Delete(ObjectKind),
    CreateConsumer,
    WaitReady,
    Annotate,
    /// Every write from the n-th one (0-based) onwards
    WritesFrom(usize),
}

/// Records every call and optionally mirrors writes into a [`MountedValue`]
#[derive(Debug, Default)]
pub struct FakeController {
    calls: Mutex<Vec<Call>>,
    fail: Mutex<Vec<FailPoint>>,
    writes: Mutex<usize>,
    mount: Option<MountedValue>,
}

impl FakeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful writes become visible through `mount` immediately
    #[must_use]
    pub fn with_mount(mut self, mount: MountedValue) -> Self {
        self.mount = Some(mount);
        self
    }

    #[must_use]
    pub fn failing_at(self, point: FailPoint) -> Self {
        self.fail.lock().push(point);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Values passed to successful and failed writes, in order
    pub fn written_values(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Write { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn fails(&self, point: FailPoint) -> bool {
        self.fail.lock().contains(&point)
    }

    fn failure(operation: &str) -> ControllerError {
        ControllerError::CommandFailed {
            command: format!("fake {operation}"),
            status: "exit status: 1".to_string(),
            stderr: "injected failure".to_string(),
        }
    }
}

#[async_trait]
impl ResourceController for FakeController {
    async fn create_or_replace_value(
        &self,
        object: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ControllerError> {
        self.record(Call::Write {
            object: object.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });

        let index = {
            let mut writes = self.writes.lock();
            let index = *writes;
            *writes += 1;
            index
        };
        let failing = self
            .fail
            .lock()
            .iter()
            .any(|p| matches!(p, FailPoint::WritesFrom(from) if index >= *from));
        if failing {
            return Err(Self::failure("write"));
        }

        if let Some(mount) = &self.mount {
            mount.set(value);
        }
        Ok(())
    }

    async fn delete_object(&self, kind: ObjectKind, name: &str) -> Result<(), ControllerError> {
        self.record(Call::Delete {
            kind,
            name: name.to_string(),
        });
        if self.fails(FailPoint::Delete(kind)) {
            return Err(Self::failure("delete"));
        }
        Ok(())
    }

    async fn create_consumer(&self, spec: &ConsumerSpec) -> Result<(), ControllerError> {
        self.record(Call::CreateConsumer(spec.clone()));
        if self.fails(FailPoint::CreateConsumer) {
            return Err(Self::failure("create consumer"));
        }
        Ok(())
    }

    async fn wait_ready(&self, name: &str) -> Result<(), ControllerError> {
        self.record(Call::WaitReady(name.to_string()));
        if self.fails(FailPoint::WaitReady) {
            return Err(Self::failure("wait"));
        }
        Ok(())
    }

    async fn annotate_consumer(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ControllerError> {
        self.record(Call::Annotate {
            name: name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        if self.fails(FailPoint::Annotate) {
            return Err(Self::failure("annotate"));
        }
        Ok(())
    }
}

/// Channel that hands out a fixed list of lines, once
#[derive(Debug)]
pub struct ScriptedChannel {
    lines: Mutex<Option<Vec<String>>>,
}

impl ScriptedChannel {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: Mutex::new(Some(lines.into_iter().map(Into::into).collect())),
        }
    }

    /// Channel whose open always fails
    pub fn unavailable() -> Self {
        Self {
            lines: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ObservationChannel for ScriptedChannel {
    async fn open_stream(&self, consumer: &str, _key: &str) -> Result<LineStream, ObservationError> {
        let Some(lines) = self.lines.lock().take() else {
            return Err(ObservationError::Open {
                consumer: consumer.to_string(),
                reason: "container not found".to_string(),
            });
        };
        Ok(stream::iter(lines.into_iter().map(Ok)).boxed())
    }
}

/// Channel whose open never completes, like an exec stuck on the API server
#[derive(Debug, Default)]
pub struct StalledChannel;

#[async_trait]
impl ObservationChannel for StalledChannel {
    async fn open_stream(&self, _consumer: &str, _key: &str) -> Result<LineStream, ObservationError> {
        futures::future::pending().await
    }
}

/// Channel that samples a [`MountedValue`] on a fixed interval
///
/// An unset value is reported as an empty line, the way `cat` of a missing
/// file echoes nothing.
#[derive(Debug, Clone)]
pub struct PollingChannel {
    mount: MountedValue,
    interval: Duration,
    limit: Option<usize>,
}

impl PollingChannel {
    pub fn new(mount: MountedValue, interval: Duration) -> Self {
        Self {
            mount,
            interval,
            limit: None,
        }
    }

    /// End the stream after `lines` samples
    #[must_use]
    pub fn with_limit(mut self, lines: usize) -> Self {
        self.limit = Some(lines);
        self
    }
}

#[async_trait]
impl ObservationChannel for PollingChannel {
    async fn open_stream(&self, _consumer: &str, _key: &str) -> Result<LineStream, ObservationError> {
        let mount = self.mount.clone();
        let interval = self.interval;
        let samples = stream::unfold(mount, move |mount| async move {
            tokio::time::sleep(interval).await;
            let line = mount.get().unwrap_or_default();
            Some((Ok(line), mount))
        });
        Ok(match self.limit {
            Some(limit) => samples.take(limit).boxed(),
            None => samples.boxed(),
        })
    }
}

/// Poll `condition` until it holds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    while !condition() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

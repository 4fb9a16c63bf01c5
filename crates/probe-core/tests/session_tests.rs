//! End-to-end session runs against the in-memory cluster

use pretty_assertions::assert_eq;
use probe_core::{
    ObjectKind, ProbeConfig, ProbeError, ProbeSession, SessionSummary, SetupStage, CSV_HEADER,
};
use probe_test_utils::{
    wait_until, Call, FailPoint, FakeController, ManualClock, MountedValue, PollingChannel,
    ScriptedChannel, SharedBuffer, StalledChannel,
};
use std::sync::Arc;
use std::time::Duration;

fn live_cluster() -> (Arc<FakeController>, Arc<PollingChannel>) {
    let mount = MountedValue::new();
    let controller = Arc::new(FakeController::new().with_mount(mount.clone()));
    let channel = Arc::new(PollingChannel::new(mount, Duration::from_secs(1)));
    (controller, channel)
}

#[tokio::test(start_paused = true)]
async fn measures_consecutive_cycles() {
    let (controller, channel) = live_cluster();
    let session = ProbeSession::new(ProbeConfig::default(), controller.clone(), channel)
        .with_clock(ManualClock::at(1000));
    let cancel = session.cancellation_token();
    let output = SharedBuffer::new();

    let run = tokio::spawn({
        let output = output.clone();
        async move { session.run(output).await }
    });

    // Initial value plus three measured writes.
    wait_until(|| controller.written_values().len() >= 5).await;
    cancel.cancel();
    let summary = run.await.unwrap().unwrap();

    let written = controller.written_values();
    assert_eq!(&written[..4], ["initial-value", "1000", "1001", "1002"]);
    assert!(summary.stats.cycles_completed >= 3);
    assert_eq!(summary.rows, summary.stats.records);

    let lines = output.lines();
    assert_eq!(lines[0], CSV_HEADER);
    assert!(lines.contains(&"1000,1000,1000".to_string()));
    assert!(lines.contains(&"1000,1001,1001".to_string()));
}

#[tokio::test(start_paused = true)]
async fn provisions_in_order() {
    let (controller, channel) = live_cluster();
    let config = ProbeConfig::default();
    let session = ProbeSession::new(config.clone(), controller.clone(), channel)
        .with_clock(ManualClock::at(1000));

    session.provision().await.unwrap();

    assert_eq!(
        controller.calls(),
        vec![
            Call::Delete {
                kind: ObjectKind::Secret,
                name: "my-secret".to_string(),
            },
            Call::Write {
                object: "my-secret".to_string(),
                key: "time".to_string(),
                value: "initial-value".to_string(),
            },
            Call::Delete {
                kind: ObjectKind::Pod,
                name: "my-pod".to_string(),
            },
            Call::CreateConsumer(config.consumer_spec()),
            Call::WaitReady("my-pod".to_string()),
        ]
    );
}

#[tokio::test]
async fn setup_failure_is_fatal() {
    let controller = Arc::new(FakeController::new().failing_at(FailPoint::WaitReady));
    let channel = Arc::new(ScriptedChannel::new(["1000"]));
    let session = ProbeSession::new(ProbeConfig::default(), controller.clone(), channel);
    let output = SharedBuffer::new();

    let err = session.run(output.clone()).await.unwrap_err();

    assert!(err.is_setup());
    assert!(matches!(
        err,
        ProbeError::Setup {
            stage: SetupStage::WaitReady,
            ..
        }
    ));
    assert_eq!(output.contents(), "");
}

#[tokio::test]
async fn stale_object_delete_failure_stops_setup() {
    let controller = Arc::new(FakeController::new().failing_at(FailPoint::Delete(ObjectKind::Secret)));
    let channel = Arc::new(ScriptedChannel::new(["1000"]));
    let session = ProbeSession::new(ProbeConfig::default(), controller.clone(), channel);

    let err = session.run(SharedBuffer::new()).await.unwrap_err();

    assert!(matches!(
        err,
        ProbeError::Setup {
            stage: SetupStage::DeleteObject,
            ..
        }
    ));
    assert_eq!(controller.calls().len(), 1);
}

#[tokio::test]
async fn unavailable_observation_channel_is_fatal() {
    let controller = Arc::new(FakeController::new());
    let channel = Arc::new(ScriptedChannel::unavailable());
    let session = ProbeSession::new(ProbeConfig::default(), controller, channel);

    let err = session.run(SharedBuffer::new()).await.unwrap_err();
    assert!(matches!(err, ProbeError::ObservationOpen(_)));
}

#[tokio::test(start_paused = true)]
async fn cancel_interrupts_stalled_stream_open() {
    let controller = Arc::new(FakeController::new());
    let channel = Arc::new(StalledChannel);
    let session = ProbeSession::new(ProbeConfig::default(), controller.clone(), channel)
        .with_clock(ManualClock::at(1000));
    let cancel = session.cancellation_token();
    let output = SharedBuffer::new();

    let run = tokio::spawn({
        let output = output.clone();
        async move { session.run(output).await }
    });

    wait_until(|| controller.calls().contains(&Call::WaitReady("my-pod".to_string()))).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    cancel.cancel();

    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary, SessionSummary::default());
    assert_eq!(output.contents(), "");
    assert_eq!(controller.written_values(), ["initial-value"]);
}

#[tokio::test]
async fn invalid_config_touches_nothing() {
    let controller = Arc::new(FakeController::new());
    let channel = Arc::new(ScriptedChannel::new(["1000"]));
    let config = ProbeConfig::default().with_pod("");
    let session = ProbeSession::new(config, controller.clone(), channel);

    let err = session.run(SharedBuffer::new()).await.unwrap_err();

    assert!(matches!(err, ProbeError::Config(_)));
    assert!(controller.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn closed_observation_stream_ends_session() {
    let mount = MountedValue::new();
    let controller = Arc::new(FakeController::new().with_mount(mount.clone()));
    let channel = Arc::new(PollingChannel::new(mount, Duration::from_secs(1)).with_limit(3));
    let session = ProbeSession::new(ProbeConfig::default(), controller, channel)
        .with_clock(ManualClock::at(1000));

    let err = session.run(SharedBuffer::new()).await.unwrap_err();

    assert!(matches!(err, ProbeError::ObservationStreamClosed));
    assert!(err.is_channel_closed());
}

#[tokio::test(start_paused = true)]
async fn failing_writes_stall_without_crashing() {
    let mount = MountedValue::new();
    let controller = Arc::new(
        FakeController::new()
            .with_mount(mount.clone())
            .failing_at(FailPoint::WritesFrom(1)),
    );
    let channel = Arc::new(PollingChannel::new(mount, Duration::from_secs(1)));
    let session = ProbeSession::new(ProbeConfig::default(), controller.clone(), channel)
        .with_clock(ManualClock::at(1000));
    let cancel = session.cancellation_token();
    let output = SharedBuffer::new();

    let run = tokio::spawn({
        let output = output.clone();
        async move { session.run(output).await }
    });

    tokio::time::sleep(Duration::from_secs(30)).await;
    cancel.cancel();
    let summary = run.await.unwrap().unwrap();

    // One provisioning write, one failed measured write, then nothing.
    assert_eq!(controller.written_values(), ["initial-value", "1000"]);
    assert_eq!(summary.rows, 0);
    assert_eq!(summary.stats.writes, 0);
    assert_eq!(output.lines(), [CSV_HEADER]);
}

#[tokio::test(start_paused = true)]
async fn teardown_after_clean_shutdown() {
    let (controller, channel) = live_cluster();
    let mut config = ProbeConfig::default();
    config.session.teardown_on_exit = true;
    let session = ProbeSession::new(config, controller.clone(), channel)
        .with_clock(ManualClock::at(1000));
    let cancel = session.cancellation_token();

    let run = tokio::spawn(async move { session.run(SharedBuffer::new()).await });
    wait_until(|| controller.written_values().len() >= 2).await;
    cancel.cancel();
    run.await.unwrap().unwrap();

    let calls = controller.calls();
    let tail = &calls[calls.len() - 2..];
    assert_eq!(
        tail,
        [
            Call::Delete {
                kind: ObjectKind::Pod,
                name: "my-pod".to_string(),
            },
            Call::Delete {
                kind: ObjectKind::Secret,
                name: "my-secret".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn cancel_before_start_is_clean() {
    let controller = Arc::new(FakeController::new());
    let channel = Arc::new(ScriptedChannel::new(["1000"]));
    let session = ProbeSession::new(ProbeConfig::default(), controller.clone(), channel);
    session.cancellation_token().cancel();

    let summary = session.run(SharedBuffer::new()).await.unwrap();
    assert_eq!(summary.rows, 0);
}

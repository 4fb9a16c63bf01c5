//! Observation channel backed by `kubectl exec`
//!
//! A shell loop inside the pod prints the mounted value once per poll
//! interval. The child process lives inside the returned stream and is
//! killed when the stream is dropped.

use crate::command::{args, KubectlCommand};
use crate::config::KubectlConfig;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use probe_core::{LineStream, ObservationChannel, ObservationError, TargetConfig, WatchConfig};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Streams the mounted value from inside the pod
#[derive(Debug, Clone)]
pub struct KubectlObservationChannel {
    config: KubectlConfig,
    mount_path: String,
    poll_interval: Duration,
}

impl KubectlObservationChannel {
    /// Create channel for the configured mount and cadence
    #[must_use]
    pub fn new(config: KubectlConfig, target: &TargetConfig, watch: &WatchConfig) -> Self {
        Self {
            config,
            mount_path: target.mount_path.clone(),
            poll_interval: watch.poll_interval(),
        }
    }

    /// Shell loop run inside the pod
    #[must_use]
    pub fn watch_script(&self, key: &str) -> String {
        let dir = self.mount_path.trim_end_matches('/');
        format!(
            "while :; do echo $(cat {dir}/{key}); sleep {}; done",
            format_sleep(self.poll_interval)
        )
    }

    /// Full exec invocation for `consumer`
    #[must_use]
    pub fn exec_command(&self, consumer: &str, key: &str) -> KubectlCommand {
        KubectlCommand::new(&self.config).args(args::exec_shell(consumer, &self.watch_script(key)))
    }
}

/// Seconds argument for `sleep`, fractional only when needed
#[must_use]
pub fn format_sleep(interval: Duration) -> String {
    let millis = interval.as_millis();
    let (secs, frac) = (millis / 1000, millis % 1000);
    if frac == 0 {
        return secs.to_string();
    }
    let rendered = format!("{secs}.{frac:03}");
    rendered.trim_end_matches('0').to_string()
}

#[async_trait]
impl ObservationChannel for KubectlObservationChannel {
    async fn open_stream(&self, consumer: &str, key: &str) -> Result<LineStream, ObservationError> {
        let command = self.exec_command(consumer, key);
        tracing::info!(command = %command.render(), "starting pod watch");

        // stderr is inherited so kubectl's own diagnostics reach the terminal.
        let mut child = command
            .to_process()
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ObservationError::Open {
                consumer: consumer.to_string(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| ObservationError::Open {
            consumer: consumer.to_string(),
            reason: "stdout was not captured".to_string(),
        })?;
        // Split on raw bytes; invalid UTF-8 is left for the parser to reject.
        let lines = BufReader::new(stdout).split(b'\n');

        let stream = stream::unfold((lines, child), |(mut lines, mut child)| async move {
            match lines.next_segment().await {
                Ok(Some(raw)) => {
                    let line = String::from_utf8_lossy(&raw)
                        .trim_end_matches('\r')
                        .to_string();
                    Some((Ok(line), (lines, child)))
                }
                Ok(None) => {
                    match child.wait().await {
                        Ok(status) => tracing::warn!(%status, "kubectl exec exited"),
                        Err(error) => tracing::warn!(%error, "kubectl exec exited"),
                    }
                    None
                }
                Err(error) => Some((Err(ObservationError::Read(error)), (lines, child))),
            }
        });

        Ok(stream.boxed())
    }
}

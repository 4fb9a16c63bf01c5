//! kubectl process execution
//!
//! Every invocation is a [`KubectlCommand`]: the configured binary, the
//! global flags, the subcommand arguments and optional stdin. Child
//! processes are killed when their future is dropped, so cancelling a
//! session never leaves kubectl running.

use crate::config::KubectlConfig;
use probe_core::ControllerError;
use std::io;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// A single kubectl invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubectlCommand {
    binary: String,
    args: Vec<String>,
    stdin: Option<String>,
}

impl KubectlCommand {
    /// Create command carrying the global flags from `config`
    #[must_use]
    pub fn new(config: &KubectlConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            args: config.global_args(),
            stdin: None,
        }
    }

    /// Append arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed `input` on stdin
    #[inline]
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Arguments after the binary
    #[inline]
    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    /// Command line for logs and errors
    #[must_use]
    pub fn render(&self) -> String {
        std::iter::once(self.binary.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Process builder with stdout and stderr piped
    #[must_use]
    pub fn to_process(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run to completion and return stdout
    ///
    /// # Errors
    /// - `ControllerError::Spawn` if the process cannot be started or fed
    /// - `ControllerError::CommandFailed` on a non-zero exit
    pub async fn output(&self) -> Result<String, ControllerError> {
        let command = self.render();
        tracing::debug!(%command, "running kubectl");

        let spawn_error = |source| ControllerError::Spawn {
            command: command.clone(),
            source,
        };

        let mut child = self.to_process().spawn().map_err(spawn_error)?;
        if let (Some(input), Some(mut pipe)) = (&self.stdin, child.stdin.take()) {
            // An early exit closes the pipe; the exit status reports why.
            match pipe.write_all(input.as_bytes()).await {
                Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(spawn_error(e)),
                _ => {}
            }
            drop(pipe);
        }

        let output = child.wait_with_output().await.map_err(spawn_error)?;
        if !output.status.success() {
            return Err(ControllerError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Subcommand argument lists
pub mod args {
    use probe_core::ObjectKind;

    /// Render a Secret holding one key, without touching the cluster
    #[must_use]
    pub fn render_secret(name: &str, key: &str, value: &str) -> Vec<String> {
        vec![
            "create".to_string(),
            "secret".to_string(),
            "generic".to_string(),
            name.to_string(),
            format!("--from-literal={key}={value}"),
            "--dry-run=client".to_string(),
            "-o=yaml".to_string(),
        ]
    }

    /// Apply a manifest read from stdin
    #[must_use]
    pub fn apply_stdin() -> Vec<String> {
        vec!["apply".to_string(), "-f".to_string(), "-".to_string()]
    }

    /// Delete, tolerating a missing object
    #[must_use]
    pub fn delete(kind: ObjectKind, name: &str) -> Vec<String> {
        vec![
            "delete".to_string(),
            kind.as_str().to_string(),
            name.to_string(),
            "--ignore-not-found=true".to_string(),
        ]
    }

    /// Block until the pod is Ready
    #[must_use]
    pub fn wait_ready(pod: &str, timeout_secs: Option<u64>) -> Vec<String> {
        let mut args = vec![
            "wait".to_string(),
            "--for=condition=Ready".to_string(),
            format!("pod/{pod}"),
        ];
        if let Some(secs) = timeout_secs {
            args.push(format!("--timeout={secs}s"));
        }
        args
    }

    /// Set or overwrite a pod annotation
    #[must_use]
    pub fn annotate(pod: &str, key: &str, value: &str) -> Vec<String> {
        vec![
            "annotate".to_string(),
            "pods".to_string(),
            pod.to_string(),
            format!("{key}={value}"),
            "--overwrite".to_string(),
        ]
    }

    /// Run a shell script inside the pod
    #[must_use]
    pub fn exec_shell(pod: &str, script: &str) -> Vec<String> {
        vec![
            "exec".to_string(),
            pod.to_string(),
            "--".to_string(),
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use probe_core::ObjectKind;

    #[test]
    fn global_flags_come_first() {
        let config = KubectlConfig::new().with_namespace("probe");
        let cmd = KubectlCommand::new(&config).args(args::delete(ObjectKind::Pod, "my-pod"));
        assert_eq!(
            cmd.arg_list(),
            ["--namespace", "probe", "delete", "pod", "my-pod", "--ignore-not-found=true"]
        );
        assert_eq!(
            cmd.render(),
            "kubectl --namespace probe delete pod my-pod --ignore-not-found=true"
        );
    }

    #[test]
    fn secret_render_args() {
        assert_eq!(
            args::render_secret("my-secret", "time", "1700000000"),
            [
                "create",
                "secret",
                "generic",
                "my-secret",
                "--from-literal=time=1700000000",
                "--dry-run=client",
                "-o=yaml"
            ]
        );
        assert_eq!(args::apply_stdin(), ["apply", "-f", "-"]);
    }

    #[test]
    fn wait_args_with_and_without_timeout() {
        assert_eq!(
            args::wait_ready("my-pod", None),
            ["wait", "--for=condition=Ready", "pod/my-pod"]
        );
        assert_eq!(
            args::wait_ready("my-pod", Some(120)).last().map(String::as_str),
            Some("--timeout=120s")
        );
    }

    #[test]
    fn annotate_args() {
        assert_eq!(
            args::annotate("my-pod", "example.com/time-annotation", "1000"),
            [
                "annotate",
                "pods",
                "my-pod",
                "example.com/time-annotation=1000",
                "--overwrite"
            ]
        );
    }

    #[test]
    fn exec_keeps_script_as_one_argument() {
        let script = "while :; do echo $(cat /secrets/time); sleep 1; done";
        let exec = args::exec_shell("my-pod", script);
        assert_eq!(exec.len(), 6);
        assert_eq!(exec[5], script);
    }
}

//! Settings file layout

use anyhow::Context;
use probe_core::ProbeConfig;
use probe_kube::KubectlConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything the binary can be configured with
///
/// The probe tables sit at the top level next to a `[kubectl]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    #[serde(flatten)]
    pub(crate) probe: ProbeConfig,
    pub(crate) kubectl: KubectlConfig,
}

impl Settings {
    pub(crate) fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid settings in {}", path.display()))
    }

    pub(crate) fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub(crate) fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        self.probe.validate()?;
        self.kubectl.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn reads_probe_and_kubectl_tables() {
        let settings = Settings::from_toml(
            r#"
            [target]
            secret_name = "latency-secret"
            pod_name = "latency-pod"

            [watch]
            poll_interval_ms = 250

            [kubectl]
            namespace = "probe"
            "#,
        )
        .unwrap();

        assert_eq!(settings.probe.target.secret_name, "latency-secret");
        assert_eq!(settings.probe.target.pod_name, "latency-pod");
        assert_eq!(settings.probe.target.secret_key, "time");
        assert_eq!(settings.probe.watch.poll_interval_ms, 250);
        assert_eq!(settings.kubectl.namespace.as_deref(), Some("probe"));
        assert_eq!(settings.kubectl.binary, "kubectl");
    }

    #[test]
    fn printed_settings_read_back() {
        let mut settings = Settings::default();
        settings.kubectl = settings.kubectl.with_context("kind-probe");
        settings.probe.update.annotate_consumer = true;

        let text = settings.to_toml().unwrap();
        assert_eq!(Settings::from_toml(&text).unwrap(), settings);
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\nteardown_on_exit = true").unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert!(settings.probe.session.teardown_on_exit);
    }

    #[test]
    fn missing_file_names_path() {
        let err = Settings::from_file(Path::new("/nonexistent/probe.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/probe.toml"));
    }

    #[test]
    fn validation_covers_both_halves() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());
        settings.kubectl.binary = String::new();
        assert!(settings.validate().is_err());
    }
}

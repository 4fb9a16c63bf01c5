//! Resource controller backed by kubectl

use crate::command::{args, KubectlCommand};
use crate::config::KubectlConfig;
use crate::manifest::PodManifest;
use async_trait::async_trait;
use probe_core::{ConsumerSpec, ControllerError, ObjectKind, ResourceController};

/// Manages the Secret and the Pod through kubectl
#[derive(Debug, Clone)]
pub struct KubectlController {
    config: KubectlConfig,
}

impl KubectlController {
    /// Create new controller
    #[inline]
    #[must_use]
    pub fn new(config: KubectlConfig) -> Self {
        Self { config }
    }

    /// Invocation settings
    #[inline]
    pub fn config(&self) -> &KubectlConfig {
        &self.config
    }

    fn command<I, S>(&self, args: I) -> KubectlCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KubectlCommand::new(&self.config).args(args)
    }
}

#[async_trait]
impl ResourceController for KubectlController {
    async fn create_or_replace_value(
        &self,
        object: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ControllerError> {
        let rendered = self
            .command(args::render_secret(object, key, value))
            .output()
            .await?;
        self.command(args::apply_stdin())
            .stdin(rendered)
            .output()
            .await?;
        Ok(())
    }

    async fn delete_object(&self, kind: ObjectKind, name: &str) -> Result<(), ControllerError> {
        self.command(args::delete(kind, name)).output().await?;
        Ok(())
    }

    async fn create_consumer(&self, spec: &ConsumerSpec) -> Result<(), ControllerError> {
        let manifest = PodManifest::for_consumer(spec).to_yaml()?;
        let applied = self
            .command(args::apply_stdin())
            .stdin(manifest)
            .output()
            .await?;
        tracing::debug!(pod = %spec.name, output = %applied.trim(), "pod applied");
        Ok(())
    }

    async fn wait_ready(&self, name: &str) -> Result<(), ControllerError> {
        self.command(args::wait_ready(name, self.config.ready_timeout_secs))
            .output()
            .await?;
        Ok(())
    }

    async fn annotate_consumer(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ControllerError> {
        self.command(args::annotate(name, key, value)).output().await?;
        Ok(())
    }
}

//! Pod manifest for the consumer

use probe_core::{ConsumerSpec, ControllerError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const VOLUME_NAME: &str = "secret-volume";
const CONTAINER_NAME: &str = "main";
const APP_LABEL: &str = "my-app";

/// Minimal Pod object: one idle container with the secret mounted read-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodManifest {
    /// Always `v1`
    pub api_version: String,
    /// Always `Pod`
    pub kind: String,
    /// Name and labels
    pub metadata: Metadata,
    /// Pod spec
    pub spec: PodSpec,
}

/// Object metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Pod name
    pub name: String,
    /// Pod labels
    pub labels: BTreeMap<String, String>,
}

/// Pod spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Zero so deletes are immediate
    pub termination_grace_period_seconds: u32,
    /// Single container
    pub containers: Vec<Container>,
    /// Secret volume
    pub volumes: Vec<Volume>,
}

/// Container spec
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Image
    pub image: String,
    /// Keeps the container idle
    pub command: Vec<String>,
    /// Secret mount
    pub volume_mounts: Vec<VolumeMount>,
}

/// Volume mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Volume name
    pub name: String,
    /// Directory inside the container
    pub mount_path: String,
    /// Always true
    pub read_only: bool,
}

/// Pod volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name
    pub name: String,
    /// Secret source
    pub secret: SecretVolumeSource,
}

/// Secret volume source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretVolumeSource {
    /// Mounted Secret
    pub secret_name: String,
}

impl PodManifest {
    /// Build the manifest for a consumer
    #[must_use]
    pub fn for_consumer(spec: &ConsumerSpec) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            metadata: Metadata {
                name: spec.name.clone(),
                labels: BTreeMap::from([("app".to_string(), APP_LABEL.to_string())]),
            },
            spec: PodSpec {
                termination_grace_period_seconds: 0,
                containers: vec![Container {
                    name: CONTAINER_NAME.to_string(),
                    image: spec.image.clone(),
                    command: vec!["sleep".to_string(), "9999999".to_string()],
                    volume_mounts: vec![VolumeMount {
                        name: VOLUME_NAME.to_string(),
                        mount_path: spec.mount_path.clone(),
                        read_only: true,
                    }],
                }],
                volumes: vec![Volume {
                    name: VOLUME_NAME.to_string(),
                    secret: SecretVolumeSource {
                        secret_name: spec.object_name.clone(),
                    },
                }],
            },
        }
    }

    /// Render as YAML for `kubectl apply`
    ///
    /// # Errors
    /// Returns `ControllerError::Manifest` if serialization fails.
    pub fn to_yaml(&self) -> Result<String, ControllerError> {
        serde_yaml::to_string(self).map_err(|e| ControllerError::Manifest(e.to_string()))
    }
}

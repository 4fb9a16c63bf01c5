//! Resource controller seam
//!
//! Mutates the upstream data object and provisions the consumer. All
//! operations must be safe to repeat: creating replaces, deleting a missing
//! object succeeds.

use crate::error::ControllerError;
use crate::types::{ConsumerSpec, ObjectKind};
use async_trait::async_trait;

/// Upstream object and consumer management
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceController: Send + Sync {
    /// Create the object, or replace it, so that `key` holds exactly `value`
    async fn create_or_replace_value(
        &self,
        object: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ControllerError>;

    /// Delete an object; deleting a missing object is not an error
    async fn delete_object(&self, kind: ObjectKind, name: &str) -> Result<(), ControllerError>;

    /// Create the consumer that mounts the object
    async fn create_consumer(&self, spec: &ConsumerSpec) -> Result<(), ControllerError>;

    /// Block until the consumer reports ready
    async fn wait_ready(&self, name: &str) -> Result<(), ControllerError>;

    /// Set an annotation on the consumer, overwriting any previous value
    async fn annotate_consumer(
        &self,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), ControllerError>;
}

//! Observation channel seam

use crate::error::ObservationError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Raw lines as the consumer reports them, in order
///
/// The stream ends when the consumer exits or the transport is severed.
pub type LineStream = BoxStream<'static, Result<String, ObservationError>>;

/// Source of the consumer's view of the mounted value
#[async_trait]
pub trait ObservationChannel: Send + Sync {
    /// Start sampling `key` inside `consumer`
    async fn open_stream(&self, consumer: &str, key: &str) -> Result<LineStream, ObservationError>;
}

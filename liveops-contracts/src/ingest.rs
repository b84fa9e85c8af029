use async_trait::async_trait;

use crate::error::IngestError;
use crate::event::RawEvent;

/// Produces the raw event stream from an upstream live-platform client (or,
/// in tests, a fixed sequence). Calls are expected to be serialized into a
/// single task; the supervisor owns the only live `Ingest` instance.
#[async_trait]
pub trait Ingest: Send {
    /// Returns the next raw event, `Ok(None)` on a clean end of stream, or
    /// `Err` on a disconnect/decode failure.
    async fn next_event(&mut self) -> Result<Option<RawEvent>, IngestError>;
}

use async_trait::async_trait;

use crate::error::ProcessorError;
use crate::event::Event;
use crate::queue_item::QueueItemInfo;

/// The per-service processing contract. One instance is constructed per
/// active service and shared (via `Arc`) between the sequential main loop
/// and any concurrently spawned item tasks, so every method takes `&self`;
/// implementations that need mutable state guard it internally.
///
/// All hooks are optional (default no-op) except [`Processor::process_event`].
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    /// Called once before the worker's main loop starts. A failure here
    /// aborts the worker: it is logged and dropped from the active set,
    /// the supervisor continues with the remaining workers.
    async fn on_start(&self) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Called once after the main loop ends, best-effort.
    async fn on_stop(&self) {}

    /// Hook invoked just before an item is processed. No return value of
    /// consequence.
    async fn on_event_received(&self, _event: &Event, _item: &QueueItemInfo) {}

    /// Performs the work for one item. `Ok(true)` marks the item
    /// `completed`, `Ok(false)` marks it `failed`. An `Err` also marks it
    /// `failed`, with the error recorded; there is no automatic retry.
    async fn process_event(
        &self,
        event: &Event,
        item: &QueueItemInfo,
    ) -> Result<bool, ProcessorError>;

    /// Hook invoked after an item reaches a terminal state.
    async fn on_event_processed(&self, _event: &Event, _item: &QueueItemInfo, _success: bool) {}
}

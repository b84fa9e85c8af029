//! Built-in demo [`Processor`] implementations.
//!
//! Concrete service implementations (browser automation, TTS, overlay
//! pushes) are explicitly out of scope for this system (spec §1); what
//! ships here is enough to exercise the dispatcher/worker/supervisor
//! pipeline end to end against a real `registry.toml`.

use async_trait::async_trait;
use liveops_contracts::{Event, Processor, ProcessorError, QueueItemInfo};
use tokio::time::{sleep, Duration};
use tracing::info;

/// Logs each item it receives and reports success. Registered under the
/// `"logger"` service class.
pub struct LoggingProcessor {
    label: String,
}

impl LoggingProcessor {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

#[async_trait]
impl Processor for LoggingProcessor {
    async fn on_start(&self) -> Result<(), ProcessorError> {
        info!(service = %self.label, "logging processor starting");
        Ok(())
    }

    async fn on_stop(&self) {
        info!(service = %self.label, "logging processor stopped");
    }

    async fn process_event(
        &self,
        event: &Event,
        item: &QueueItemInfo,
    ) -> Result<bool, ProcessorError> {
        info!(
            service = %self.label,
            item_id = %item.id,
            priority = item.priority,
            kind = %event.kind,
            user = %event.user.handle,
            "processing event"
        );
        Ok(true)
    }
}

/// Like [`LoggingProcessor`] but sleeps briefly to stand in for an
/// external I/O call, so the `workers` demo has something visible to
/// show for concurrent vs sequential scheduling. Registered under the
/// `"slow-logger"` service class.
pub struct SlowLoggingProcessor {
    label: String,
    delay: Duration,
}

impl SlowLoggingProcessor {
    pub fn new(label: impl Into<String>, delay: Duration) -> Self {
        Self {
            label: label.into(),
            delay,
        }
    }
}

#[async_trait]
impl Processor for SlowLoggingProcessor {
    async fn process_event(
        &self,
        event: &Event,
        item: &QueueItemInfo,
    ) -> Result<bool, ProcessorError> {
        sleep(self.delay).await;
        info!(
            service = %self.label,
            item_id = %item.id,
            kind = %event.kind,
            "finished slow processing"
        );
        Ok(true)
    }
}

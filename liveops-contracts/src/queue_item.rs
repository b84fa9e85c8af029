//! The read-only view of a queue item handed to processor hooks.
//!
//! The full `QueueItem` (with its state machine and lock discipline) is
//! owned by `liveops-core`'s per-service queue; processors only ever see
//! this snapshot, taken at admission time, so later config edits or queue
//! internals can never leak into a running processor.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Stable identifier for a queue item, assigned at admission.
pub type QueueItemId = Uuid;

/// Snapshot of a queue item's admission-time configuration, passed to
/// [`crate::Processor`] hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueItemInfo {
    pub id: QueueItemId,
    pub priority: u8,
    pub concurrent: bool,
    pub enqueued_at: DateTime<Utc>,
}

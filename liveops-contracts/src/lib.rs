//! Event model and trait surfaces shared across the dispatch-and-processing
//! subsystem: the immutable [`Event`] and its streak metadata, the
//! [`Processor`] contract a service implements, and the [`Ingest`] contract
//! an upstream live-platform client implements.
//!
//! This crate has no knowledge of queues, workers, or the dispatcher; it is
//! the vocabulary they all share.

mod error;
mod event;
mod ingest;
mod processor;
mod queue_item;

pub use error::{IngestError, ProcessorError};
pub use event::{CommenterBadges, Event, EventKind, EventPayload, EventUser, RawEvent, StreakPhase};
pub use ingest::Ingest;
pub use processor::Processor;
pub use queue_item::{QueueItemId, QueueItemInfo};

/// Frequently used imports for crates that implement or consume these
/// contracts.
pub mod prelude {
    pub use crate::{
        CommenterBadges, Event, EventKind, EventPayload, EventUser, Ingest, IngestError,
        Processor, ProcessorError, QueueItemId, QueueItemInfo, RawEvent, StreakPhase,
    };
}

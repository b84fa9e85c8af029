//! Error taxonomy for the processor and ingest boundaries.
//!
//! Both are non-fatal-by-default: a `ProcessorError` is caught at the
//! worker boundary and turned into a `Failed` item, never propagated
//! further; an `IngestError` is handled by the supervisor's reconnect
//! policy before it escalates to shutdown.

/// Errors a [`crate::Processor`] may raise. Contained at the worker
/// boundary: a misbehaving service cannot crash the dispatcher or other
/// workers.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("processor failed to start: {0}")]
    StartFailed(String),

    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors a [`crate::Ingest`] adapter may raise.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("upstream connection closed")]
    Disconnected,

    #[error("failed to decode upstream event: {0}")]
    Decode(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

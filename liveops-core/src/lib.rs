//! Dispatch-and-processing core: the streak tracker, service registry,
//! per-service bounded priority queue, dispatcher, worker, and supervisor
//! that together turn a raw upstream event stream into per-service
//! processed work.
//!
//! This crate is runtime-agnostic with respect to configuration loading
//! and the CLI surface (`liveops-config`, `liveops-cli`); it only knows
//! about the [`liveops_contracts`] vocabulary and `tokio` as a scheduler.

pub mod dispatcher;
pub mod factory;
pub mod queue;
pub mod registry;
pub mod streak;
pub mod supervisor;
pub mod worker;

pub use dispatcher::{DispatchOutcome, Dispatcher, ServiceDispatchResult};
pub use factory::ProcessorFactoryRegistry;
pub use queue::{PerServiceQueue, QueueFullError, QueueItem, QueueItemState, QueueStateCounts};
pub use registry::{EventSubscription, ServiceDescriptor, ServiceRegistry};
pub use streak::StreakTracker;
pub use supervisor::{
    ShutdownHandle, ShutdownSignal, Supervisor, SupervisorConfig, SupervisorError,
    SupervisorStatus,
};
pub use worker::{ServiceWorker, WorkerConfig, WorkerHandle, WorkerStatus};

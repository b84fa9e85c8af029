//! Top-level composition: wires the streak tracker, registry, dispatcher,
//! and one worker per active service to an upstream [`Ingest`], and runs
//! the shutdown/stats machinery around them.

use std::sync::Arc;
use std::time::Duration;

use liveops_contracts::{Ingest, IngestError};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::factory::ProcessorFactoryRegistry;
use crate::registry::ServiceRegistry;
use crate::streak::StreakTracker;
use crate::worker::{ServiceWorker, WorkerConfig, WorkerHandle, WorkerStatus};

/// Fatal, startup-time configuration failures. Distinct from
/// [`liveops_contracts::ProcessorError`]: these abort construction of the
/// supervisor itself, never surface mid-run. A processor whose `on_start`
/// fails is handled separately — that service is dropped and construction
/// continues (see [`Supervisor::start`]).
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("service '{slug}' references unknown processor class '{service_class}'")]
    UnknownProcessorClass { slug: String, service_class: String },
}

/// Tunables for the supervisor's run loop.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub worker: WorkerConfig,
    /// Interval between aggregate stats log lines.
    pub stats_interval: Duration,
    /// Bounded number of ingest reconnect attempts after an
    /// [`IngestError`] before giving up and shutting down.
    pub max_ingest_retries: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            stats_interval: Duration::from_secs(30),
            max_ingest_retries: 3,
        }
    }
}

/// Cooperative shutdown trigger shared between the CLI's signal handling
/// and the supervisor's run loop. Built on `watch` rather than raw signal
/// handling so the supervisor stays testable without real OS signals.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, ShutdownSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownSignal { rx })
    }

    pub fn trigger(&self) {
        let _ = self.tx.send(true);
    }
}

/// The receiving half of a [`ShutdownHandle`], consumed by the run loop.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Aggregate snapshot across every active worker, reported on the stats
/// timer and exposed to the `workers` CLI subcommand.
#[derive(Debug, Clone)]
pub struct SupervisorStatus {
    pub workers: Vec<WorkerStatus>,
}

/// Owns the running system: the streak tracker, registry, dispatcher, and
/// the set of started workers.
pub struct Supervisor {
    registry: Arc<ServiceRegistry>,
    dispatcher: Arc<Dispatcher>,
    streak_tracker: Arc<StreakTracker>,
    config: SupervisorConfig,
    handles: Vec<WorkerHandle>,
    joins: Vec<tokio::task::JoinHandle<()>>,
}

impl Supervisor {
    /// Constructs a worker for every active service, resolving each
    /// `service_class` against `factories`. An unknown class is a fatal
    /// startup error (spec §6): the whole supervisor fails to come up
    /// rather than silently running against a misconfigured registry. A
    /// processor whose `on_start` fails is logged and that one service is
    /// dropped from the active set; the supervisor continues with the rest
    /// (spec §7), matching the original's per-worker `try`/`except` start
    /// loop.
    pub async fn start(
        registry: Arc<ServiceRegistry>,
        factories: &ProcessorFactoryRegistry,
        config: SupervisorConfig,
    ) -> Result<Self, SupervisorError> {
        let dispatcher = Arc::new(Dispatcher::new(registry.clone()));
        let streak_tracker = Arc::new(StreakTracker::new());

        let mut handles = Vec::new();
        let mut joins = Vec::new();

        for service in registry.active_services() {
            let processor = factories.build(&service.service_class).ok_or_else(|| {
                SupervisorError::UnknownProcessorClass {
                    slug: service.slug.clone(),
                    service_class: service.service_class.clone(),
                }
            })?;

            let queue = dispatcher.queue_for(&service.slug, service.max_queue_size);
            let worker = ServiceWorker::new(service.slug.clone(), queue, processor, config.worker);
            match worker.spawn().await {
                Ok((handle, join)) => {
                    info!(service = %service.slug, "worker started");
                    handles.push(handle);
                    joins.push(join);
                }
                Err(source) => {
                    error!(service = %service.slug, error = %source, "worker failed to start; skipping service");
                }
            }
        }

        Ok(Self {
            registry,
            dispatcher,
            streak_tracker,
            config,
            handles,
            joins,
        })
    }

    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            workers: self.handles.iter().map(WorkerHandle::status).collect(),
        }
    }

    /// Drives the upstream ingest until it ends, errors past the retry
    /// budget, or `shutdown` fires, then drains and stops every worker.
    pub async fn run(
        mut self,
        mut ingest: Box<dyn Ingest>,
        mut shutdown: ShutdownSignal,
    ) -> Self {
        let mut stats_interval = tokio::time::interval(self.config.stats_interval);
        let mut retries_remaining = self.config.max_ingest_retries;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.wait() => {
                    info!("shutdown signal received; draining ingest");
                    break;
                }

                _ = stats_interval.tick() => {
                    self.log_stats();
                }

                next = ingest.next_event() => {
                    match next {
                        Ok(Some(raw)) => {
                            let event = self.streak_tracker.enrich(raw);
                            let results = self.dispatcher.dispatch(event);
                            for result in results {
                                tracing::debug!(
                                    service = %result.service_slug,
                                    outcome = ?result.outcome,
                                    "dispatched"
                                );
                            }
                        }
                        Ok(None) => {
                            info!("ingest reached end of stream");
                            break;
                        }
                        Err(err) => {
                            if !self.handle_ingest_error(err, &mut retries_remaining) {
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.shutdown_workers().await;
        self
    }

    fn handle_ingest_error(&self, err: IngestError, retries_remaining: &mut u32) -> bool {
        error!(error = %err, retries_remaining = *retries_remaining, "ingest error");
        if *retries_remaining == 0 {
            error!("ingest retry budget exhausted; shutting down");
            return false;
        }
        *retries_remaining -= 1;
        true
    }

    fn log_stats(&self) {
        for status in self.handles.iter().map(WorkerHandle::status) {
            info!(
                service = %status.service_slug,
                running = status.running,
                pending = status.queue.pending,
                processing = status.queue.processing,
                in_flight_concurrent = status.in_flight_concurrent,
                "worker stats"
            );
        }
    }

    async fn shutdown_workers(&mut self) {
        for handle in &self.handles {
            handle.request_shutdown();
        }
        for join in self.joins.drain(..) {
            if let Err(err) = join.await {
                warn!(error = %err, "worker task panicked during shutdown");
            }
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use liveops_contracts::{Event, ProcessorError, QueueItemInfo, RawEvent};

    use crate::registry::{EventSubscription, ServiceDescriptor};

    struct AlwaysOk;

    #[async_trait]
    impl liveops_contracts::Processor for AlwaysOk {
        async fn process_event(
            &self,
            _event: &Event,
            _item: &QueueItemInfo,
        ) -> Result<bool, ProcessorError> {
            Ok(true)
        }
    }

    struct EmptyIngest;

    #[async_trait]
    impl Ingest for EmptyIngest {
        async fn next_event(&mut self) -> Result<Option<RawEvent>, liveops_contracts::IngestError> {
            Ok(None)
        }
    }

    fn registry_with_one_service() -> Arc<ServiceRegistry> {
        Arc::new(ServiceRegistry::new(
            vec![ServiceDescriptor {
                slug: "svc".into(),
                name: "svc".into(),
                service_class: "noop".into(),
                max_queue_size: 10,
                active: true,
            }],
            vec![(
                ("svc".into(), liveops_contracts::EventKind::Comment),
                EventSubscription {
                    enabled: true,
                    priority: 5,
                    concurrent: false,
                    discardable: true,
                    stackable: true,
                },
            )],
        ))
    }

    #[tokio::test]
    async fn unknown_processor_class_is_fatal() {
        let registry = registry_with_one_service();
        let factories = ProcessorFactoryRegistry::new();
        let result = Supervisor::start(registry, &factories, SupervisorConfig::default()).await;
        assert!(matches!(
            result,
            Err(SupervisorError::UnknownProcessorClass { .. })
        ));
    }

    struct NeverStarts;

    #[async_trait]
    impl liveops_contracts::Processor for NeverStarts {
        async fn on_start(&self) -> Result<(), ProcessorError> {
            Err(ProcessorError::StartFailed("boom".into()))
        }

        async fn process_event(
            &self,
            _event: &Event,
            _item: &QueueItemInfo,
        ) -> Result<bool, ProcessorError> {
            Ok(true)
        }
    }

    fn registry_with_two_services() -> Arc<ServiceRegistry> {
        Arc::new(ServiceRegistry::new(
            vec![
                ServiceDescriptor {
                    slug: "broken".into(),
                    name: "broken".into(),
                    service_class: "broken".into(),
                    max_queue_size: 10,
                    active: true,
                },
                ServiceDescriptor {
                    slug: "fine".into(),
                    name: "fine".into(),
                    service_class: "fine".into(),
                    max_queue_size: 10,
                    active: true,
                },
            ],
            vec![
                (
                    ("broken".into(), liveops_contracts::EventKind::Comment),
                    EventSubscription {
                        enabled: true,
                        priority: 5,
                        concurrent: false,
                        discardable: true,
                        stackable: true,
                    },
                ),
                (
                    ("fine".into(), liveops_contracts::EventKind::Comment),
                    EventSubscription {
                        enabled: true,
                        priority: 5,
                        concurrent: false,
                        discardable: true,
                        stackable: true,
                    },
                ),
            ],
        ))
    }

    #[tokio::test]
    async fn worker_start_failure_is_skipped_not_fatal() {
        let registry = registry_with_two_services();
        let mut factories = ProcessorFactoryRegistry::new();
        factories.register("broken", || Arc::new(NeverStarts) as Arc<dyn liveops_contracts::Processor>);
        factories.register("fine", || Arc::new(AlwaysOk) as Arc<dyn liveops_contracts::Processor>);

        let supervisor = Supervisor::start(registry, &factories, SupervisorConfig::default())
            .await
            .expect("a single worker's start failure must not be fatal");

        let status = supervisor.status();
        assert_eq!(status.workers.len(), 1, "only the surviving worker is tracked");
        assert_eq!(status.workers[0].service_slug, "fine");
    }

    #[tokio::test]
    async fn run_exits_on_shutdown_signal() {
        let registry = registry_with_one_service();
        let mut factories = ProcessorFactoryRegistry::new();
        factories.register("noop", || Arc::new(AlwaysOk) as Arc<dyn liveops_contracts::Processor>);

        let supervisor = Supervisor::start(registry, &factories, SupervisorConfig::default())
            .await
            .unwrap();

        let (shutdown_handle, shutdown_signal) = ShutdownHandle::new();
        shutdown_handle.trigger();

        let supervisor = supervisor.run(Box::new(EmptyIngest), shutdown_signal).await;
        assert!(!supervisor.status().workers[0].running);
    }
}

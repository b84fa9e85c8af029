//! One worker per active service: drains its queue honoring priority,
//! dispatches items sequentially or concurrently, and honors a graceful
//! shutdown signal with bounded drain grace periods.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use liveops_contracts::{Processor, QueueItemId};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::queue::{PerServiceQueue, QueueStateCounts};

/// How long the idle loop sleeps between empty polls of the queue.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Tunables for a worker's drain behavior on shutdown.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Grace period allowed for the in-flight sequential item to finish
    /// before it is abandoned (detached, not awaited further) and the
    /// loop moves on.
    pub sequential_grace: Duration,
    /// Grace period allowed for spawned concurrent tasks to finish before
    /// they are abandoned (dropped, not awaited).
    pub concurrent_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sequential_grace: Duration::from_secs(5),
            concurrent_grace: Duration::from_secs(2),
        }
    }
}

/// Point-in-time snapshot of one worker's load, mirroring the original
/// `get_status()` shape (service, running, pending, processing,
/// concurrent in-flight count).
#[derive(Debug, Clone)]
pub struct WorkerStatus {
    pub service_slug: String,
    pub running: bool,
    pub queue: QueueStateCounts,
    pub in_flight_concurrent: usize,
}

/// A handle to a running worker: lets the supervisor request shutdown and
/// poll status without holding the worker's run future directly.
pub struct WorkerHandle {
    service_slug: String,
    queue: Arc<PerServiceQueue>,
    shutdown_tx: watch::Sender<bool>,
    in_flight_concurrent: Arc<AtomicUsize>,
    running: Arc<std::sync::atomic::AtomicBool>,
}

impl WorkerHandle {
    pub fn status(&self) -> WorkerStatus {
        WorkerStatus {
            service_slug: self.service_slug.clone(),
            running: self.running.load(Ordering::Relaxed),
            queue: self.queue.state_counts(),
            in_flight_concurrent: self.in_flight_concurrent.load(Ordering::Relaxed),
        }
    }

    /// Signals the worker's run loop to stop accepting new pops. Does not
    /// itself wait for the drain; callers `.await` the run future returned
    /// by [`ServiceWorker::spawn`] for that.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Owns one service's queue and processor instance, and its main loop.
pub struct ServiceWorker {
    service_slug: String,
    queue: Arc<PerServiceQueue>,
    processor: Arc<dyn Processor>,
    config: WorkerConfig,
}

impl ServiceWorker {
    pub fn new(
        service_slug: String,
        queue: Arc<PerServiceQueue>,
        processor: Arc<dyn Processor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            service_slug,
            queue,
            processor,
            config,
        }
    }

    /// Calls the processor's `on_start`, then spawns the worker's main
    /// loop as a background task. Returns a [`WorkerHandle`] plus the
    /// `JoinHandle` for the main loop future so the caller can await its
    /// completion on shutdown.
    ///
    /// Matches the `created -> starting -> running` lifecycle: a failing
    /// `on_start` returns `Err` and no task is spawned, leaving the
    /// caller (the supervisor) to drop this service from the active set.
    pub async fn spawn(
        self,
    ) -> Result<(WorkerHandle, tokio::task::JoinHandle<()>), liveops_contracts::ProcessorError>
    {
        self.processor.on_start().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let in_flight_concurrent = Arc::new(AtomicUsize::new(0));
        let running = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let handle = WorkerHandle {
            service_slug: self.service_slug.clone(),
            queue: self.queue.clone(),
            shutdown_tx,
            in_flight_concurrent: in_flight_concurrent.clone(),
            running: running.clone(),
        };

        let join = tokio::spawn(run_loop(
            self.service_slug,
            self.queue,
            self.processor,
            self.config,
            shutdown_rx,
            in_flight_concurrent,
            running,
        ));

        Ok((handle, join))
    }
}

async fn run_loop(
    service_slug: String,
    queue: Arc<PerServiceQueue>,
    processor: Arc<dyn Processor>,
    config: WorkerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    in_flight_concurrent: Arc<AtomicUsize>,
    running: Arc<std::sync::atomic::AtomicBool>,
) {
    let mut concurrent_tasks: JoinSet<()> = JoinSet::new();

    'main: loop {
        if *shutdown_rx.borrow() {
            break 'main;
        }

        let item = match queue.pop_highest() {
            Some(item) => item,
            None => {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = shutdown_rx.changed() => {}
                }
                continue;
            }
        };

        // Reap finished concurrent tasks every iteration instead of only
        // at shutdown, so a long-lived worker's handle set doesn't grow
        // without bound.
        while concurrent_tasks.try_join_next().is_some() {}

        let info = item.info();
        processor.on_event_received(&item.event, &info).await;

        if item.concurrent {
            let processor = processor.clone();
            let queue = queue.clone();
            let item_id = item.id;
            let event = item.event.clone();
            in_flight_concurrent.fetch_add(1, Ordering::Relaxed);
            let counter = in_flight_concurrent.clone();
            concurrent_tasks.spawn(async move {
                process_one(&processor, &queue, item_id, &event, &info).await;
                counter.fetch_sub(1, Ordering::Relaxed);
            });
        } else {
            let processor = processor.clone();
            let queue = queue.clone();
            let item_id = item.id;
            let event = item.event.clone();
            let task = tokio::spawn(async move {
                process_one(&processor, &queue, item_id, &event, &info).await;
            });
            if timeout(config.sequential_grace, task).await.is_err() {
                warn!(
                    service = %service_slug,
                    item_id = %item_id,
                    "sequential grace period expired; abandoning item"
                );
            }
        }
    }

    running.store(false, Ordering::Relaxed);

    if timeout(config.concurrent_grace, async {
        while concurrent_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!(
            service = %service_slug,
            remaining = concurrent_tasks.len(),
            "concurrent grace period expired; abandoning in-flight tasks"
        );
    }

    processor.on_stop().await;
    info!(service = %service_slug, "worker stopped");
}

async fn process_one(
    processor: &Arc<dyn Processor>,
    queue: &Arc<PerServiceQueue>,
    item_id: QueueItemId,
    event: &liveops_contracts::Event,
    info: &liveops_contracts::QueueItemInfo,
) {
    let outcome = processor.process_event(event, info).await;
    let success = match &outcome {
        Ok(success) => *success,
        Err(err) => {
            error!(item_id = %item_id, error = %err, "processor raised while handling item");
            false
        }
    };

    queue.finish(item_id, success);
    processor.on_event_processed(event, info, success).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use liveops_contracts::{
        CommenterBadges, Event, EventKind, EventPayload, EventUser, ProcessorError,
    };
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use tokio::sync::Mutex as AsyncMutex;

    fn comment_event() -> Arc<Event> {
        Arc::new(Event {
            kind: EventKind::Comment,
            timestamp: chrono::Utc::now(),
            room_id: "room".into(),
            streamer_unique_id: "streamer".into(),
            user: EventUser {
                user_id: "u1".into(),
                handle: "u1".into(),
                display_name: "U1".into(),
                is_moderator: false,
                is_subscriber: false,
                gifter_level: None,
                member_level: None,
            },
            payload: EventPayload::Comment {
                text: "hi".into(),
                badges: CommenterBadges::default(),
            },
            streaking: None,
            streak_id: None,
            streak_phase: None,
        })
    }

    struct CountingProcessor {
        processed: Arc<StdAtomicUsize>,
        order: Arc<AsyncMutex<Vec<usize>>>,
        delay: Duration,
    }

    #[async_trait]
    impl Processor for CountingProcessor {
        async fn process_event(
            &self,
            _event: &Event,
            item: &liveops_contracts::QueueItemInfo,
        ) -> Result<bool, ProcessorError> {
            tokio::time::sleep(self.delay).await;
            let seq = self.processed.fetch_add(1, Ordering::SeqCst);
            self.order.lock().await.push(seq);
            let _ = item;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn sequential_items_process_one_at_a_time() {
        let queue = Arc::new(PerServiceQueue::new(10));
        for _ in 0..3 {
            queue
                .enqueue(comment_event(), "svc".into(), 5, false, true)
                .unwrap();
        }

        let processed = Arc::new(StdAtomicUsize::new(0));
        let order = Arc::new(AsyncMutex::new(Vec::new()));
        let processor = Arc::new(CountingProcessor {
            processed: processed.clone(),
            order: order.clone(),
            delay: Duration::from_millis(5),
        });

        let worker = ServiceWorker::new(
            "svc".into(),
            queue.clone(),
            processor,
            WorkerConfig::default(),
        );
        let (handle, join) = worker.spawn().await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.request_shutdown();
        join.await.unwrap();

        assert_eq!(processed.load(Ordering::SeqCst), 3);
        assert_eq!(queue.state_counts().completed, 3);
    }

    #[tokio::test]
    async fn shutdown_stops_accepting_new_pops() {
        let queue = Arc::new(PerServiceQueue::new(10));
        let processor = Arc::new(CountingProcessor {
            processed: Arc::new(StdAtomicUsize::new(0)),
            order: Arc::new(AsyncMutex::new(Vec::new())),
            delay: Duration::from_millis(1),
        });

        let worker = ServiceWorker::new(
            "svc".into(),
            queue.clone(),
            processor,
            WorkerConfig::default(),
        );
        let (handle, join) = worker.spawn().await.unwrap();

        handle.request_shutdown();
        join.await.unwrap();

        queue
            .enqueue(comment_event(), "svc".into(), 5, false, true)
            .unwrap();
        assert_eq!(queue.state_counts().pending, 1);
        assert!(!handle.status().running);
    }
}

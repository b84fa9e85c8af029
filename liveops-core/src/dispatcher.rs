//! Admission/displacement policy: for each incoming event, selects the
//! subscribed services and enforces the stackability gate, then admits,
//! displaces, or drops against each service's bounded queue.

use std::sync::Arc;

use dashmap::DashMap;
use liveops_contracts::{Event, EventKind};
use tracing::{debug, warn};

use crate::queue::PerServiceQueue;
use crate::registry::ServiceRegistry;

/// Outcome of dispatching one event against one subscribed service. Not an
/// error type — admission decisions are reported as metrics, never as
/// failures (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Admitted on the fast path: the queue had room.
    Admitted,
    /// Admitted after discarding a lower-priority pending item.
    AdmittedByDisplacement,
    /// A Gift event was withheld from an unstackable subscription because
    /// its streak phase is not `end` (and it is not a standalone gift).
    SkippedStackable,
    /// The queue was saturated and no discardable victim of strictly lower
    /// priority existed; the incoming event was dropped regardless of its
    /// own discardability.
    Dropped,
}

impl DispatchOutcome {
    pub fn is_admitted(self) -> bool {
        matches!(
            self,
            DispatchOutcome::Admitted | DispatchOutcome::AdmittedByDisplacement
        )
    }
}

/// Per-service dispatch result, returned from [`Dispatcher::dispatch`] so
/// callers (the supervisor, tests) can inspect what happened at each
/// subscribed service without re-deriving it from queue state.
#[derive(Debug, Clone)]
pub struct ServiceDispatchResult {
    pub service_slug: String,
    pub outcome: DispatchOutcome,
}

/// Holds one [`PerServiceQueue`] per active service and applies the
/// admission/displacement policy described in spec §4.4. Queues are
/// created lazily (and sized from the registry's current
/// `max_queue_size`) the first time a service is dispatched to, then kept
/// for the dispatcher's lifetime — a registry reload that changes
/// `max_queue_size` does not resize an already-running queue, matching
/// invariant 2's admission-time snapshot semantics applied at the queue
/// level.
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
    queues: DashMap<String, Arc<PerServiceQueue>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            queues: DashMap::new(),
        }
    }

    /// The queue backing one service, creating it on first use. Shared
    /// with the worker that owns popping for this service.
    pub fn queue_for(&self, slug: &str, max_queue_size: usize) -> Arc<PerServiceQueue> {
        self.queues
            .entry(slug.to_string())
            .or_insert_with(|| Arc::new(PerServiceQueue::new(max_queue_size)))
            .clone()
    }

    /// Dispatches one enriched event to every active, enabled subscriber
    /// for its kind. Never blocks on I/O; registry/queue failures degrade
    /// to `Dropped` with a logged warning rather than propagating.
    pub fn dispatch(&self, event: Event) -> Vec<ServiceDispatchResult> {
        let subscribers = self.registry.subscribers_for(event.kind);
        if subscribers.is_empty() {
            return Vec::new();
        }

        let event = Arc::new(event);
        let mut results = Vec::with_capacity(subscribers.len());

        for (service, subscription) in subscribers {
            if event.kind == EventKind::Gift
                && !subscription.stackable
                && !event.passes_unstackable_gate()
            {
                debug!(
                    service = %service.slug,
                    streak_phase = ?event.streak_phase,
                    "skipping unstackable gift event outside streak end"
                );
                results.push(ServiceDispatchResult {
                    service_slug: service.slug,
                    outcome: DispatchOutcome::SkippedStackable,
                });
                continue;
            }

            let queue = self.queue_for(&service.slug, service.max_queue_size);
            let outcome = admit(&queue, &event, &service.slug, subscription);
            results.push(ServiceDispatchResult {
                service_slug: service.slug,
                outcome,
            });
        }

        results
    }
}

fn admit(
    queue: &PerServiceQueue,
    event: &Arc<Event>,
    service_slug: &str,
    subscription: crate::registry::EventSubscription,
) -> DispatchOutcome {
    match queue.enqueue(
        event.clone(),
        service_slug.to_string(),
        subscription.priority,
        subscription.concurrent,
        subscription.discardable,
    ) {
        Ok(_) => DispatchOutcome::Admitted,
        Err(_) => match queue.displace_for(subscription.priority) {
            Some(victim) => {
                debug!(
                    service = %service_slug,
                    victim_id = %victim.id,
                    victim_priority = victim.priority,
                    candidate_priority = subscription.priority,
                    "displacing lower-priority item"
                );
                match queue.enqueue(
                    event.clone(),
                    service_slug.to_string(),
                    subscription.priority,
                    subscription.concurrent,
                    subscription.discardable,
                ) {
                    Ok(_) => DispatchOutcome::AdmittedByDisplacement,
                    Err(_) => {
                        warn!(
                            service = %service_slug,
                            "queue still full immediately after displacement; dropping"
                        );
                        DispatchOutcome::Dropped
                    }
                }
            }
            None => {
                debug!(
                    service = %service_slug,
                    priority = subscription.priority,
                    reason = "no_discardable_victim",
                    "dropping event: queue saturated with no eligible victim"
                );
                DispatchOutcome::Dropped
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EventSubscription, ServiceDescriptor};
    use liveops_contracts::{CommenterBadges, EventPayload, EventUser, StreakPhase};
    use chrono::Utc;

    fn registry_with_one_service(slug: &str, max_queue_size: usize, sub: EventSubscription) -> Arc<ServiceRegistry> {
        let descriptor = ServiceDescriptor {
            slug: slug.into(),
            name: slug.into(),
            service_class: "demo".into(),
            max_queue_size,
            active: true,
        };
        Arc::new(ServiceRegistry::new(
            vec![descriptor],
            vec![((slug.into(), EventKind::Comment), sub), ((slug.into(), EventKind::Gift), sub)],
        ))
    }

    fn comment_event() -> Event {
        Event {
            kind: EventKind::Comment,
            timestamp: Utc::now(),
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
        }
    }

    fn gift_event(phase: Option<StreakPhase>) -> Event {
        let mut event = comment_event();
        event.kind = EventKind::Gift;
        event.streak_phase = phase;
        event.payload = EventPayload::Gift {
            gift_id: "rose".into(),
            gift_name: "Rose".into(),
            diamond_value: 1,
            repeat_count: 1,
            running_total: None,
        };
        event
    }

    fn sub(priority: u8, discardable: bool, stackable: bool) -> EventSubscription {
        EventSubscription {
            enabled: true,
            priority,
            concurrent: false,
            discardable,
            stackable,
        }
    }

    #[test]
    fn admits_on_fast_path() {
        let registry = registry_with_one_service("svc", 10, sub(5, true, true));
        let dispatcher = Dispatcher::new(registry);
        let results = dispatcher.dispatch(comment_event());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome, DispatchOutcome::Admitted);
    }

    #[test]
    fn unstackable_gift_gate_skips_mid_streak_events() {
        let registry = registry_with_one_service("svc", 10, sub(5, true, false));
        let dispatcher = Dispatcher::new(registry);

        let start = dispatcher.dispatch(gift_event(Some(StreakPhase::Start)));
        assert_eq!(start[0].outcome, DispatchOutcome::SkippedStackable);

        let end = dispatcher.dispatch(gift_event(Some(StreakPhase::End)));
        assert_eq!(end[0].outcome, DispatchOutcome::Admitted);

        let standalone = dispatcher.dispatch(gift_event(None));
        assert_eq!(standalone[0].outcome, DispatchOutcome::Admitted);
    }

    #[test]
    fn saturated_queue_with_no_victim_drops() {
        let registry = registry_with_one_service("svc", 1, sub(3, true, true));
        let dispatcher = Dispatcher::new(registry);
        assert_eq!(dispatcher.dispatch(comment_event())[0].outcome, DispatchOutcome::Admitted);
        assert_eq!(dispatcher.dispatch(comment_event())[0].outcome, DispatchOutcome::Dropped);
    }

    #[test]
    fn saturated_queue_displaces_lower_priority_discardable() {
        let registry = registry_with_one_service("svc", 1, sub(3, true, true));
        let dispatcher = Dispatcher::new(registry);
        assert_eq!(dispatcher.dispatch(comment_event())[0].outcome, DispatchOutcome::Admitted);

        let gift_sub = sub(9, false, true);
        let gift_registry = ServiceRegistry::new(
            vec![ServiceDescriptor {
                slug: "svc".into(),
                name: "svc".into(),
                service_class: "demo".into(),
                max_queue_size: 1,
                active: true,
            }],
            vec![((String::from("svc"), EventKind::Gift), gift_sub)],
        );
        let dispatcher = Dispatcher {
            registry: Arc::new(gift_registry),
            queues: dispatcher.queues,
        };
        let results = dispatcher.dispatch(gift_event(None));
        assert_eq!(results[0].outcome, DispatchOutcome::AdmittedByDisplacement);
    }
}

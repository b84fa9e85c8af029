//! Read-mostly lookup of active services and their per-event-type
//! subscriptions. Reloads swap an immutable snapshot atomically so readers
//! never observe a partially-updated configuration.

use std::collections::HashMap;
use std::sync::Arc;

use liveops_contracts::EventKind;
use parking_lot::RwLock;

/// One configured downstream service.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub slug: String,
    pub name: String,
    /// Name of the registered processor factory this service resolves to.
    /// Looked up in the `ProcessorFactoryRegistry` at supervisor startup.
    pub service_class: String,
    pub max_queue_size: usize,
    pub active: bool,
}

/// A service's configuration for one event kind. Unique by
/// `(service_slug, event_kind)`.
#[derive(Debug, Clone, Copy)]
pub struct EventSubscription {
    pub enabled: bool,
    pub priority: u8,
    pub concurrent: bool,
    pub discardable: bool,
    pub stackable: bool,
}

/// An immutable point-in-time view of the registry's contents.
#[derive(Debug, Default)]
struct RegistrySnapshot {
    services: HashMap<String, ServiceDescriptor>,
    subscriptions: HashMap<(String, EventKind), EventSubscription>,
}

/// Holds the set of services and their subscriptions. Cheap to read
/// concurrently; reloads are rare and atomic.
pub struct ServiceRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl ServiceRegistry {
    pub fn new(
        services: Vec<ServiceDescriptor>,
        subscriptions: Vec<((String, EventKind), EventSubscription)>,
    ) -> Self {
        let registry = Self {
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::default())),
        };
        registry.reload(services, subscriptions);
        registry
    }

    /// Atomically replaces the registry's contents. In-flight readers keep
    /// their already-acquired `Arc` to the old snapshot; no reader ever
    /// observes a torn update.
    pub fn reload(
        &self,
        services: Vec<ServiceDescriptor>,
        subscriptions: Vec<((String, EventKind), EventSubscription)>,
    ) {
        let snapshot = RegistrySnapshot {
            services: services.into_iter().map(|s| (s.slug.clone(), s)).collect(),
            subscriptions: subscriptions.into_iter().collect(),
        };
        *self.snapshot.write() = Arc::new(snapshot);
    }

    /// Returns every `(service, subscription)` pair where the service is
    /// active and the subscription is enabled for `kind`.
    pub fn subscribers_for(&self, kind: EventKind) -> Vec<(ServiceDescriptor, EventSubscription)> {
        let snapshot = self.snapshot.read().clone();
        snapshot
            .services
            .values()
            .filter(|service| service.active)
            .filter_map(|service| {
                snapshot
                    .subscriptions
                    .get(&(service.slug.clone(), kind))
                    .filter(|sub| sub.enabled)
                    .map(|sub| (service.clone(), *sub))
            })
            .collect()
    }

    /// All active services, regardless of subscription. Used by the
    /// supervisor to size the worker pool.
    pub fn active_services(&self) -> Vec<ServiceDescriptor> {
        let snapshot = self.snapshot.read().clone();
        snapshot
            .services
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect()
    }
}

//! Declarative `registry.toml` schema: one `[[service]]` table per
//! configured downstream service, with nested `[[service.subscription]]`
//! tables describing how that service reacts to each event kind. Loaded
//! once at supervisor startup and validated before being handed to
//! `liveops_core::ServiceRegistry` as its first snapshot.

use std::collections::HashMap;
use std::path::Path;

use liveops_contracts::EventKind;
use liveops_core::{EventSubscription, ServiceDescriptor};
use serde::Deserialize;

use crate::error::ConfigError;

/// Root of the `registry.toml` document.
#[derive(Debug, Deserialize)]
pub struct RegistryDocument {
    #[serde(rename = "service", default)]
    pub services: Vec<ServiceDoc>,
}

/// One `[[service]]` table.
#[derive(Debug, Deserialize)]
pub struct ServiceDoc {
    pub slug: String,
    pub name: String,
    pub service_class: String,
    pub max_queue_size: usize,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(rename = "subscription", default)]
    pub subscriptions: Vec<SubscriptionDoc>,
    /// Opaque per-service settings (credentials, endpoints), passed
    /// through to the processor untouched — the core never interprets
    /// these (spec §6, "opaque to the core").
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

/// One `[[service.subscription]]` table.
#[derive(Debug, Deserialize)]
pub struct SubscriptionDoc {
    pub kind: EventKind,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub priority: u8,
    #[serde(default)]
    pub concurrent: bool,
    #[serde(default = "default_true")]
    pub discardable: bool,
    #[serde(default = "default_true")]
    pub stackable: bool,
}

fn default_true() -> bool {
    true
}

/// Loads and validates `registry.toml` at `path`.
pub fn load(path: impl AsRef<Path>) -> Result<RegistryDocument, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let document: RegistryDocument = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    validate(&document)?;
    Ok(document)
}

/// Checks the invariants the core assumes hold for every registry
/// snapshot: unique service slugs, priorities in `[1, 10]`, nonzero queue
/// capacities, and subscriptions only for slugs that exist.
fn validate(document: &RegistryDocument) -> Result<(), ConfigError> {
    let mut seen_slugs = std::collections::HashSet::new();
    for service in &document.services {
        if !seen_slugs.insert(service.slug.as_str()) {
            return Err(ConfigError::DuplicateServiceSlug(service.slug.clone()));
        }
        if service.max_queue_size == 0 {
            return Err(ConfigError::ZeroQueueCapacity {
                slug: service.slug.clone(),
            });
        }
        for subscription in &service.subscriptions {
            if !(1..=10).contains(&subscription.priority) {
                return Err(ConfigError::PriorityOutOfRange {
                    slug: service.slug.clone(),
                    priority: subscription.priority,
                });
            }
        }
    }
    Ok(())
}

/// Converts a validated document into the `(services, subscriptions)`
/// shape `liveops_core::ServiceRegistry::new`/`reload` accepts.
pub fn into_registry_inputs(
    document: RegistryDocument,
) -> (
    Vec<ServiceDescriptor>,
    Vec<((String, EventKind), EventSubscription)>,
) {
    let mut services = Vec::with_capacity(document.services.len());
    let mut subscriptions = Vec::new();

    for service in document.services {
        for sub in &service.subscriptions {
            subscriptions.push((
                (service.slug.clone(), sub.kind),
                EventSubscription {
                    enabled: sub.enabled,
                    priority: sub.priority,
                    concurrent: sub.concurrent,
                    discardable: sub.discardable,
                    stackable: sub.stackable,
                },
            ));
        }

        services.push(ServiceDescriptor {
            slug: service.slug,
            name: service.name,
            service_class: service.service_class,
            max_queue_size: service.max_queue_size,
            active: service.active,
        });
    }

    (services, subscriptions)
}

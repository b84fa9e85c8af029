//! Compile-time stand-in for dynamic processor resolution.
//!
//! The original Python system resolves a service's implementation class via
//! `importlib.import_module` at registry-load time. Rust has no equivalent
//! without cooking up a plugin ABI that this system doesn't need, so a
//! service's `service_class` string instead looks up a constructor function
//! registered ahead of time by the binary that owns the concrete
//! [`Processor`] implementations (`liveops-cli`).

use std::collections::HashMap;
use std::sync::Arc;

use liveops_contracts::Processor;

type ProcessorConstructor = Arc<dyn Fn() -> Arc<dyn Processor> + Send + Sync>;

/// Maps a `service_class` name (from `registry.toml`) to a constructor for
/// that service's [`Processor`]. Looked up once per active service at
/// supervisor startup; an unregistered name is a fatal configuration error
/// (spec §7), not a per-dispatch failure.
#[derive(Default, Clone)]
pub struct ProcessorFactoryRegistry {
    constructors: HashMap<String, ProcessorConstructor>,
}

impl ProcessorFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor under `service_class`. Re-registering the
    /// same name replaces the previous constructor.
    pub fn register<F>(&mut self, service_class: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn Processor> + Send + Sync + 'static,
    {
        self.constructors
            .insert(service_class.into(), Arc::new(constructor));
    }

    /// Builds a fresh processor instance for `service_class`, or `None` if
    /// no constructor is registered under that name.
    pub fn build(&self, service_class: &str) -> Option<Arc<dyn Processor>> {
        self.constructors.get(service_class).map(|ctor| ctor())
    }

    pub fn contains(&self, service_class: &str) -> bool {
        self.constructors.contains_key(service_class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use liveops_contracts::{Event, ProcessorError, QueueItemInfo};

    struct Noop;

    #[async_trait]
    impl Processor for Noop {
        async fn process_event(
            &self,
            _event: &Event,
            _item: &QueueItemInfo,
        ) -> Result<bool, ProcessorError> {
            Ok(true)
        }
    }

    #[test]
    fn unregistered_class_yields_none() {
        let registry = ProcessorFactoryRegistry::new();
        assert!(registry.build("nonexistent").is_none());
        assert!(!registry.contains("nonexistent"));
    }

    #[test]
    fn registered_class_builds_instances() {
        let mut registry = ProcessorFactoryRegistry::new();
        registry.register("noop", || Arc::new(Noop) as Arc<dyn Processor>);
        assert!(registry.contains("noop"));
        assert!(registry.build("noop").is_some());
    }
}

//! File-backed configuration for the dispatch-and-processing platform: a
//! flat key/value store for scalars like `streamer_handle`, and a
//! declarative `registry.toml` loader/validator for service descriptors
//! and their event subscriptions.

pub mod error;
pub mod registry_doc;
pub mod store;

pub use error::ConfigError;
pub use registry_doc::{RegistryDocument, ServiceDoc, SubscriptionDoc};
pub use store::ConfigStore;

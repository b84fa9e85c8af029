//! Error taxonomy for configuration loading and validation. Every variant
//! here is fatal at supervisor startup (spec §7); there is no runtime
//! recovery path for a malformed configuration.

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path} as TOML: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("required key '{0}' is not set")]
    MissingKey(String),

    #[error("duplicate service slug '{0}' in registry document")]
    DuplicateServiceSlug(String),

    #[error(
        "service '{slug}' subscription priority {priority} is out of range [1, 10]"
    )]
    PriorityOutOfRange { slug: String, priority: u8 },

    #[error("service '{slug}' has max_queue_size 0; queues must hold at least one item")]
    ZeroQueueCapacity { slug: String },

    #[error("subscription for unknown service slug '{0}'")]
    UnknownServiceSlug(String),
}

//! A flat, file-backed key/value configuration store, satisfying the
//! "streamer_handle and friends live in a key/value store" surface from
//! spec §6. Values are plain strings; callers parse what they need.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

/// A `BTreeMap<String, String>` persisted as a single TOML document.
/// `BTreeMap` rather than `HashMap` so writes are deterministic (stable
/// key order), which keeps diffs of the on-disk file readable.
#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl ConfigStore {
    /// Loads the store from `path`, or starts empty if the file does not
    /// yet exist (the common case on first run).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        Ok(Self { path, values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns `key`'s value or `ConfigError::MissingKey`, for callers
    /// (like the supervisor's `streamer_handle` lookup) where absence is
    /// fatal rather than optional.
    pub fn require(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    /// Sets `key` to `value` in memory and persists the whole store to
    /// disk immediately; the store is small and writes are rare (operator
    /// CLI invocations), so there is no batching.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), ConfigError> {
        self.values.insert(key.into(), value.into());
        self.save()
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let serialized = toml::to_string_pretty(&self.values)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        std::fs::write(&self.path, serialized).map_err(|source| ConfigError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        debug!(path = %self.path.display(), keys = self.values.len(), "config store saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

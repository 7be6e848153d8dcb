//! Operational facts registry.
//!
//! Components push facts (cache size, active backend, downloader version)
//! into a shared [`Registry`] owned by the process; reporting endpoints read
//! a JSON snapshot of it.

use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};

/// Registry key holding the number of cached entries.
pub const CACHE_SIZE: &str = "cache_size";

/// Registry key naming the active cache backend.
pub const CACHE_BACKEND: &str = "cache_backend";

pub const DOWNLOADER_NAME: &str = "downloader.name";
pub const DOWNLOADER_VERSION: &str = "downloader.version";

/// Key/value registry for operational facts.
#[derive(Debug)]
pub struct Registry {
    info: RwLock<Map<String, Value>>,
}

impl Registry {
    /// Create a registry seeded with the init time and process id.
    pub fn new() -> Self {
        let mut info = Map::new();
        info.insert("inittime".into(), Value::String(chrono::Local::now().to_rfc3339()));
        info.insert("pid".into(), Value::String(std::process::id().to_string()));
        Self { info: RwLock::new(info) }
    }

    /// Register (or overwrite) a fact.
    pub fn register(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut info = self.info.write().unwrap_or_else(PoisonError::into_inner);
        info.insert(key.into(), value.into());
    }

    /// Read a single fact.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.info
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Copy of every registered fact.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.info.read().unwrap_or_else(PoisonError::into_inner).clone())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

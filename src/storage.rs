//! Durable key-value storage for per-site flags and background counters.
//!
//! Mirrors the extension storage area: `get` a set of keys, `set` a batch,
//! `remove` one key. Every call may fail; callers log and carry on.

use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::core::state::OverlayMode;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage I/O failed for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("storage contents are not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub trait KeyValueStore: Send + Sync {
    /// Fetch the requested keys; missing keys are absent from the result
    fn get(&self, keys: &[&str]) -> StoreResult<HashMap<String, Value>>;

    fn set(&self, items: HashMap<String, Value>) -> StoreResult<()>;

    fn remove(&self, key: &str) -> StoreResult<()>;
}

/// Persistence key for a host, e.g. `galactic_example.com`
pub fn site_key(mode: OverlayMode, host: &str) -> String {
    format!("{}{}", mode.key_prefix(), host)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory store. Can be switched offline to exercise failure paths.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, Value>>,
    offline: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `Unavailable` (or recover)
    pub fn set_offline(&self, offline: bool) {
        *lock(&self.offline) = offline;
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.items).contains_key(key)
    }

    fn check_online(&self) -> StoreResult<()> {
        if *lock(&self.offline) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, keys: &[&str]) -> StoreResult<HashMap<String, Value>> {
        self.check_online()?;
        let items = lock(&self.items);
        Ok(keys
            .iter()
            .filter_map(|key| items.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    fn set(&self, items: HashMap<String, Value>) -> StoreResult<()> {
        self.check_online()?;
        lock(&self.items).extend(items);
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        self.check_online()?;
        lock(&self.items).remove(key);
        Ok(())
    }
}

/// JSON file backed store (one object, rewritten on every change)
pub struct JsonFileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles
    guard: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn read_all(&self) -> StoreResult<HashMap<String, Value>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, items: &HashMap<String, Value>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let contents = serde_json::to_string_pretty(items)?;
        fs::write(&self.path, contents).map_err(|e| self.io_error(e))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, keys: &[&str]) -> StoreResult<HashMap<String, Value>> {
        let _guard = lock(&self.guard);
        let mut all = self.read_all()?;
        Ok(keys
            .iter()
            .filter_map(|key| all.remove(*key).map(|v| (key.to_string(), v)))
            .collect())
    }

    fn set(&self, items: HashMap<String, Value>) -> StoreResult<()> {
        let _guard = lock(&self.guard);
        let mut all = self.read_all()?;
        all.extend(items);
        self.write_all(&all)
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let _guard = lock(&self.guard);
        let mut all = self.read_all()?;
        if all.remove(key).is_some() {
            self.write_all(&all)?;
        }
        Ok(())
    }
}

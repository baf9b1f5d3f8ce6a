//! In-process key/value store.
//!
//! Clones share the same map, so a test can hand one clone to a facade,
//! drop the facade, and build a new one on another clone to simulate a
//! process restart.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::kv::{KvStore, KvWrite};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry, for assertions.
    pub fn entries(&self) -> HashMap<String, String> {
        self.entries
            .lock()
            .map(|map| map.clone())
            .unwrap_or_default()
    }

    fn with_map<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        let mut map = self.entries.lock().map_err(|_| CoreError::LockPoisoned)?;
        Ok(f(&mut map))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_map(|map| map.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.with_map(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.with_map(|map| {
            map.remove(key);
        })
    }

    fn write_batch(&mut self, writes: &[KvWrite]) -> Result<()> {
        self.with_map(|map| {
            for write in writes {
                match write {
                    KvWrite::Set { key, value } => {
                        map.insert((*key).to_string(), value.clone());
                    }
                    KvWrite::Delete { key } => {
                        map.remove(*key);
                    }
                }
            }
        })
    }
}

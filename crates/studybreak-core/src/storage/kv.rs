//! Key/value store abstraction.
//!
//! Settings and timer state live in a flat preferences-style store: string
//! keys, string values. Typed access is layered on top by the callers.

use crate::error::Result;

/// One write in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvWrite {
    Set { key: &'static str, value: String },
    Delete { key: &'static str },
}

impl KvWrite {
    pub fn set(key: &'static str, value: impl Into<String>) -> Self {
        KvWrite::Set {
            key,
            value: value.into(),
        }
    }

    pub fn delete(key: &'static str) -> Self {
        KvWrite::Delete { key }
    }
}

/// Durable string key/value store.
///
/// Implementations must have finished writing by the time a mutating call
/// returns.
pub trait KvStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    fn delete(&mut self, key: &str) -> Result<()>;

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Apply several writes. Backends that can do so apply them atomically.
    fn write_batch(&mut self, writes: &[KvWrite]) -> Result<()> {
        for write in writes {
            match write {
                KvWrite::Set { key, value } => self.set(key, value)?,
                KvWrite::Delete { key } => self.delete(key)?,
            }
        }
        Ok(())
    }
}

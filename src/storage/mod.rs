//! Durable key-value substrate.
//!
//! The local store persists through a string-keyed, string-valued namespace:
//! one entry for the schema version, one for the last-update timestamp, one
//! for the cached query-key set and one per cached entity type. Absence of a
//! key is a valid state, distinct from an empty value.

mod sqlite;

pub use sqlite::SqliteStorage;

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{CacheError, Result};

/// A synchronous key-value storage backend.
pub trait KvStorage: Send + Sync {
  /// The value stored under `key`, if any.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`; removing an absent key is a no-op.
  fn remove(&self, key: &str) -> Result<()>;

  /// All stored keys starting with `prefix`.
  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-process storage for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
  /// Create an empty storage.
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, String>>> {
    self
      .entries
      .lock()
      .map_err(|e| CacheError::UnsupportedEnvironment(format!("storage lock poisoned: {e}")))
  }
}

impl KvStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    self.lock()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    self.lock()?.remove(key);
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let entries = self.lock()?;
    Ok(
      entries
        .range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, _)| key.clone())
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // Shared conformance checks so both backends agree on semantics.
  pub(super) fn check_basic_ops(storage: &dyn KvStorage) {
    assert_eq!(storage.get("a").unwrap(), None);

    storage.set("a", "1").unwrap();
    storage.set("a", "2").unwrap();
    assert_eq!(storage.get("a").unwrap(), Some("2".to_string()));

    storage.set("empty", "").unwrap();
    assert_eq!(storage.get("empty").unwrap(), Some(String::new()));

    storage.remove("a").unwrap();
    assert_eq!(storage.get("a").unwrap(), None);
    storage.remove("a").unwrap();
  }

  pub(super) fn check_prefix_scan(storage: &dyn KvStorage) {
    storage.set("pfx:a", "1").unwrap();
    storage.set("pfx:b", "2").unwrap();
    storage.set("other:c", "3").unwrap();

    let mut keys = storage.keys_with_prefix("pfx:").unwrap();
    keys.sort();
    assert_eq!(keys, vec!["pfx:a".to_string(), "pfx:b".to_string()]);

    assert!(storage.keys_with_prefix("nothing:").unwrap().is_empty());
  }

  #[test]
  fn memory_basic_ops() {
    check_basic_ops(&MemoryStorage::new());
  }

  #[test]
  fn memory_prefix_scan() {
    check_prefix_scan(&MemoryStorage::new());
  }
}

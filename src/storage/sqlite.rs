//! SQLite-backed key-value storage.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::KvStorage;
use crate::error::{CacheError, Result};

/// Schema for the key-value table.
const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Key-value storage over a single SQLite table.
///
/// The connection sits behind a mutex so the trait methods can take `&self`;
/// the store itself is still meant for single-owner use.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open storage at the default location.
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        CacheError::UnsupportedEnvironment(format!("failed to create storage directory: {e}"))
      })?;
    }

    Self::open_at(&path)
  }

  /// Open storage at an explicit path.
  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path).map_err(|e| {
      CacheError::UnsupportedEnvironment(format!(
        "failed to open storage at {}: {e}",
        path.display()
      ))
    })?;
    Self::from_connection(conn)
  }

  /// Open a transient in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| CacheError::UnsupportedEnvironment(format!("failed to open storage: {e}")))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn.execute_batch(KV_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// The default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| {
        CacheError::UnsupportedEnvironment("could not determine data directory".to_string())
      })?;

    Ok(data_dir.join("entcache").join("cache.db"))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::UnsupportedEnvironment(format!("storage lock poisoned: {e}")))
  }
}

impl KvStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    let value = conn
      .query_row("SELECT value FROM kv_store WHERE key = ?", params![key], |row| {
        row.get(0)
      })
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;
    conn.execute(
      "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?, ?)",
      params![key, value],
    )?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
    Ok(())
  }

  fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT key FROM kv_store WHERE key >= ? ORDER BY key")?;
    let keys = stmt
      .query_map(params![prefix], |row| row.get::<_, String>(0))?
      .filter_map(|r| r.ok())
      .take_while(|key| key.starts_with(prefix))
      .collect();
    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::super::tests::{check_basic_ops, check_prefix_scan};
  use super::*;

  #[test]
  fn sqlite_basic_ops() {
    check_basic_ops(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn sqlite_prefix_scan() {
    check_prefix_scan(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
      let storage = SqliteStorage::open_at(&path).unwrap();
      storage.set("pfx:dbver", "v1").unwrap();
    }

    let storage = SqliteStorage::open_at(&path).unwrap();
    assert_eq!(storage.get("pfx:dbver").unwrap(), Some("v1".to_string()));
  }
}

//! Key-value storage trait and its SQLite and in-memory implementations.

use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, StoreError};

/// Trait for persistent key-value backends.
///
/// Each entity type lives under one key holding a JSON-serialized array.
pub trait KeyValueStore: Send + Sync {
  /// Read the raw value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Check whether `key` has been written.
  fn contains(&self, key: &str) -> Result<bool> {
    Ok(self.get(key)?.is_some())
  }

  /// Remove `key`. Missing keys are not an error.
  fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local storage. Nothing survives a restart.
///
/// An optional byte quota makes quota-exceeded failures reproducible.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, String>>,
  quota: Option<usize>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Limit the total stored bytes (keys plus values).
  pub fn with_quota(quota: usize) -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
      quota: Some(quota),
    }
  }
}

impl KeyValueStore for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| StoreError::Persistence(format!("Lock poisoned: {}", e)))?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| StoreError::Persistence(format!("Lock poisoned: {}", e)))?;

    if let Some(quota) = self.quota {
      let used: usize = entries
        .iter()
        .filter(|(k, _)| k.as_str() != key)
        .map(|(k, v)| k.len() + v.len())
        .sum();
      if used + key.len() + value.len() > quota {
        return Err(StoreError::Persistence(format!(
          "Storage quota of {} bytes exceeded while writing {}",
          quota, key
        )));
      }
    }

    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| StoreError::Persistence(format!("Lock poisoned: {}", e)))?;
    entries.remove(key);
    Ok(())
  }
}

/// SQLite-based key-value storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        StoreError::Persistence(format!("Failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      StoreError::Persistence(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_connection(conn)
  }

  /// Open a throwaway in-memory database.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()?;
    Self::from_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Configuration("Could not determine data directory".into()))?;

    Ok(data_dir.join("sparkdeck").join("cache.db"))
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for the key-value table.
  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(STORAGE_SCHEMA)
      .map_err(|e| StoreError::Persistence(format!("Failed to run cache migrations: {}", e)))
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| StoreError::Persistence(format!("Lock poisoned: {}", e)))
  }
}

/// Schema for the key-value table.
const STORAGE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    storage_key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl KeyValueStore for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT value FROM kv_store WHERE storage_key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| StoreError::Persistence(format!("Failed to read {}: {}", key, e)))
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv_store (storage_key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| StoreError::Persistence(format!("Failed to write {}: {}", key, e)))?;
    Ok(())
  }

  fn contains(&self, key: &str) -> Result<bool> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM kv_store WHERE storage_key = ?",
        params![key],
        |row| row.get(0),
      )
      .map_err(|e| StoreError::Persistence(format!("Failed to read {}: {}", key, e)))?;
    Ok(count > 0)
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute("DELETE FROM kv_store WHERE storage_key = ?", params![key])
      .map_err(|e| StoreError::Persistence(format!("Failed to delete {}: {}", key, e)))?;
    Ok(())
  }
}

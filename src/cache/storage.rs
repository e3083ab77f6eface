//! Cache storage trait with SQLite, in-memory and no-op backends.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A single cached entry.
#[derive(Debug, Clone)]
pub struct CachedBlob {
  /// Serialized value
  pub data: Vec<u8>,
  /// When the entry was stored
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Get an entry by key.
  fn get(&self, key: &str) -> Result<Option<CachedBlob>>;

  /// Insert or replace an entry.
  fn put(&self, key: &str, description: &str, data: &[u8]) -> Result<()>;

  /// Drop every entry.
  fn clear(&self) -> Result<()>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Result<Option<CachedBlob>> {
    Ok(None) // Always miss
  }

  fn put(&self, _key: &str, _description: &str, _data: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn clear(&self) -> Result<()> {
    Ok(())
  }
}

/// Process-local storage, used when nothing should be written to disk.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, CachedBlob>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  #[cfg(test)]
  pub fn insert_at(&self, key: &str, data: &[u8], cached_at: DateTime<Utc>) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.insert(
        key.to_string(),
        CachedBlob {
          data: data.to_vec(),
          cached_at,
        },
      );
    }
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<CachedBlob>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.get(key).cloned())
  }

  fn put(&self, key: &str, _description: &str, data: &[u8]) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(
      key.to_string(),
      CachedBlob {
        data: data.to_vec(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn clear(&self) -> Result<()> {
    self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .clear();
    Ok(())
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open the store at `path`, or at the default location.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("jira-soap").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per cached call (serialized JSON)
CREATE TABLE IF NOT EXISTS call_cache (
    cache_key TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl CacheStorage for SqliteStorage {
  fn get(&self, key: &str) -> Result<Option<CachedBlob>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM call_cache WHERE cache_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read cache entry: {}", e))?;

    match row {
      Some((data, cached_at_str)) => Ok(Some(CachedBlob {
        data,
        cached_at: parse_datetime(&cached_at_str)?,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, key: &str, description: &str, data: &[u8]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO call_cache (cache_key, description, data, cached_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![key, description, data],
      )
      .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

    Ok(())
  }

  fn clear(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM call_cache", [])
      .map_err(|e| eyre!("Failed to clear cache: {}", e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_sqlite_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = SqliteStorage::open(Some(&dir.path().join("nested").join("cache.db"))).unwrap();

    assert!(storage.get("priorities").unwrap().is_none());

    storage.put("priorities", "priorities", b"{\"minor\":{}}").unwrap();
    let blob = storage.get("priorities").unwrap().unwrap();
    assert_eq!(blob.data, b"{\"minor\":{}}");
    assert!(Utc::now() - blob.cached_at < chrono::Duration::minutes(1));

    storage.put("priorities", "priorities", b"{}").unwrap();
    assert_eq!(storage.get("priorities").unwrap().unwrap().data, b"{}");
  }

  #[test]
  fn test_sqlite_persists_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    {
      let storage = SqliteStorage::open(Some(&path)).unwrap();
      storage.put("projects", "projects", b"[]").unwrap();
    }
    let storage = SqliteStorage::open(Some(&path)).unwrap();
    assert_eq!(storage.get("projects").unwrap().unwrap().data, b"[]");

    storage.clear().unwrap();
    assert!(storage.get("projects").unwrap().is_none());
  }

  #[test]
  fn test_memory_storage() {
    let storage = MemoryStorage::new();
    storage.put("status", "status", b"1").unwrap();
    assert_eq!(storage.get("status").unwrap().unwrap().data, b"1");
    storage.clear().unwrap();
    assert!(storage.get("status").unwrap().is_none());
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    storage.put("status", "status", b"1").unwrap();
    assert!(storage.get("status").unwrap().is_none());
  }

  #[test]
  fn test_parse_datetime() {
    let dt = parse_datetime("2024-03-01 12:30:00").unwrap();
    assert_eq!(dt.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    assert!(parse_datetime("yesterday").is_err());
  }
}

//! SQLite-backed cache store.

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use super::store::{CacheStore, CachedResource};
use crate::error::{AgentError, Result};

/// Durable cache store. One row per (generation, url); writes are single
/// statements, so per-key atomicity comes from SQLite itself.
pub struct SqliteCacheStore {
  conn: Mutex<Connection>,
}

/// Schema for the resource cache.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cached_resources (
    generation TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (generation, url)
);

CREATE INDEX IF NOT EXISTS idx_cached_resources_generation
    ON cached_resources(generation);
"#;

impl SqliteCacheStore {
  /// Open or create the cache database at the default location.
  pub fn open_default() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| AgentError::Storage("could not determine data directory".to_string()))?;

    Self::open(&data_dir.join("storefront-sw").join("cache.db"))
  }

  /// Open or create the cache database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| AgentError::Storage(format!("failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      AgentError::Storage(format!("failed to open cache db at {}: {}", path.display(), e))
    })?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| AgentError::Storage(format!("failed to run cache migrations: {}", e)))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| AgentError::Storage(format!("lock poisoned: {}", e)))
  }
}

impl CacheStore for SqliteCacheStore {
  fn put(&self, generation: &str, url: &str, resource: &CachedResource) -> Result<()> {
    let conn = self.lock()?;
    let headers = serde_json::to_string(&resource.headers)
      .map_err(|e| AgentError::Storage(format!("failed to serialize headers: {}", e)))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cached_resources (generation, url, status, headers, body, cached_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))",
        params![generation, url, resource.status, headers, resource.body],
      )
      .map_err(|e| AgentError::Storage(format!("failed to store resource: {}", e)))?;

    Ok(())
  }

  fn get(&self, generation: &str, url: &str) -> Result<Option<CachedResource>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT status, headers, body FROM cached_resources
         WHERE generation = ? AND url = ?",
      )
      .map_err(|e| AgentError::Storage(format!("failed to prepare query: {}", e)))?;

    let row: std::result::Result<(u16, String, Vec<u8>), rusqlite::Error> = stmt
      .query_row(params![generation, url], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
      });

    match row {
      Ok((status, headers, body)) => {
        let headers: Vec<(String, String)> = serde_json::from_str(&headers)
          .map_err(|e| AgentError::Storage(format!("failed to parse headers: {}", e)))?;
        Ok(Some(CachedResource {
          status,
          headers,
          body,
        }))
      }
      // A missing entry is a miss, not a failure
      Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
      Err(e) => Err(AgentError::Storage(format!(
        "failed to read resource {}: {}",
        url, e
      ))),
    }
  }

  fn generations(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT generation FROM cached_resources ORDER BY generation")
      .map_err(|e| AgentError::Storage(format!("failed to prepare query: {}", e)))?;

    let tags = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| AgentError::Storage(format!("failed to list generations: {}", e)))?
      .collect::<std::result::Result<Vec<String>, _>>()
      .map_err(|e| AgentError::Storage(format!("failed to read generation row: {}", e)))?;

    Ok(tags)
  }

  fn purge_except(&self, keep: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let purged: Vec<String> = {
      let mut stmt = conn
        .prepare("SELECT DISTINCT generation FROM cached_resources WHERE generation != ?")
        .map_err(|e| AgentError::Storage(format!("failed to prepare query: {}", e)))?;

      let rows = stmt
        .query_map(params![keep], |row| row.get(0))
        .map_err(|e| AgentError::Storage(format!("failed to list generations: {}", e)))?
        .collect::<std::result::Result<Vec<String>, _>>()
        .map_err(|e| AgentError::Storage(format!("failed to read generation row: {}", e)))?;
      rows
    };

    conn
      .execute(
        "DELETE FROM cached_resources WHERE generation != ?",
        params![keep],
      )
      .map_err(|e| AgentError::Storage(format!("failed to purge old generations: {}", e)))?;

    Ok(purged)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn resource(body: &[u8]) -> CachedResource {
    CachedResource {
      status: 200,
      headers: vec![("content-type".to_string(), "image/webp".to_string())],
      body: body.to_vec(),
    }
  }

  #[test]
  fn survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
      let store = SqliteCacheStore::open(&path).unwrap();
      store.put("v1", "https://shop.example/", &resource(b"page")).unwrap();
    }

    let store = SqliteCacheStore::open(&path).unwrap();
    let cached = store.get("v1", "https://shop.example/").unwrap().unwrap();
    assert_eq!(cached.body, b"page");
    assert_eq!(cached.headers[0].1, "image/webp");
  }

  #[test]
  fn purge_except_deletes_other_generations() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteCacheStore::open(&dir.path().join("cache.db")).unwrap();

    store.put("v1", "https://shop.example/a", &resource(b"a")).unwrap();
    store.put("v1", "https://shop.example/b", &resource(b"b")).unwrap();
    store.put("v2", "https://shop.example/a", &resource(b"a2")).unwrap();

    let purged = store.purge_except("v2").unwrap();
    assert_eq!(purged, vec!["v1".to_string()]);
    assert_eq!(store.generations().unwrap(), vec!["v2".to_string()]);
    assert!(store.get("v1", "https://shop.example/a").unwrap().is_none());
    assert!(store.get("v2", "https://shop.example/a").unwrap().is_some());
  }

  #[test]
  fn missing_entry_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteCacheStore::open(&dir.path().join("cache.db")).unwrap();
    assert!(store.get("v1", "https://shop.example/nope").unwrap().is_none());
  }

  #[test]
  fn corrupt_row_is_a_storage_error_not_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");
    let store = SqliteCacheStore::open(&path).unwrap();

    // Write a row with a non-numeric status behind the store's back
    let conn = Connection::open(&path).unwrap();
    conn
      .execute(
        "INSERT INTO cached_resources (generation, url, status, headers, body, cached_at)
         VALUES ('v1', 'https://shop.example/', 'bogus', '[]', x'00', datetime('now'))",
        [],
      )
      .unwrap();

    assert!(store.get("v1", "https://shop.example/").is_err());
    // Absent entries are still a plain miss
    assert!(store.get("v1", "https://shop.example/other").unwrap().is_none());
  }
}

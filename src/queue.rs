//! Durable queue for orders placed while offline.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{AgentError, Result};

/// An order awaiting delivery. `id` is the caller's dedup key; re-delivery
/// after a crash mid-replay is safe because the remote end dedups on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOrder {
  pub id: String,
  /// Opaque order record, forwarded to the endpoint as-is.
  pub payload: serde_json::Value,
  pub timestamp: DateTime<Utc>,
}

impl QueuedOrder {
  pub fn new(id: impl Into<String>, payload: serde_json::Value) -> Self {
    Self {
      id: id.into(),
      payload,
      timestamp: Utc::now(),
    }
  }
}

/// Trait for order queue backends. Keyed on `id` with a secondary index on
/// `timestamp`; `list_all` iterates in timestamp order, which is the only
/// ordering the replay loop relies on.
pub trait OrderQueue: Send + Sync {
  /// Insert an order, replacing any existing record with the same id.
  fn insert(&self, order: &QueuedOrder) -> Result<()>;

  /// All queued orders in timestamp order.
  fn list_all(&self) -> Result<Vec<QueuedOrder>>;

  /// Remove a delivered order. Deleting an absent id is a no-op.
  fn delete_by_id(&self, id: &str) -> Result<()>;
}

/// In-memory queue for tests and embedded hosts.
pub struct MemoryOrderQueue {
  orders: Mutex<Vec<QueuedOrder>>,
}

impl MemoryOrderQueue {
  pub fn new() -> Self {
    Self {
      orders: Mutex::new(Vec::new()),
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<QueuedOrder>>> {
    self
      .orders
      .lock()
      .map_err(|e| AgentError::Storage(format!("lock poisoned: {}", e)))
  }
}

impl Default for MemoryOrderQueue {
  fn default() -> Self {
    Self::new()
  }
}

impl OrderQueue for MemoryOrderQueue {
  fn insert(&self, order: &QueuedOrder) -> Result<()> {
    let mut orders = self.lock()?;
    orders.retain(|o| o.id != order.id);
    orders.push(order.clone());
    Ok(())
  }

  fn list_all(&self) -> Result<Vec<QueuedOrder>> {
    let mut orders = self.lock()?.clone();
    orders.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(orders)
  }

  fn delete_by_id(&self, id: &str) -> Result<()> {
    self.lock()?.retain(|o| o.id != id);
    Ok(())
  }
}

/// SQLite-backed queue; survives process restarts.
pub struct SqliteOrderQueue {
  conn: Mutex<Connection>,
}

/// Schema for the order queue.
const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS queued_orders (
    id TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_queued_orders_queued_at
    ON queued_orders(queued_at);
"#;

impl SqliteOrderQueue {
  /// Open or create the queue database at the default location.
  pub fn open_default() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| AgentError::Storage("could not determine data directory".to_string()))?;

    Self::open(&data_dir.join("storefront-sw").join("orders.db"))
  }

  /// Open or create the queue database at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| AgentError::Storage(format!("failed to create queue directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      AgentError::Storage(format!("failed to open queue db at {}: {}", path.display(), e))
    })?;

    conn
      .execute_batch(QUEUE_SCHEMA)
      .map_err(|e| AgentError::Storage(format!("failed to run queue migrations: {}", e)))?;

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

impl OrderQueue for SqliteOrderQueue {
  fn insert(&self, order: &QueuedOrder) -> Result<()> {
    let conn = self.lock()?;
    let payload = serde_json::to_string(&order.payload)
      .map_err(|e| AgentError::Storage(format!("failed to serialize order payload: {}", e)))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO queued_orders (id, payload, queued_at) VALUES (?, ?, ?)",
        params![order.id, payload, order.timestamp.to_rfc3339()],
      )
      .map_err(|e| AgentError::Storage(format!("failed to queue order: {}", e)))?;

    Ok(())
  }

  fn list_all(&self) -> Result<Vec<QueuedOrder>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT id, payload, queued_at FROM queued_orders ORDER BY queued_at")
      .map_err(|e| AgentError::Storage(format!("failed to prepare query: {}", e)))?;

    let rows = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
      .map_err(|e| AgentError::Storage(format!("failed to list orders: {}", e)))?
      .collect::<std::result::Result<Vec<(String, String, String)>, _>>()
      .map_err(|e| AgentError::Storage(format!("failed to read order row: {}", e)))?;

    let mut orders = Vec::with_capacity(rows.len());
    for (id, payload, queued_at) in rows {
      let payload = serde_json::from_str(&payload)
        .map_err(|e| AgentError::Storage(format!("failed to parse order {}: {}", id, e)))?;
      let timestamp = DateTime::parse_from_rfc3339(&queued_at)
        .map_err(|e| AgentError::Storage(format!("failed to parse timestamp for {}: {}", id, e)))?
        .with_timezone(&Utc);

      orders.push(QueuedOrder {
        id,
        payload,
        timestamp,
      });
    }

    Ok(orders)
  }

  fn delete_by_id(&self, id: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute("DELETE FROM queued_orders WHERE id = ?", params![id])
      .map_err(|e| AgentError::Storage(format!("failed to delete order {}: {}", id, e)))?;

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use serde_json::json;

  #[test]
  fn memory_queue_insert_list_delete() {
    let queue = MemoryOrderQueue::new();
    queue.insert(&QueuedOrder::new("ord-1", json!({"total": 12}))).unwrap();
    queue.insert(&QueuedOrder::new("ord-2", json!({"total": 7}))).unwrap();

    assert_eq!(queue.list_all().unwrap().len(), 2);

    queue.delete_by_id("ord-1").unwrap();
    let remaining = queue.list_all().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "ord-2");

    // Deleting an absent id is a no-op
    queue.delete_by_id("ord-1").unwrap();
  }

  #[test]
  fn same_id_replaces() {
    let queue = MemoryOrderQueue::new();
    queue.insert(&QueuedOrder::new("ord-1", json!({"total": 1}))).unwrap();
    queue.insert(&QueuedOrder::new("ord-1", json!({"total": 2}))).unwrap();

    let orders = queue.list_all().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].payload, json!({"total": 2}));
  }

  #[test]
  fn corrupt_row_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.db");
    let queue = SqliteOrderQueue::open(&path).unwrap();

    // Write a row with a non-text payload behind the queue's back
    let conn = Connection::open(&path).unwrap();
    conn
      .execute(
        "INSERT INTO queued_orders (id, payload, queued_at)
         VALUES ('ord-x', x'fffe', '2026-01-01T00:00:00+00:00')",
        [],
      )
      .unwrap();

    assert!(queue.list_all().is_err());
  }

  #[test]
  fn sqlite_queue_survives_reopen_in_timestamp_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.db");

    let older = QueuedOrder {
      id: "ord-old".to_string(),
      payload: json!({"total": 3}),
      timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap(),
    };
    let newer = QueuedOrder {
      id: "ord-new".to_string(),
      payload: json!({"total": 9}),
      timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 9, 0, 0).unwrap(),
    };

    {
      let queue = SqliteOrderQueue::open(&path).unwrap();
      queue.insert(&newer).unwrap();
      queue.insert(&older).unwrap();
    }

    let queue = SqliteOrderQueue::open(&path).unwrap();
    let orders = queue.list_all().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].id, "ord-old");
    assert_eq!(orders[1].id, "ord-new");
    assert_eq!(orders[1].payload, json!({"total": 9}));
  }
}

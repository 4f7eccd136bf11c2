//! Cache store trait and in-memory implementation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{AgentError, Result};
use crate::net::Response;

/// A stored response: body bytes plus the headers and status needed to
/// reconstruct it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResource {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl CachedResource {
  /// Rebuild a response for the given request URL.
  pub fn into_response(self, url: impl Into<String>) -> Response {
    Response {
      url: url.into(),
      status: self.status,
      headers: self.headers,
      body: self.body,
    }
  }
}

impl From<&Response> for CachedResource {
  fn from(response: &Response) -> Self {
    Self {
      status: response.status,
      headers: response.headers.clone(),
      body: response.body.clone(),
    }
  }
}

/// Trait for cache storage backends. Writes are per-key atomic; concurrent
/// writers to the same URL race last-write-wins.
pub trait CacheStore: Send + Sync {
  /// Insert or overwrite the resource stored for `url` under `generation`.
  fn put(&self, generation: &str, url: &str, resource: &CachedResource) -> Result<()>;

  /// Look up the resource stored for `url` under `generation`.
  fn get(&self, generation: &str, url: &str) -> Result<Option<CachedResource>>;

  /// All generation tags with at least one stored resource.
  fn generations(&self) -> Result<Vec<String>>;

  /// Delete every generation except `keep`. Returns the purged tags.
  fn purge_except(&self, keep: &str) -> Result<Vec<String>>;
}

/// In-memory cache store for tests and embedded hosts.
pub struct MemoryCacheStore {
  entries: Mutex<HashMap<String, HashMap<String, CachedResource>>>,
}

impl MemoryCacheStore {
  pub fn new() -> Self {
    Self {
      entries: Mutex::new(HashMap::new()),
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, HashMap<String, CachedResource>>>> {
    self
      .entries
      .lock()
      .map_err(|e| AgentError::Storage(format!("lock poisoned: {}", e)))
  }
}

impl Default for MemoryCacheStore {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStore for MemoryCacheStore {
  fn put(&self, generation: &str, url: &str, resource: &CachedResource) -> Result<()> {
    self
      .lock()?
      .entry(generation.to_string())
      .or_default()
      .insert(url.to_string(), resource.clone());
    Ok(())
  }

  fn get(&self, generation: &str, url: &str) -> Result<Option<CachedResource>> {
    Ok(
      self
        .lock()?
        .get(generation)
        .and_then(|urls| urls.get(url))
        .cloned(),
    )
  }

  fn generations(&self) -> Result<Vec<String>> {
    let mut tags: Vec<String> = self.lock()?.keys().cloned().collect();
    tags.sort();
    Ok(tags)
  }

  fn purge_except(&self, keep: &str) -> Result<Vec<String>> {
    let mut entries = self.lock()?;
    let purged: Vec<String> = entries.keys().filter(|g| *g != keep).cloned().collect();
    entries.retain(|g, _| g == keep);
    Ok(purged)
  }
}

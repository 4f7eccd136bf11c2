//! Generation-keyed resource cache.
//!
//! Each cached resource is keyed by request URL within a named generation.
//! Exactly one generation is current; activating a new one purges the rest.

mod sqlite;
mod store;

pub use sqlite::SqliteCacheStore;
pub use store::{CacheStore, CachedResource, MemoryCacheStore};

//! Persistence boundary and the result types that cross it.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::http::{Request, RequestKey, Response};

/// A response as it sits in a store.
#[derive(Debug, Clone)]
pub struct CachedEntry {
  pub response: Response,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Named-store key-value persistence.
///
/// Every method is a single atomic primitive. Multi-step sequences built on
/// top of it (eviction in particular) are not atomic.
pub trait StoreBackend: Send + Sync {
  /// Create the store if it does not exist. Idempotent.
  fn open(&self, store: &str) -> Result<()>;

  fn has_store(&self, store: &str) -> Result<bool>;

  /// Store names in creation order.
  fn list_store_names(&self) -> Result<Vec<String>>;

  /// Remove a store and all of its entries. Returns false when it did not exist.
  fn delete_store(&self, store: &str) -> Result<bool>;

  fn match_entry(&self, store: &str, key: &RequestKey) -> Result<Option<CachedEntry>>;

  /// Insert or replace an entry; a replaced entry becomes the newest.
  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()>;

  /// Insert several entries in one transaction: all of them or none.
  fn put_batch(&self, store: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Remove one entry. Returns false when it was already gone.
  fn delete(&self, store: &str, key: &RequestKey) -> Result<bool>;

  /// Keys oldest-inserted first.
  fn keys(&self, store: &str) -> Result<Vec<RequestKey>>;
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh from the network
  Network,
  /// A stored match for the same request
  Cache,
  /// Network and exact match both failed; the cached root document was served
  RootFallback,
  /// An image fetch failed; the cached placeholder image was served
  ImageFallback,
}

/// A response chosen by a strategy, with metadata about its source.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: CacheSource,
  /// When the response was cached (if it came from a store)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(entry: CachedEntry, source: CacheSource) -> Self {
    Self {
      response: entry.response,
      source,
      cached_at: Some(entry.cached_at),
    }
  }
}

//! Size bounds for runtime-filled stores.

use tracing::debug;

use super::registry::{CacheManager, Store};
use crate::error::Result;

/// Trim `store` to its `max_entries` newest entries, deleting oldest first.
///
/// Returns the number of entries removed. Keys read here may vanish before
/// the delete runs (another request evicting concurrently); those count as
/// already done.
pub fn enforce(cache: &CacheManager, store: &Store, max_entries: usize) -> Result<usize> {
  let keys = cache.keys(store)?;
  if keys.len() <= max_entries {
    return Ok(0);
  }

  let excess = keys.len() - max_entries;
  let mut removed = 0;
  for key in &keys[..excess] {
    if cache.delete_entry(store, key)? {
      removed += 1;
    }
  }

  debug!(store = store.name(), removed, max_entries, "evicted oldest entries");
  Ok(removed)
}

/// Post-write eviction. Never fails the caller.
pub fn enforce_quietly(cache: &CacheManager, store: &Store, max_entries: usize) {
  if let Err(e) = enforce(cache, store, max_entries) {
    debug!(store = store.name(), error = %e, "eviction failed, will retry on next write");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{SqliteStorage, StoreRole, VersionTag};
  use crate::http::{Request, Response};
  use std::sync::Arc;

  fn filled(count: usize) -> (CacheManager, Store) {
    let cache = CacheManager::new(
      Arc::new(SqliteStorage::in_memory().unwrap()),
      VersionTag::new("v1").unwrap(),
    );
    let store = cache.open_role(StoreRole::Dynamic).unwrap();
    for i in 0..count {
      let req = Request::parse("GET", &format!("https://example.com/p{}", i)).unwrap();
      cache.put(&store, &req, &Response::new(200, format!("{}", i))).unwrap();
    }
    (cache, store)
  }

  fn urls(cache: &CacheManager, store: &Store) -> Vec<String> {
    cache
      .keys(store)
      .unwrap()
      .into_iter()
      .map(|k| k.url)
      .collect()
  }

  #[test]
  fn test_under_limit_is_untouched() {
    let (cache, store) = filled(3);
    assert_eq!(enforce(&cache, &store, 3).unwrap(), 0);
    assert_eq!(cache.keys(&store).unwrap().len(), 3);
  }

  #[test]
  fn test_keeps_newest_entries() {
    let (cache, store) = filled(7);
    assert_eq!(enforce(&cache, &store, 4).unwrap(), 3);
    assert_eq!(
      urls(&cache, &store),
      vec![
        "https://example.com/p3",
        "https://example.com/p4",
        "https://example.com/p5",
        "https://example.com/p6"
      ]
    );
  }

  #[test]
  fn test_bound_holds_after_every_write() {
    let (cache, store) = filled(0);
    for i in 0..20 {
      let req = Request::parse("GET", &format!("https://example.com/q{}", i)).unwrap();
      cache.put(&store, &req, &Response::new(200, "x")).unwrap();
      enforce_quietly(&cache, &store, 5);
      assert!(cache.keys(&store).unwrap().len() <= 5);
    }
    assert_eq!(urls(&cache, &store).last().unwrap(), "https://example.com/q19");
  }

  #[test]
  fn test_vanished_keys_are_not_errors() {
    let (cache, store) = filled(4);
    let oldest = cache.keys(&store).unwrap().remove(0);
    cache.delete_entry(&store, &oldest).unwrap();
    // Nothing left to trim, and a second pass over a missing key is still fine
    assert_eq!(enforce(&cache, &store, 3).unwrap(), 0);
    assert!(!cache.delete_entry(&store, &oldest).unwrap());
  }
}

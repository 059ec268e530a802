//! Store registry: versioned store names and the shared cache context.

use std::fmt;
use std::sync::Arc;

use super::traits::{CachedEntry, StoreBackend};
use crate::error::{Error, Result};
use crate::http::{Request, RequestKey, Response};

/// The job a store does within one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreRole {
  /// Pre-warmed on install, unbounded
  Static,
  /// Filled by network-first requests, bounded
  Dynamic,
  /// Filled by image requests, bounded separately
  Image,
}

impl StoreRole {
  pub fn suffix(self) -> &'static str {
    match self {
      Self::Static => "static",
      Self::Dynamic => "dynamic",
      Self::Image => "image",
    }
  }
}

/// Identifier of one deployment. Every store name starts with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionTag(String);

impl VersionTag {
  pub fn new(tag: impl Into<String>) -> Result<Self> {
    let tag = tag.into();
    if tag.trim().is_empty() {
      return Err(Error::Config("version tag must not be empty".to_string()));
    }
    Ok(Self(tag))
  }

  pub fn store_name(&self, role: StoreRole) -> String {
    format!("{}-{}", self.0, role.suffix())
  }

  /// Whether `store` belongs to this version: a plain prefix match on the
  /// store name, so tags that extend one another (`v1`, `v10`) share stores.
  pub fn owns(&self, store: &str) -> bool {
    store.starts_with(self.0.as_str())
  }
}

impl fmt::Display for VersionTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Handle to one opened store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Store {
  name: String,
}

impl Store {
  pub fn name(&self) -> &str {
    &self.name
  }
}

/// Shared cache context: the backend plus the current version.
///
/// Built once per process and handed to every component that touches stores.
pub struct CacheManager {
  backend: Arc<dyn StoreBackend>,
  version: VersionTag,
}

impl CacheManager {
  pub fn new(backend: Arc<dyn StoreBackend>, version: VersionTag) -> Self {
    Self { backend, version }
  }

  pub fn version(&self) -> &VersionTag {
    &self.version
  }

  /// Open a store by name, creating it empty if needed.
  pub fn open(&self, name: &str) -> Result<Store> {
    self.backend.open(name)?;
    Ok(Store {
      name: name.to_string(),
    })
  }

  /// Open the current version's store for `role`.
  pub fn open_role(&self, role: StoreRole) -> Result<Store> {
    self.open(&self.version.store_name(role))
  }

  pub fn has_store(&self, name: &str) -> Result<bool> {
    self.backend.has_store(name)
  }

  pub fn list_all(&self) -> Result<Vec<String>> {
    self.backend.list_store_names()
  }

  pub fn delete(&self, name: &str) -> Result<bool> {
    self.backend.delete_store(name)
  }

  pub fn match_in(&self, store: &Store, key: &RequestKey) -> Result<Option<CachedEntry>> {
    self.backend.match_entry(&store.name, key)
  }

  /// First match for `key` across every store, oldest store first.
  pub fn match_any(&self, key: &RequestKey) -> Result<Option<CachedEntry>> {
    for name in self.backend.list_store_names()? {
      if let Some(entry) = self.backend.match_entry(&name, key)? {
        return Ok(Some(entry));
      }
    }
    Ok(None)
  }

  pub fn put(&self, store: &Store, request: &Request, response: &Response) -> Result<()> {
    self.backend.put(&store.name, request, response)
  }

  pub fn put_batch(&self, store: &Store, entries: &[(Request, Response)]) -> Result<()> {
    self.backend.put_batch(&store.name, entries)
  }

  pub fn keys(&self, store: &Store) -> Result<Vec<RequestKey>> {
    self.backend.keys(&store.name)
  }

  pub fn delete_entry(&self, store: &Store, key: &RequestKey) -> Result<bool> {
    self.backend.delete(&store.name, key)
  }
}

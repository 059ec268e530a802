//! Control protocol between client contexts and the worker.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::clients::Clients;
use crate::cache::CacheManager;
use crate::error::Result;

/// Commands a client context can send to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  /// Activate a waiting worker now instead of after every client closes
  #[serde(rename = "skip-waiting", alias = "SKIP_WAITING")]
  SkipWaiting,
  /// Delete every store, whatever its version
  #[serde(rename = "clear-all", alias = "CLEAR_CACHE")]
  ClearAll,
  #[serde(other)]
  Unknown,
}

impl ControlMessage {
  /// Decode a raw message. Anything unrecognizable is `Unknown`.
  pub fn decode(raw: &str) -> Self {
    serde_json::from_str(raw).unwrap_or_else(|e| {
      debug!(error = %e, "undecodable control message");
      Self::Unknown
    })
  }
}

/// Notices the worker posts to its client contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
  /// Every store was deleted
  Cleared,
}

/// Outcome of a clear-all command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
  pub stores_deleted: Vec<String>,
  /// Controlled contexts that received the `cleared` notice
  pub notified: usize,
}

/// Delete every store, then tell every controlled context.
pub fn clear_all(cache: &CacheManager, clients: &Clients) -> Result<ClearReport> {
  let mut stores_deleted = Vec::new();
  for name in cache.list_all()? {
    if cache.delete(&name)? {
      stores_deleted.push(name);
    }
  }

  let notified = clients.post_to_controlled(&ClientMessage::Cleared);
  info!(stores = stores_deleted.len(), notified, "cleared all caches");

  Ok(ClearReport {
    stores_deleted,
    notified,
  })
}

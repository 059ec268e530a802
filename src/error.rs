//! Error types shared by the cache core and the worker.

use thiserror::Error;

/// Errors produced by the cache engine.
#[derive(Debug, Error)]
pub enum Error {
  /// Neither the network nor any store could satisfy the request.
  #[error("no network or cached response for {0}")]
  Unavailable(String),

  /// A runtime fetch failed before a response arrived.
  #[error("network request failed: {0}")]
  Network(String),

  /// A static asset could not be fetched during install.
  #[error("warm-up failed for {url}: {reason}")]
  WarmUp { url: String, reason: String },

  /// The local store could not complete an operation.
  #[error("storage error: {0}")]
  Storage(String),

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("invalid configuration: {0}")]
  Config(String),
}

/// Coarse classification of [`Error`], for callers that branch on policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Unavailable,
  Network,
  WarmUp,
  Storage,
  InvalidRequest,
  Config,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Unavailable(_) => ErrorKind::Unavailable,
      Self::Network(_) => ErrorKind::Network,
      Self::WarmUp { .. } => ErrorKind::WarmUp,
      Self::Storage(_) => ErrorKind::Storage,
      Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
      Self::Config(_) => ErrorKind::Config,
    }
  }
}

impl From<rusqlite::Error> for Error {
  fn from(err: rusqlite::Error) -> Self {
    Self::Storage(err.to_string())
  }
}

impl From<serde_json::Error> for Error {
  fn from(err: serde_json::Error) -> Self {
    Self::Storage(format!("failed to encode entry: {}", err))
  }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_kind_matches_variant() {
    assert_eq!(Error::Unavailable("/x".into()).kind(), ErrorKind::Unavailable);
    assert_eq!(
      Error::WarmUp {
        url: "/".into(),
        reason: "404".into()
      }
      .kind(),
      ErrorKind::WarmUp
    );
  }

  #[test]
  fn test_sqlite_errors_become_storage() {
    let err: Error = rusqlite::Error::InvalidQuery.into();
    assert_eq!(err.kind(), ErrorKind::Storage);
  }
}

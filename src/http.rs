//! Request and response model shared by the fetch and persistence boundaries.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

use crate::error::{Error, Result};

/// What the requesting context intends to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  /// A full page navigation
  Document,
  Image,
  #[default]
  Other,
}

/// An intercepted outbound request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn new(method: Method, mut url: Url) -> Self {
    // Stores match on the URL without its fragment
    url.set_fragment(None);
    Self {
      method,
      url,
      destination: Destination::Other,
      headers: Vec::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// Build a request from a method name and an absolute URL.
  pub fn parse(method: &str, url: &str) -> Result<Self> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
      .map_err(|_| Error::InvalidRequest(format!("bad method '{}'", method)))?;
    let url = Url::parse(url).map_err(|e| Error::InvalidRequest(format!("{}: {}", url, e)))?;
    Ok(Self::new(method, url))
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn path(&self) -> &str {
    self.url.path()
  }

  pub fn is_document(&self) -> bool {
    self.destination == Destination::Document
  }

  /// Identity used to file this request in a store.
  pub fn key(&self) -> RequestKey {
    RequestKey {
      method: self.method.as_str().to_string(),
      url: self.url.to_string(),
    }
  }
}

/// Identity of a request inside a store: method plus URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  /// Stable, fixed-length key used as the storage primary key.
  pub fn hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A captured response. Cloning duplicates the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  #[cfg(test)]
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Whether this response may be written to a store. Partial content is never stored.
  pub fn is_cacheable(&self) -> bool {
    self.is_ok() && self.status != 206
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fragment_is_not_part_of_identity() {
    let a = Request::parse("get", "https://example.com/page#top").unwrap();
    let b = Request::parse("GET", "https://example.com/page").unwrap();
    assert_eq!(a.key(), b.key());
    assert_eq!(a.key().hash(), b.key().hash());
  }

  #[test]
  fn test_method_is_part_of_identity() {
    let get = Request::parse("GET", "https://example.com/a").unwrap();
    let head = Request::parse("HEAD", "https://example.com/a").unwrap();
    assert_ne!(get.key().hash(), head.key().hash());
  }

  #[test]
  fn test_bad_url_is_rejected() {
    let err = Request::parse("GET", "/relative").unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::InvalidRequest);
  }

  #[test]
  fn test_cacheable_statuses() {
    assert!(Response::new(200, "ok").is_cacheable());
    assert!(!Response::new(206, "part").is_cacheable());
    assert!(!Response::new(404, "missing").is_cacheable());
    assert!(!Response::new(500, "boom").is_cacheable());
  }

  #[test]
  fn test_header_lookup_ignores_case() {
    let resp = Response::new(200, "").with_header("Content-Type", "text/html");
    assert_eq!(resp.header("content-type"), Some("text/html"));
    assert_eq!(resp.header("etag"), None);
  }
}

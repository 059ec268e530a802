//! Request classification: which strategy, if any, handles a request.

use reqwest::Method;
use url::Origin;

use crate::config::Config;
use crate::http::{Destination, Request};

/// How an intercepted request is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Not intercepted; the request goes to the network untouched
  PassThrough,
  /// Cache-first into the image store
  Image,
  /// Cache-first into the static store
  CacheFirst,
  /// Network-first into the dynamic store
  NetworkFirst,
}

/// Pure classification rules derived from configuration.
#[derive(Debug, Clone)]
pub struct Classifier {
  origin: Origin,
  bypass_prefixes: Vec<String>,
  static_assets: Vec<String>,
  static_prefixes: Vec<String>,
}

impl Classifier {
  pub fn from_config(config: &Config) -> Self {
    Self {
      origin: config.origin.origin(),
      bypass_prefixes: config.bypass_prefixes.clone(),
      static_assets: config.static_assets.clone(),
      static_prefixes: config.static_prefixes.clone(),
    }
  }

  pub fn classify(&self, request: &Request) -> Route {
    let path = request.path();

    if request.url.origin() != self.origin
      || self.bypass_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    {
      return Route::PassThrough;
    }

    if request.method != Method::GET {
      return Route::PassThrough;
    }

    if request.destination == Destination::Image {
      return Route::Image;
    }

    if self.is_static(path) {
      return Route::CacheFirst;
    }

    Route::NetworkFirst
  }

  fn is_static(&self, path: &str) -> bool {
    self.static_assets.iter().any(|asset| asset == path)
      || self.static_prefixes.iter().any(|p| path.starts_with(p.as_str()))
  }
}

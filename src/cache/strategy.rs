//! Strategy engine: picks a route per request and satisfies it from the
//! stores, the network, or both.

use std::sync::Arc;
use tracing::{debug, warn};

use super::classify::{Classifier, Route};
use super::eviction;
use super::registry::{CacheManager, StoreRole};
use super::traits::{CacheSource, Served};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::http::{Request, Response};

/// Applies cache-first, network-first or pass-through to intercepted requests.
///
/// Cache-first routes look in the stores before touching the network and
/// accept stale hits. Network-first routes always try the network first and
/// only fall back to the stores when it fails.
pub struct StrategyEngine {
  cache: Arc<CacheManager>,
  fetcher: Arc<dyn Fetcher>,
  classifier: Classifier,
  dynamic_limit: usize,
  image_limit: usize,
  root_document: Request,
  image_fallback: Request,
}

impl StrategyEngine {
  pub fn new(config: &Config, cache: Arc<CacheManager>, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
    Ok(Self {
      cache,
      fetcher,
      classifier: Classifier::from_config(config),
      dynamic_limit: config.limits.dynamic,
      image_limit: config.limits.image,
      root_document: Request::get(resolve(config, &config.root_document)?),
      image_fallback: Request::get(resolve(config, &config.image_fallback)?),
    })
  }

  pub fn route(&self, request: &Request) -> Route {
    self.classifier.classify(request)
  }

  /// Satisfy `request`, or return `None` when it is not intercepted.
  pub async fn handle(&self, request: &Request) -> Result<Option<Served>> {
    let route = self.route(request);
    debug!(method = %request.method, url = %request.url, ?route, "intercepted request");

    let served = match route {
      Route::PassThrough => return Ok(None),
      Route::Image => self.cache_first(request, StoreRole::Image).await?,
      Route::CacheFirst => self.cache_first(request, StoreRole::Static).await?,
      Route::NetworkFirst => self.network_first(request).await?,
    };
    Ok(Some(served))
  }

  /// Serve a hit immediately; otherwise fetch and keep a copy in `role`'s store.
  async fn cache_first(&self, request: &Request, role: StoreRole) -> Result<Served> {
    if let Some(entry) = self.cache.match_any(&request.key())? {
      return Ok(Served::from_cache(entry, CacheSource::Cache));
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.write_back(role, request, &response);
        Ok(Served::from_network(response))
      }
      Err(err) => {
        debug!(url = %request.url, error = %err, "cache-first fetch failed");
        let fallback = match role {
          StoreRole::Image => Some((&self.image_fallback, CacheSource::ImageFallback)),
          _ if request.is_document() => Some((&self.root_document, CacheSource::RootFallback)),
          _ => None,
        };
        if let Some((fallback, source)) = fallback {
          if let Some(entry) = self.cache.match_any(&fallback.key())? {
            return Ok(Served::from_cache(entry, source));
          }
        }
        Err(err)
      }
    }
  }

  /// Fetch first; fall back to a stored copy, then to the root document.
  async fn network_first(&self, request: &Request) -> Result<Served> {
    let err = match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.write_back(StoreRole::Dynamic, request, &response);
        return Ok(Served::from_network(response));
      }
      Err(err) => err,
    };
    debug!(url = %request.url, error = %err, "network-first fetch failed, trying stores");

    let key = request.key();
    if let Some(entry) = self.cache.match_any(&key)? {
      return Ok(Served::from_cache(entry, CacheSource::Cache));
    }

    if request.is_document() {
      if let Some(entry) = self.cache.match_any(&self.root_document.key())? {
        return Ok(Served::from_cache(entry, CacheSource::RootFallback));
      }
    }

    // No synthetic error page: the caller sees a failed fetch
    Err(Error::Unavailable(key.to_string()))
  }

  /// Store a copy of `response` and enforce the store's bound.
  ///
  /// Failures are logged; the caller still gets its response.
  fn write_back(&self, role: StoreRole, request: &Request, response: &Response) {
    if !response.is_cacheable() {
      debug!(url = %request.url, status = response.status, "not caching response");
      return;
    }

    let written = self
      .cache
      .open_role(role)
      .and_then(|store| self.cache.put(&store, request, response).map(|_| store));

    match written {
      Ok(store) => {
        if let Some(max) = self.limit(role) {
          eviction::enforce_quietly(&self.cache, &store, max);
        }
      }
      Err(e) => warn!(url = %request.url, role = role.suffix(), error = %e, "failed to cache response"),
    }
  }

  fn limit(&self, role: StoreRole) -> Option<usize> {
    match role {
      StoreRole::Static => None,
      StoreRole::Dynamic => Some(self.dynamic_limit),
      StoreRole::Image => Some(self.image_limit),
    }
  }
}

fn resolve(config: &Config, path: &str) -> Result<url::Url> {
  config
    .origin
    .join(path)
    .map_err(|e| Error::Config(format!("cannot resolve '{}': {}", path, e)))
}

//! Install and activation: warming the static store, purging old versions,
//! and taking control of open contexts.

use futures::future::try_join_all;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use url::Url;

use super::clients::Clients;
use crate::cache::{CacheManager, StoreRole};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::Fetcher;
use crate::http::{Request, Response};

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
  /// Created, nothing run yet
  #[default]
  Parsed,
  Installing,
  /// Installed and waiting to activate
  Installed,
  Activating,
  /// Active and intercepting requests
  Active,
  /// Install or activation failed
  Redundant,
}

/// What activation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Stale stores that were deleted
  pub purged: Vec<String>,
  /// Contexts newly taken under control
  pub claimed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
  /// Warmed up and activated straight away
  Activated(ActivationReport),
  /// Warmed up; activation waits for a skip-waiting command
  Waiting,
  /// The current version was already installed; resumed as active
  Resumed,
}

/// Drives the worker through install and activation for one version.
pub struct Lifecycle {
  cache: Arc<CacheManager>,
  fetcher: Arc<dyn Fetcher>,
  clients: Arc<Clients>,
  assets: Vec<Url>,
  namespace: Option<String>,
  fast_activation: bool,
  state: Mutex<LifecycleState>,
}

impl Lifecycle {
  pub fn new(
    config: &Config,
    cache: Arc<CacheManager>,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<Clients>,
  ) -> Result<Self> {
    let assets = config
      .static_assets
      .iter()
      .map(|path| {
        config
          .origin
          .join(path)
          .map_err(|e| Error::Config(format!("bad static asset '{}': {}", path, e)))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      cache,
      fetcher,
      clients,
      assets,
      namespace: config.namespace.clone(),
      fast_activation: config.fast_activation,
      state: Mutex::new(LifecycleState::Parsed),
    })
  }

  pub fn state(&self) -> LifecycleState {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn set_state(&self, next: LifecycleState) {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    debug!(from = ?*state, to = ?next, "lifecycle transition");
    *state = next;
  }

  /// Warm the static store, then activate unless activation must wait.
  pub async fn install(&self) -> Result<InstallOutcome> {
    info!(version = %self.cache.version(), assets = self.assets.len(), "installing");
    self.set_state(LifecycleState::Installing);

    if let Err(e) = self.warm_up().await {
      warn!(error = %e, "install failed");
      self.set_state(LifecycleState::Redundant);
      return Err(e);
    }
    self.set_state(LifecycleState::Installed);

    if self.fast_activation {
      Ok(InstallOutcome::Activated(self.activate()?))
    } else {
      info!("installed, waiting for skip-waiting");
      Ok(InstallOutcome::Waiting)
    }
  }

  /// Fetch every static asset; commit them only if all succeed.
  async fn warm_up(&self) -> Result<usize> {
    let requests: Vec<Request> = self.assets.iter().cloned().map(Request::get).collect();

    let responses = try_join_all(requests.iter().map(|request| self.fetch_asset(request))).await?;

    let entries: Vec<(Request, Response)> = requests.into_iter().zip(responses).collect();
    let store = self.cache.open_role(StoreRole::Static)?;
    self.cache.put_batch(&store, &entries)?;

    info!(store = store.name(), entries = entries.len(), "static store warmed");
    Ok(entries.len())
  }

  async fn fetch_asset(&self, request: &Request) -> Result<Response> {
    let response = self
      .fetcher
      .fetch(request)
      .await
      .map_err(|e| Error::WarmUp {
        url: request.url.to_string(),
        reason: e.to_string(),
      })?;

    if !response.is_cacheable() {
      return Err(Error::WarmUp {
        url: request.url.to_string(),
        reason: format!("status {}", response.status),
      });
    }
    Ok(response)
  }

  /// Purge stores from other versions and claim every open context.
  pub fn activate(&self) -> Result<ActivationReport> {
    info!(version = %self.cache.version(), "activating");
    self.set_state(LifecycleState::Activating);

    let purged = match self.purge_stale() {
      Ok(purged) => purged,
      Err(e) => {
        warn!(error = %e, "activation failed");
        self.set_state(LifecycleState::Redundant);
        return Err(e);
      }
    };

    let claimed = self.clients.claim();
    self.set_state(LifecycleState::Active);
    info!(purged = purged.len(), claimed, "active");

    Ok(ActivationReport { purged, claimed })
  }

  /// Delete whole stores whose names do not carry the current version.
  fn purge_stale(&self) -> Result<Vec<String>> {
    let version = self.cache.version();
    let mut purged = Vec::new();

    for name in self.cache.list_all()? {
      if version.owns(&name) {
        continue;
      }
      if let Some(namespace) = &self.namespace {
        if !name.starts_with(namespace.as_str()) {
          continue;
        }
      }
      if self.cache.delete(&name)? {
        info!(store = %name, "removed stale store");
        purged.push(name);
      }
    }

    Ok(purged)
  }

  /// Activate a waiting worker now. Does nothing in any other state.
  pub fn skip_waiting(&self) -> Result<Option<ActivationReport>> {
    if self.state() != LifecycleState::Installed {
      debug!(state = ?self.state(), "skip-waiting ignored");
      return Ok(None);
    }
    self.activate().map(Some)
  }

  /// Resume as active when this version's static store already exists;
  /// install otherwise.
  pub async fn restore(&self) -> Result<InstallOutcome> {
    let static_store = self.cache.version().store_name(StoreRole::Static);
    if self.cache.has_store(&static_store)? {
      self.clients.claim();
      self.set_state(LifecycleState::Active);
      debug!(store = %static_store, "resumed installed version");
      return Ok(InstallOutcome::Resumed);
    }
    self.install().await
  }
}

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin whose requests are intercepted (scheme, host and port)
  pub origin: Url,
  /// Version tag that prefixes every store name
  #[serde(default = "default_version")]
  pub version: String,
  /// Only stale stores carrying this prefix are purged on activation
  pub namespace: Option<String>,
  /// Paths fetched into the static store on install, and served cache-first
  #[serde(default = "default_static_assets")]
  pub static_assets: Vec<String>,
  /// Path prefixes served cache-first
  #[serde(default = "default_static_prefixes")]
  pub static_prefixes: Vec<String>,
  /// Same-origin path prefixes that are never intercepted
  #[serde(default = "default_bypass_prefixes")]
  pub bypass_prefixes: Vec<String>,
  /// Cached page served to document requests when everything else fails
  #[serde(default = "default_root_document")]
  pub root_document: String,
  /// Cached image served when an image fetch fails
  #[serde(default = "default_image_fallback")]
  pub image_fallback: String,
  #[serde(default)]
  pub limits: LimitsConfig,
  /// Activate right after install instead of waiting for a skip-waiting message
  #[serde(default = "default_true")]
  pub fast_activation: bool,
  #[serde(default)]
  pub network: NetworkConfig,
  #[serde(default)]
  pub notifications: NotificationConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
  #[serde(default = "default_dynamic_limit")]
  pub dynamic: usize,
  #[serde(default = "default_image_limit")]
  pub image: usize,
}

impl Default for LimitsConfig {
  fn default() -> Self {
    Self {
      dynamic: default_dynamic_limit(),
      image: default_image_limit(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      user_agent: default_user_agent(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
  #[serde(default = "default_notification_title")]
  pub title: String,
  #[serde(default = "default_notification_body")]
  pub default_body: String,
  #[serde(default = "default_notification_icon")]
  pub icon: String,
  #[serde(default = "default_notification_icon")]
  pub badge: String,
  /// Notifications sharing a tag replace each other
  #[serde(default = "default_notification_tag")]
  pub tag: String,
  #[serde(default = "default_vibrate")]
  pub vibrate: Vec<u32>,
  /// Location opened or focused when the notification is clicked
  #[serde(default = "default_root_document")]
  pub url: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: default_notification_title(),
      default_body: default_notification_body(),
      icon: default_notification_icon(),
      badge: default_notification_icon(),
      tag: default_notification_tag(),
      vibrate: default_vibrate(),
      url: default_root_document(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Database file (default: $XDG_DATA_HOME/cache-worker/<host>.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
  /// EnvFilter directive, e.g. "cache_worker=debug"
  pub filter: Option<String>,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
  #[serde(default)]
  pub json: bool,
}

fn default_version() -> String {
  "v1".to_string()
}

fn default_static_assets() -> Vec<String> {
  vec!["/".to_string()]
}

fn default_static_prefixes() -> Vec<String> {
  vec!["/assets/".to_string()]
}

fn default_bypass_prefixes() -> Vec<String> {
  vec!["/api/".to_string()]
}

fn default_root_document() -> String {
  "/".to_string()
}

fn default_image_fallback() -> String {
  "/favicon.ico".to_string()
}

fn default_true() -> bool {
  true
}

fn default_dynamic_limit() -> usize {
  50
}

fn default_image_limit() -> usize {
  30
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_user_agent() -> String {
  format!("cache-worker/{}", env!("CARGO_PKG_VERSION"))
}

fn default_notification_title() -> String {
  "Update".to_string()
}

fn default_notification_body() -> String {
  "New update available".to_string()
}

fn default_notification_icon() -> String {
  "/assets/images/logo.png".to_string()
}

fn default_notification_tag() -> String {
  "cache-worker-notification".to_string()
}

fn default_vibrate() -> Vec<u32> {
  vec![200, 100, 200]
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cache-worker.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cache-worker/config.yaml
  ///
  /// Finding no file at all is `None`; an explicit path that does not exist is an error.
  pub fn try_load(explicit_path: Option<&Path>) -> Result<Option<Self>> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    path.map(|p| Self::load_from_path(&p)).transpose()
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("cache-worker.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cache-worker").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
  }

  /// Minimal configuration for an origin, everything else defaulted.
  pub fn for_origin(origin: Url) -> Self {
    Self {
      origin,
      version: default_version(),
      namespace: None,
      static_assets: default_static_assets(),
      static_prefixes: default_static_prefixes(),
      bypass_prefixes: default_bypass_prefixes(),
      root_document: default_root_document(),
      image_fallback: default_image_fallback(),
      limits: LimitsConfig::default(),
      fast_activation: true,
      network: NetworkConfig::default(),
      notifications: NotificationConfig::default(),
      storage: StorageConfig::default(),
      logging: LoggingConfig::default(),
    }
  }

  pub fn validate(&self) -> Result<()> {
    if !matches!(self.origin.scheme(), "http" | "https") {
      return Err(eyre!("origin must be an http(s) URL, got {}", self.origin));
    }
    if self.version.trim().is_empty() {
      return Err(eyre!("version must not be empty"));
    }
    if self.limits.dynamic == 0 || self.limits.image == 0 {
      return Err(eyre!("store limits must be at least 1"));
    }
    if let Some(bad) = self.static_assets.iter().find(|a| !a.starts_with('/')) {
      return Err(eyre!("static asset '{}' must be an absolute path", bad));
    }
    Ok(())
  }

  /// Resolve a path against the origin.
  pub fn url_for(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Cannot resolve '{}' against {}: {}", path, self.origin, e))
  }

  /// Database location for this origin.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.storage.path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    let host = self.origin.host_str().unwrap_or("default");
    let file = match self.origin.port() {
      Some(port) => format!("{}_{}.db", host, port),
      None => format!("{}.db", host),
    };
    Ok(data_dir.join("cache-worker").join(file))
  }
}

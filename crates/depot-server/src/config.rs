//! Server configuration, read from a TOML file and `DEPOT__*` environment
//! variables (e.g. `DEPOT__PORT=9000`, `DEPOT__REMOTE__TOKEN=...`).

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use depot_core::catalog::{CatalogEntry, DatasetCatalog};
use depot_engine::RetryPolicy;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "defaults::host")]
  pub host:           String,
  #[serde(default = "defaults::port")]
  pub port:           u16,
  /// Root of the content store and ledger.
  #[serde(default = "defaults::data_dir")]
  pub data_dir:       PathBuf,
  /// Idle interval after which a session gets a keepalive.
  #[serde(default = "defaults::heartbeat_secs")]
  pub heartbeat_secs: u64,
  #[serde(default)]
  pub retry:          RetryConfig,
  #[serde(default)]
  pub remote:         RemoteConfig,
  /// The datasets callers may request.
  #[serde(default)]
  pub datasets:       Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  #[serde(default = "defaults::max_retries")]
  pub max_retries: u32,
  #[serde(default = "defaults::backoff_ms")]
  pub backoff_ms:  u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  #[serde(default)]
  pub base_url:     String,
  #[serde(default)]
  pub token:        Option<String>,
  /// Prepended to every configured `rid` to form the platform identifier.
  #[serde(default = "defaults::prefix")]
  pub prefix:       String,
  #[serde(default = "defaults::timeout_secs")]
  pub timeout_secs: u64,
}

mod defaults {
  use std::path::PathBuf;

  pub fn host() -> String { "0.0.0.0".into() }
  pub fn port() -> u16 { 8000 }
  pub fn data_dir() -> PathBuf { PathBuf::from("./datasets") }
  pub fn heartbeat_secs() -> u64 { 15 }
  pub fn max_retries() -> u32 { 3 }
  pub fn backoff_ms() -> u64 { 500 }
  pub fn prefix() -> String { "ri.foundry.main.dataset.".into() }
  pub fn timeout_secs() -> u64 { 300 }
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self { max_retries: defaults::max_retries(), backoff_ms: defaults::backoff_ms() }
  }
}

impl Default for RemoteConfig {
  fn default() -> Self {
    Self {
      base_url:     String::new(),
      token:        None,
      prefix:       defaults::prefix(),
      timeout_secs: defaults::timeout_secs(),
    }
  }
}

impl ServerConfig {
  /// Read `path` (optional) and overlay `DEPOT__*` environment variables.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("DEPOT").separator("__"))
      .build()?
      .try_deserialize()
  }

  /// `data_dir` with a leading `~` expanded to the home directory.
  pub fn data_dir(&self) -> PathBuf { expand_tilde(&self.data_dir) }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn heartbeat(&self) -> Duration { Duration::from_secs(self.heartbeat_secs.max(1)) }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.retry.max_retries,
      backoff:     Duration::from_millis(self.retry.backoff_ms),
    }
  }

  pub fn catalog(&self) -> DatasetCatalog { DatasetCatalog::new(self.datasets.iter().cloned()) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  if let Ok(rest) = path.strip_prefix("~")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tilde_is_expanded_only_at_the_start() {
    let Ok(home) = std::env::var("HOME") else {
      return;
    };
    assert_eq!(expand_tilde(Path::new("~/data")), PathBuf::from(home).join("data"));
    assert_eq!(expand_tilde(Path::new("./a/~")), PathBuf::from("./a/~"));
  }
}

//! HTTP front end for Depot.
//!
//! Wires configuration, the filesystem backend, the remote fetcher and the
//! engine together, and serves:
//!
//! - `GET /`: health check
//! - `GET /dataset/get`: provisioning sessions over WebSocket
//! - everything in [`depot_api`], under `/dataset`

pub mod config;
pub mod remote;
pub mod session_ws;

use std::sync::Arc;

use anyhow::Context as _;
use axum::{Json, Router, routing::get};
use depot_core::{
  fetch::DatasetFetcher,
  store::{ContentStore, MetadataLedger},
};
use depot_engine::{Coordinator, Engine, Maintenance, ProgressChannel};
use depot_store_fs::{FsContentStore, JsonLedger, Layout};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::ServerConfig;
pub use remote::RemoteFetcher;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, L, F> {
  pub coordinator: Arc<Coordinator<S, L, F>>,
  pub maintenance: Arc<Maintenance<S, L>>,
}

impl<S, L, F> Clone for AppState<S, L, F> {
  fn clone(&self) -> Self {
    Self {
      coordinator: self.coordinator.clone(),
      maintenance: self.maintenance.clone(),
    }
  }
}

impl<S, L, F> AppState<S, L, F>
where
  S: ContentStore + 'static,
  L: MetadataLedger + 'static,
  F: DatasetFetcher + 'static,
{
  /// Assemble engine, coordinator and maintenance over the given services.
  pub fn new(config: &ServerConfig, store: Arc<S>, ledger: Arc<L>, fetcher: Arc<F>) -> Self {
    let catalog = Arc::new(config.catalog());
    let engine = Arc::new(Engine::new(
      store.clone(),
      ledger.clone(),
      fetcher,
      config.retry_policy(),
    ));
    let progress = ProgressChannel::new(config.heartbeat());
    Self {
      coordinator: Arc::new(Coordinator::new(engine, catalog.clone(), progress)),
      maintenance: Arc::new(Maintenance::new(store, ledger, catalog)),
    }
  }
}

impl AppState<FsContentStore, JsonLedger, RemoteFetcher> {
  /// Open the data directory and connect to the remote platform.
  pub async fn open(config: &ServerConfig) -> anyhow::Result<Self> {
    let data_dir = config.data_dir();
    let layout = Layout::new(&data_dir);
    let store = FsContentStore::open(layout.clone())
      .await
      .with_context(|| format!("failed to open content store at {data_dir:?}"))?;
    let ledger = JsonLedger::open(layout)
      .await
      .context("failed to open metadata ledger")?;
    let fetcher = RemoteFetcher::new(&config.remote).context("failed to build HTTP client")?;

    info!(
      ?data_dir,
      datasets = config.datasets.len(),
      remote = %config.remote.base_url,
      "storage ready"
    );
    Ok(Self::new(config, Arc::new(store), Arc::new(ledger), Arc::new(fetcher)))
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application [`Router`].
pub fn router<S, L, F>(state: AppState<S, L, F>) -> Router
where
  S: ContentStore + 'static,
  L: MetadataLedger + 'static,
  F: DatasetFetcher + 'static,
{
  let dataset = Router::new()
    .route("/get", get(session_ws::handler::<S, L, F>))
    .with_state(state.clone())
    .merge(depot_api::api_router(state.maintenance));

  Router::new()
    .route("/", get(health))
    .nest("/dataset", dataset)
    .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
  Json(json!({ "online": true, "message": "depot is up; open /dataset/get to provision" }))
}

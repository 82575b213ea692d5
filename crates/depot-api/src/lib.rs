//! JSON REST API for Depot.
//!
//! Exposes an axum [`Router`] over a [`Maintenance`] handle: version and
//! ledger queries, stored-file downloads, and manual housekeeping. The
//! provisioning WebSocket lives in the server crate, next to the engine it
//! drives.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/dataset", depot_api::api_router(maintenance.clone()))
//! ```

pub mod error;
pub mod files;
pub mod housekeeping;
pub mod query;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use depot_core::store::{ContentStore, MetadataLedger};
use depot_engine::Maintenance;

pub use error::ApiError;

/// Shared handler state.
pub type Ops<S, L> = Arc<Maintenance<S, L>>;

/// Build a fully-materialised API router over `ops`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, L>(ops: Ops<S, L>) -> Router<()>
where
  S: ContentStore + 'static,
  L: MetadataLedger + 'static,
{
  Router::new()
    // Queries
    .route("/versions", post(query::versions::<S, L>))
    .route("/info", post(query::info::<S, L>))
    .route("/list", post(query::list::<S, L>))
    .route("/metadata", get(query::metadata::<S, L>))
    // Files
    .route("/files/{role}/{checksum}", get(files::download::<S, L>))
    // Housekeeping
    .route("/unzip", post(housekeeping::unzip::<S, L>))
    .route("/zip", post(housekeeping::zip::<S, L>))
    .route("/delete/raw", post(housekeeping::delete_extracted::<S, L>))
    .route("/delete/zip", post(housekeeping::delete_archived::<S, L>))
    .route("/delete", post(housekeeping::delete::<S, L>))
    .with_state(ops)
}

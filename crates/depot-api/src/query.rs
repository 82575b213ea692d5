//! Read-only handlers over the catalog and ledger.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/versions` | Body: `{"name":"..."}`; newest first |
//! | `POST` | `/info` | Body: `{"names":[...]}` |
//! | `POST` | `/list` | Every catalog dataset |
//! | `GET`  | `/metadata` | Optional `?dataset=<remote id>` |

use axum::{
  Json,
  extract::{Query, State},
};
use depot_core::{
  dataset::{DatasetEntry, VersionRecord},
  store::{ContentStore, MetadataLedger},
};
use serde::Deserialize;

use crate::{Ops, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct NameBody {
  pub name: String,
}

/// `POST /versions`
pub async fn versions<S, L>(
  State(ops): State<Ops<S, L>>,
  Json(body): Json<NameBody>,
) -> Result<Json<Vec<VersionRecord>>, ApiError>
where
  S: ContentStore,
  L: MetadataLedger,
{
  Ok(Json(ops.versions(&body.name).await?))
}

#[derive(Debug, Deserialize)]
pub struct NamesBody {
  pub names: Vec<String>,
}

/// `POST /info`
pub async fn info<S, L>(
  State(ops): State<Ops<S, L>>,
  Json(body): Json<NamesBody>,
) -> Result<Json<Vec<DatasetEntry>>, ApiError>
where
  S: ContentStore,
  L: MetadataLedger,
{
  Ok(Json(ops.info(&body.names).await?))
}

/// `POST /list`. Any body is ignored.
pub async fn list<S, L>(State(ops): State<Ops<S, L>>) -> Result<Json<Vec<DatasetEntry>>, ApiError>
where
  S: ContentStore,
  L: MetadataLedger,
{
  Ok(Json(ops.list().await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct MetadataParams {
  /// Remote identifier to narrow the result to.
  pub dataset: Option<String>,
}

/// `GET /metadata[?dataset=<remote id>]`
pub async fn metadata<S, L>(
  State(ops): State<Ops<S, L>>,
  Query(params): Query<MetadataParams>,
) -> Result<Json<Vec<DatasetEntry>>, ApiError>
where
  S: ContentStore,
  L: MetadataLedger,
{
  Ok(Json(ops.metadata(params.dataset.as_deref()).await?))
}

//! Handlers that rebuild or delete stored forms.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/unzip` | Body: `{"name","checksum"}`; rebuild the extracted file |
//! | `POST` | `/zip` | Body: `{"name","checksum"}`; rebuild the archive |
//! | `POST` | `/delete/raw` | Body: `{"name","checksum"}`; drop the extracted file |
//! | `POST` | `/delete/zip` | Body: `{"name","checksum"}`; drop the archive |
//! | `POST` | `/delete` | Body: `{"name"[,"checksum"]}`; 204 |

use axum::{Json, extract::State, http::StatusCode};
use depot_core::{
  Checksum,
  dataset::VersionRecord,
  store::{ContentStore, MetadataLedger, Role},
};
use serde::{Deserialize, Serialize};

use crate::{Ops, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct VersionBody {
  pub name:     String,
  pub checksum: Checksum,
}

/// What is left of a version after one of its forms was deleted.
#[derive(Debug, Serialize)]
pub struct Remaining {
  pub remaining: Option<VersionRecord>,
}

/// `POST /unzip`
pub async fn unzip<S, L>(
  State(ops): State<Ops<S, L>>,
  Json(body): Json<VersionBody>,
) -> Result<Json<VersionRecord>, ApiError>
where
  S: ContentStore,
  L: MetadataLedger,
{
  Ok(Json(ops.unzip(&body.name, &body.checksum).await?))
}

/// `POST /zip`
pub async fn zip<S, L>(
  State(ops): State<Ops<S, L>>,
  Json(body): Json<VersionBody>,
) -> Result<Json<VersionRecord>, ApiError>
where
  S: ContentStore,
  L: MetadataLedger,
{
  Ok(Json(ops.zip(&body.name, &body.checksum).await?))
}

/// `POST /delete/raw`
pub async fn delete_extracted<S, L>(
  State(ops): State<Ops<S, L>>,
  Json(body): Json<VersionBody>,
) -> Result<Json<Remaining>, ApiError>
where
  S: ContentStore,
  L: MetadataLedger,
{
  let remaining = ops.delete_form(&body.name, &body.checksum, Role::Extracted).await?;
  Ok(Json(Remaining { remaining }))
}

/// `POST /delete/zip`
pub async fn delete_archived<S, L>(
  State(ops): State<Ops<S, L>>,
  Json(body): Json<VersionBody>,
) -> Result<Json<Remaining>, ApiError>
where
  S: ContentStore,
  L: MetadataLedger,
{
  let remaining = ops.delete_form(&body.name, &body.checksum, Role::Archived).await?;
  Ok(Json(Remaining { remaining }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteBody {
  pub name:     String,
  /// Without a checksum the whole dataset is deleted.
  #[serde(default)]
  pub checksum: Option<Checksum>,
}

/// `POST /delete`
pub async fn delete<S, L>(
  State(ops): State<Ops<S, L>>,
  Json(body): Json<DeleteBody>,
) -> Result<StatusCode, ApiError>
where
  S: ContentStore,
  L: MetadataLedger,
{
  ops.delete(&body.name, body.checksum.as_ref()).await?;
  Ok(StatusCode::NO_CONTENT)
}

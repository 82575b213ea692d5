//! Handler for `GET /files/{role}/{checksum}`: streams a stored file.

use axum::{
  body::Body,
  extract::{Path, State},
  http::header,
  response::{IntoResponse, Response},
};
use depot_core::{
  Checksum,
  store::{ContentStore, MetadataLedger, Role},
};
use tracing::debug;

use crate::{Ops, error::ApiError};

/// `GET /files/extracted/<checksum>` or `GET /files/archived/<checksum>`
pub async fn download<S, L>(
  State(ops): State<Ops<S, L>>,
  Path((role, checksum)): Path<(String, String)>,
) -> Result<Response, ApiError>
where
  S: ContentStore,
  L: MetadataLedger,
{
  let role: Role = role.parse()?;
  let checksum: Checksum = checksum.parse()?;
  let stream = ops.open(role, &checksum).await?;
  debug!(%role, %checksum, "serving file");

  let content_type = match role {
    Role::Extracted => "text/csv",
    Role::Archived => "application/zip",
  };
  let disposition = format!("attachment; filename=\"{checksum}.{}\"", role.extension());

  Ok(
    (
      [
        (header::CONTENT_TYPE, content_type.to_owned()),
        (header::CONTENT_DISPOSITION, disposition),
      ],
      Body::from_stream(stream),
    )
      .into_response(),
  )
}

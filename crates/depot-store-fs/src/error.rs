//! Error type for `depot-store-fs`.

use std::path::PathBuf;

use depot_core::Checksum;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("io error at {}: {source}", path.display())]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("corrupt metadata file {}: {source}", path.display())]
  Json {
    path:   PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("content hashes to {actual}, expected {expected}")]
  ChecksumMismatch { expected: Checksum, actual: Checksum },

  /// A file already stored under this checksum has different bytes.
  #[error("checksum collision: stored content for {0} differs")]
  Collision(Checksum),

  #[error("no metadata for dataset {0}")]
  DatasetNotFound(String),

  #[error("dataset {remote_id} has no version {checksum}")]
  VersionNotFound { remote_id: String, checksum: Checksum },

  #[error("remote identifier {0:?} cannot be used as a file name")]
  InvalidRemoteId(String),
}

impl Error {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.into();
    move |source| Self::Io { path, source }
  }
}

impl From<Error> for depot_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Io { path, source } => {
        depot_core::Error::storage(path.display().to_string(), source)
      }
      Error::Json { path, source } => depot_core::Error::storage(
        path.display().to_string(),
        std::io::Error::new(std::io::ErrorKind::InvalidData, source),
      ),
      e @ (Error::ChecksumMismatch { .. } | Error::Collision(_)) => {
        depot_core::Error::Integrity(e.to_string())
      }
      e @ (Error::DatasetNotFound(_) | Error::VersionNotFound { .. }) => {
        depot_core::Error::NotFound(e.to_string())
      }
      e @ Error::InvalidRemoteId(_) => depot_core::Error::InvalidRequest(e.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Error types for `depot-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown dataset: {0}")]
  UnknownDataset(String),

  #[error("invalid request: {0}")]
  InvalidRequest(String),

  #[error("transport error: {0}")]
  Transport(String),

  #[error("integrity error: {0}")]
  Integrity(String),

  #[error("storage error: {context}: {source}")]
  Storage {
    context: String,
    #[source]
    source:  std::io::Error,
  },

  #[error("not found: {0}")]
  NotFound(String),
}

/// Coarse classification of an [`Error`], used to pick HTTP status codes
/// and progress messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Configuration,
  InvalidRequest,
  Transport,
  Integrity,
  Storage,
  NotFound,
}

impl Error {
  pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
    Self::Storage { context: context.into(), source }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::UnknownDataset(_) => ErrorKind::Configuration,
      Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
      Self::Transport(_) => ErrorKind::Transport,
      Self::Integrity(_) => ErrorKind::Integrity,
      Self::Storage { .. } => ErrorKind::Storage,
      Self::NotFound(_) => ErrorKind::NotFound,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

//! The fetch adapter: the engine's only view of the remote data platform.
//!
//! Transport, authentication and pagination live behind [`DatasetFetcher`].
//! The engine only sees a finite stream of [`RowBatch`]es and whether a
//! failure is worth retrying.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::window::DateWindow;

/// One page of rows. Every batch of a dataset carries the same columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowBatch {
  pub columns: Vec<String>,
  pub rows:    Vec<Vec<serde_json::Value>>,
}

/// A failed batch request.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
  /// Timeouts, dropped connections, throttling: retrying may succeed.
  #[error("transient: {0}")]
  Transient(String),

  /// Authentication failures, unknown datasets, malformed payloads.
  #[error("{0}")]
  Fatal(String),
}

impl FetchError {
  pub fn is_transient(&self) -> bool { matches!(self, Self::Transient(_)) }
}

pub type BatchStream = BoxStream<'static, Result<RowBatch, FetchError>>;

/// Source of row batches for a remote dataset.
pub trait DatasetFetcher: Send + Sync {
  /// Open a lazy batch sequence for `remote_id`, starting at batch index
  /// `from_batch`. The stream is finite and cannot be rewound; after an error
  /// the caller opens a fresh one.
  fn fetch(&self, remote_id: &str, window: DateWindow, from_batch: u64) -> BatchStream;

  /// Whether `from_batch > 0` is honoured. Adapters that cannot resume are
  /// always reopened at batch 0.
  fn resumable(&self) -> bool { false }
}

//! The [`ContentStore`] and [`MetadataLedger`] traits.
//!
//! Both are implemented by storage backends (e.g. `depot-store-fs`). The
//! engine, API and server depend on these abstractions, not on any concrete
//! backend.
//!
//! All methods return `Send` futures so the traits can be used from tasks
//! spawned on a multi-threaded tokio runtime.

use std::{fmt, future::Future, str::FromStr};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::{
  Checksum,
  dataset::{DatasetEntry, DatasetRef, VersionFlag, VersionRecord},
  window::DateWindow,
};

// ─── Roles ───────────────────────────────────────────────────────────────────

/// Which form of a version a stored file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  /// The uncompressed canonical tabular file.
  Extracted,
  /// The compressed archive of the tabular file.
  Archived,
}

impl Role {
  pub fn dir_name(self) -> &'static str {
    match self {
      Self::Extracted => "extracted",
      Self::Archived => "archived",
    }
  }

  pub fn extension(self) -> &'static str {
    match self {
      Self::Extracted => "csv",
      Self::Archived => "zip",
    }
  }

  /// The ledger flag recording that this form exists.
  pub fn flag(self) -> VersionFlag {
    match self {
      Self::Extracted => VersionFlag::Extracted,
      Self::Archived => VersionFlag::Archived,
    }
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.dir_name())
  }
}

impl FromStr for Role {
  type Err = crate::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "extracted" => Ok(Self::Extracted),
      "archived" => Ok(Self::Archived),
      other => Err(crate::Error::InvalidRequest(format!("unknown role {other:?}"))),
    }
  }
}

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

// ─── Content store ───────────────────────────────────────────────────────────

/// Checksum-addressed file storage.
///
/// Writes are staged and promoted atomically, so a file is either absent or
/// complete at its final path.
pub trait ContentStore: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  /// Store `bytes` under the SHA-256 of their content and return it.
  /// Storing content that already exists is a no-op.
  fn put(
    &self,
    role: Role,
    bytes: Bytes,
  ) -> impl Future<Output = Result<Checksum, Self::Error>> + Send + '_;

  /// Store `bytes` under a caller-supplied checksum. Used for archives,
  /// which are addressed by the checksum of the tabular file they contain.
  /// For [`Role::Extracted`] the content must hash to `checksum`.
  fn put_as<'a>(
    &'a self,
    role: Role,
    checksum: &'a Checksum,
    bytes: Bytes,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Open a stored file. Returns `None` if nothing is stored there.
  fn get<'a>(
    &'a self,
    role: Role,
    checksum: &'a Checksum,
  ) -> impl Future<Output = Result<Option<ByteStream>, Self::Error>> + Send + 'a;

  /// Whether a file is stored at the final path.
  fn contains<'a>(
    &'a self,
    role: Role,
    checksum: &'a Checksum,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Remove a stored file. Returns `false` if there was nothing to remove.
  fn delete<'a>(
    &'a self,
    role: Role,
    checksum: &'a Checksum,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}

// ─── Metadata ledger ─────────────────────────────────────────────────────────

/// Durable per-dataset record of known versions.
///
/// Every mutation is persisted before the returned future resolves. Updates
/// to one dataset are atomic; distinct datasets never contend.
pub trait MetadataLedger: Send + Sync {
  type Error: std::error::Error + Into<crate::Error> + Send + Sync + 'static;

  /// The version observed most recently inside `window`, or the latest
  /// version if the window is unbounded.
  fn find_version<'a>(
    &'a self,
    remote_id: &'a str,
    window: &'a DateWindow,
  ) -> impl Future<Output = Result<Option<VersionRecord>, Self::Error>> + Send + 'a;

  /// Upsert a version: a known checksum gains `observed_at`, an unknown one
  /// becomes a new record with both flags `false`. Creates the dataset entry
  /// on first use.
  fn record<'a>(
    &'a self,
    dataset: &'a DatasetRef,
    checksum: &'a Checksum,
    observed_at: DateTime<Utc>,
  ) -> impl Future<Output = Result<VersionRecord, Self::Error>> + Send + 'a;

  /// Set `flag` to `true` on an existing version.
  fn mark<'a>(
    &'a self,
    remote_id: &'a str,
    checksum: &'a Checksum,
    flag: VersionFlag,
  ) -> impl Future<Output = Result<VersionRecord, Self::Error>> + Send + 'a;

  /// Set `flag` to `false` after an explicit deletion. Drops the version
  /// once neither form remains and returns what is left of it.
  fn clear<'a>(
    &'a self,
    remote_id: &'a str,
    checksum: &'a Checksum,
    flag: VersionFlag,
  ) -> impl Future<Output = Result<Option<VersionRecord>, Self::Error>> + Send + 'a;

  /// Drop a whole dataset entry. Returns it if it existed.
  fn remove<'a>(
    &'a self,
    remote_id: &'a str,
  ) -> impl Future<Output = Result<Option<DatasetEntry>, Self::Error>> + Send + 'a;

  /// One dataset entry, if any.
  fn entry<'a>(
    &'a self,
    remote_id: &'a str,
  ) -> impl Future<Output = Result<Option<DatasetEntry>, Self::Error>> + Send + 'a;

  /// All entries, or just the one for `remote_id`.
  fn list<'a>(
    &'a self,
    remote_id: Option<&'a str>,
  ) -> impl Future<Output = Result<Vec<DatasetEntry>, Self::Error>> + Send + 'a;
}

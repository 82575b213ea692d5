//! Paths of the persisted layout.

use std::path::{Path, PathBuf};

use depot_core::{Checksum, store::Role};

use crate::{Error, Result};

const STAGING_DIR: &str = "tmp";
const METADATA_DIR: &str = "metadata";

/// Resolves every path under a data directory. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Layout {
  root: PathBuf,
}

impl Layout {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path { &self.root }

  pub fn role_dir(&self, role: Role) -> PathBuf {
    self.root.join(role.dir_name())
  }

  pub fn staging_dir(&self) -> PathBuf { self.root.join(STAGING_DIR) }

  pub fn metadata_dir(&self) -> PathBuf { self.root.join(METADATA_DIR) }

  /// Final, checksum-addressed path of a stored file.
  pub fn file_path(&self, role: Role, checksum: &Checksum) -> PathBuf {
    self
      .role_dir(role)
      .join(format!("{checksum}.{}", role.extension()))
  }

  /// Metadata file for a dataset. Identifiers that could escape the
  /// metadata directory are refused.
  pub fn metadata_path(&self, remote_id: &str) -> Result<PathBuf> {
    let usable = !remote_id.is_empty()
      && !remote_id.starts_with('.')
      && remote_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !usable {
      return Err(Error::InvalidRemoteId(remote_id.to_owned()));
    }
    Ok(self.metadata_dir().join(format!("{remote_id}.json")))
  }

  /// Create every directory of the layout.
  pub async fn create(&self) -> Result<()> {
    for dir in [
      self.role_dir(Role::Extracted),
      self.role_dir(Role::Archived),
      self.staging_dir(),
      self.metadata_dir(),
    ] {
      tokio::fs::create_dir_all(&dir).await.map_err(Error::io(&dir))?;
    }
    Ok(())
  }
}

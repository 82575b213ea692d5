//! [`FsContentStore`]: the filesystem implementation of [`ContentStore`].

use std::path::PathBuf;

use bytes::Bytes;
use depot_core::{
  Checksum,
  store::{ByteStream, ContentStore, Role},
};
use futures::StreamExt as _;
use tokio::io::AsyncWriteExt as _;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Error, Layout, Result};

// ─── Store ───────────────────────────────────────────────────────────────────

/// Checksum-addressed files under a [`Layout`].
///
/// Every write lands in the staging directory first and is renamed into its
/// final path only once complete. Readers only ever open final paths.
#[derive(Debug, Clone)]
pub struct FsContentStore {
  layout: Layout,
}

/// Content written to the staging area but not yet visible at its final
/// path. Dropping it without [`FsContentStore::promote`] leaves the staging
/// file behind for the next startup sweep, exactly like a crash would.
#[derive(Debug)]
pub struct Staged {
  role:     Role,
  checksum: Checksum,
  path:     PathBuf,
  bytes:    Bytes,
}

impl Staged {
  pub fn checksum(&self) -> &Checksum { &self.checksum }
}

impl FsContentStore {
  /// Open the store at `layout`, creating directories and sweeping staging
  /// files left over from an interrupted write.
  pub async fn open(layout: Layout) -> Result<Self> {
    layout.create().await?;
    let store = Self { layout };
    let swept = store.sweep_staging().await?;
    if swept > 0 {
      info!(swept, "removed stale staging files");
    }
    Ok(store)
  }

  pub fn layout(&self) -> &Layout { &self.layout }

  async fn sweep_staging(&self) -> Result<usize> {
    let dir = self.layout.staging_dir();
    let mut entries = tokio::fs::read_dir(&dir).await.map_err(Error::io(&dir))?;
    let mut swept = 0;
    while let Some(entry) = entries.next_entry().await.map_err(Error::io(&dir))? {
      let path = entry.path();
      tokio::fs::remove_file(&path).await.map_err(Error::io(&path))?;
      swept += 1;
    }
    Ok(swept)
  }

  /// Write `bytes` to a fresh staging file, flushed to disk. `checksum`
  /// names the final path; when absent it is the content hash.
  pub async fn stage(
    &self,
    role: Role,
    checksum: Option<Checksum>,
    bytes: Bytes,
  ) -> Result<Staged> {
    let checksum = checksum.unwrap_or_else(|| Checksum::of(&bytes));
    let path = self
      .layout
      .staging_dir()
      .join(format!("{}.{}.part", Uuid::new_v4(), role.extension()));

    let mut file = tokio::fs::File::create(&path).await.map_err(Error::io(&path))?;
    file.write_all(&bytes).await.map_err(Error::io(&path))?;
    file.sync_all().await.map_err(Error::io(&path))?;

    Ok(Staged { role, checksum, path, bytes })
  }

  /// Move a staged file to its final path. If a file is already there the
  /// staged copy is discarded; for extracted files the existing bytes must
  /// match, otherwise two different contents share a checksum.
  pub async fn promote(&self, staged: Staged) -> Result<Checksum> {
    let target = self.layout.file_path(staged.role, &staged.checksum);

    if tokio::fs::try_exists(&target).await.map_err(Error::io(&target))? {
      tokio::fs::remove_file(&staged.path)
        .await
        .map_err(Error::io(&staged.path))?;

      if staged.role == Role::Extracted {
        let existing = tokio::fs::read(&target).await.map_err(Error::io(&target))?;
        if existing != staged.bytes {
          return Err(Error::Collision(staged.checksum));
        }
      }
      debug!(role = %staged.role, checksum = %staged.checksum, "already stored");
      return Ok(staged.checksum);
    }

    tokio::fs::rename(&staged.path, &target)
      .await
      .map_err(Error::io(&target))?;
    debug!(role = %staged.role, checksum = %staged.checksum, "promoted");
    Ok(staged.checksum)
  }
}

// ─── ContentStore impl ───────────────────────────────────────────────────────

impl ContentStore for FsContentStore {
  type Error = Error;

  async fn put(&self, role: Role, bytes: Bytes) -> Result<Checksum> {
    let staged = self.stage(role, None, bytes).await?;
    self.promote(staged).await
  }

  async fn put_as(&self, role: Role, checksum: &Checksum, bytes: Bytes) -> Result<()> {
    if role == Role::Extracted {
      let actual = Checksum::of(&bytes);
      if &actual != checksum {
        return Err(Error::ChecksumMismatch { expected: checksum.clone(), actual });
      }
    }
    let staged = self.stage(role, Some(checksum.clone()), bytes).await?;
    self.promote(staged).await?;
    Ok(())
  }

  async fn get(&self, role: Role, checksum: &Checksum) -> Result<Option<ByteStream>> {
    let path = self.layout.file_path(role, checksum);
    match tokio::fs::File::open(&path).await {
      Ok(file) => Ok(Some(ReaderStream::new(file).boxed())),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(Error::io(path)(e)),
    }
  }

  async fn contains(&self, role: Role, checksum: &Checksum) -> Result<bool> {
    let path = self.layout.file_path(role, checksum);
    tokio::fs::try_exists(&path).await.map_err(Error::io(path))
  }

  async fn delete(&self, role: Role, checksum: &Checksum) -> Result<bool> {
    let path = self.layout.file_path(role, checksum);
    match tokio::fs::remove_file(&path).await {
      Ok(()) => {
        debug!(%role, %checksum, "deleted");
        Ok(true)
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
      Err(e) => Err(Error::io(path)(e)),
    }
  }
}

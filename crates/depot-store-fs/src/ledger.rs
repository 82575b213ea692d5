//! [`JsonLedger`] keeps one pretty-printed JSON document per dataset.
//!
//! Every mutation is a read-modify-write of the dataset's document under a
//! per-dataset lock. The new document is written to a sibling temp file,
//! synced, and renamed over the old one, so a crash leaves either the old or
//! the new document and never a torn one. Reads take no lock.
//!
//! A lock only lives in the map while some mutation holds or waits on it.

use std::{
  collections::HashMap,
  path::Path,
  sync::{Arc, Mutex as StdMutex},
};

use chrono::{DateTime, Utc};
use depot_core::{
  Checksum,
  dataset::{DatasetEntry, DatasetRef, VersionFlag, VersionRecord},
  store::MetadataLedger,
  window::DateWindow,
};
use tokio::{io::AsyncWriteExt as _, sync::Mutex};
use tracing::debug;

use crate::{Error, Layout, Result};

#[derive(Debug)]
pub struct JsonLedger {
  layout: Layout,
  locks:  StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JsonLedger {
  /// Open the ledger at `layout`, creating directories as needed.
  pub async fn open(layout: Layout) -> Result<Self> {
    layout.create().await?;
    Ok(Self { layout, locks: StdMutex::new(HashMap::new()) })
  }

  fn locks(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
    self.locks.lock().unwrap_or_else(|p| p.into_inner())
  }

  fn lock_for(&self, remote_id: &str) -> Arc<Mutex<()>> {
    self.locks().entry(remote_id.to_owned()).or_default().clone()
  }

  /// Drop `lock` from the map unless another mutation still holds a handle.
  fn release(&self, remote_id: &str, lock: Arc<Mutex<()>>) {
    let mut locks = self.locks();
    if Arc::strong_count(&lock) == 2 {
      locks.remove(remote_id);
    }
  }

  #[cfg(test)]
  pub(crate) fn tracked_locks(&self) -> usize { self.locks().len() }

  async fn read(path: &Path) -> Result<Option<DatasetEntry>> {
    let raw = match tokio::fs::read(path).await {
      Ok(raw) => raw,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(Error::io(path)(e)),
    };
    serde_json::from_slice(&raw)
      .map(Some)
      .map_err(|source| Error::Json { path: path.to_path_buf(), source })
  }

  async fn write(path: &Path, entry: &DatasetEntry) -> Result<()> {
    let raw = serde_json::to_vec_pretty(entry)
      .map_err(|source| Error::Json { path: path.to_path_buf(), source })?;
    let tmp = path.with_extension("json.tmp");

    let mut file = tokio::fs::File::create(&tmp).await.map_err(Error::io(&tmp))?;
    file.write_all(&raw).await.map_err(Error::io(&tmp))?;
    file.sync_all().await.map_err(Error::io(&tmp))?;
    drop(file);

    tokio::fs::rename(&tmp, path).await.map_err(Error::io(path))
  }

  /// Apply `f` to the dataset's document under its lock and persist the
  /// result. `None` in means no document yet; `None` out deletes it.
  async fn update<T>(
    &self,
    remote_id: &str,
    f: impl FnOnce(&mut Option<DatasetEntry>) -> Result<T>,
  ) -> Result<T> {
    let path = self.layout.metadata_path(remote_id)?;
    let lock = self.lock_for(remote_id);
    let guard = lock.lock().await;
    let out = Self::apply(&path, f).await;
    drop(guard);
    self.release(remote_id, lock);
    out
  }

  async fn apply<T>(
    path: &Path,
    f: impl FnOnce(&mut Option<DatasetEntry>) -> Result<T>,
  ) -> Result<T> {
    let before = Self::read(path).await?;
    let mut entry = before.clone();
    let out = f(&mut entry)?;

    match &entry {
      Some(e) if entry != before => Self::write(path, e).await?,
      Some(_) => {}
      None if before.is_some() => {
        tokio::fs::remove_file(path).await.map_err(Error::io(path))?;
      }
      None => {}
    }
    Ok(out)
  }

  async fn load(&self, remote_id: &str) -> Result<Option<DatasetEntry>> {
    let path = self.layout.metadata_path(remote_id)?;
    Self::read(&path).await
  }

  fn version_mut<'e>(
    entry: &'e mut Option<DatasetEntry>,
    remote_id: &str,
    checksum: &Checksum,
  ) -> Result<&'e mut VersionRecord> {
    entry
      .as_mut()
      .ok_or_else(|| Error::DatasetNotFound(remote_id.to_owned()))?
      .version_mut(checksum)
      .ok_or_else(|| Error::VersionNotFound {
        remote_id: remote_id.to_owned(),
        checksum:  checksum.clone(),
      })
  }
}

// ─── MetadataLedger impl ─────────────────────────────────────────────────────

impl MetadataLedger for JsonLedger {
  type Error = Error;

  async fn find_version(
    &self,
    remote_id: &str,
    window: &DateWindow,
  ) -> Result<Option<VersionRecord>> {
    Ok(
      self
        .load(remote_id)
        .await?
        .and_then(|entry| entry.newest_in(window).cloned()),
    )
  }

  async fn record(
    &self,
    dataset: &DatasetRef,
    checksum: &Checksum,
    observed_at: DateTime<Utc>,
  ) -> Result<VersionRecord> {
    self
      .update(&dataset.remote_id, |entry| {
        let entry = entry.get_or_insert_with(|| DatasetEntry::new(dataset));
        let record = match entry.version_mut(checksum) {
          Some(existing) => {
            debug!(remote_id = %dataset.remote_id, %checksum, "known content, adding observation");
            existing.observe(observed_at);
            existing.clone()
          }
          None => {
            let fresh = VersionRecord::new(checksum.clone(), observed_at);
            entry.versions.push(fresh.clone());
            fresh
          }
        };
        Ok(record)
      })
      .await
  }

  async fn mark(
    &self,
    remote_id: &str,
    checksum: &Checksum,
    flag: VersionFlag,
  ) -> Result<VersionRecord> {
    self
      .update(remote_id, |entry| {
        let version = Self::version_mut(entry, remote_id, checksum)?;
        version.set_flag(flag, true);
        Ok(version.clone())
      })
      .await
  }

  async fn clear(
    &self,
    remote_id: &str,
    checksum: &Checksum,
    flag: VersionFlag,
  ) -> Result<Option<VersionRecord>> {
    self
      .update(remote_id, |entry| {
        let version = Self::version_mut(entry, remote_id, checksum)?;
        version.set_flag(flag, false);
        if version.archived || version.extracted {
          return Ok(Some(version.clone()));
        }
        if let Some(e) = entry.as_mut() {
          e.versions.retain(|v| &v.checksum != checksum);
        }
        Ok(None)
      })
      .await
  }

  async fn remove(&self, remote_id: &str) -> Result<Option<DatasetEntry>> {
    self.update(remote_id, |entry| Ok(entry.take())).await
  }

  async fn entry(&self, remote_id: &str) -> Result<Option<DatasetEntry>> {
    self.load(remote_id).await
  }

  async fn list(&self, remote_id: Option<&str>) -> Result<Vec<DatasetEntry>> {
    if let Some(id) = remote_id {
      return Ok(self.load(id).await?.into_iter().collect());
    }

    let dir = self.layout.metadata_dir();
    let mut entries = tokio::fs::read_dir(&dir).await.map_err(Error::io(&dir))?;
    let mut out = Vec::new();
    while let Some(file) = entries.next_entry().await.map_err(Error::io(&dir))? {
      let path = file.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
        continue;
      };
      if let Some(entry) = self.load(id).await? {
        out.push(entry);
      }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
  }
}

//! Operator-facing queries and housekeeping over the store and ledger.
//!
//! These run outside the provisioning state machine. Deleting a form is the
//! only way a ledger flag ever goes back to `false`.

use std::sync::Arc;

use bytes::Bytes;
use depot_core::{
  Checksum, Error, Result,
  catalog::DatasetCatalog,
  dataset::{DatasetEntry, DatasetRef, VersionFlag, VersionRecord},
  store::{ByteStream, ContentStore, MetadataLedger, Role},
};
use tracing::info;

use crate::{
  archive,
  engine::{blocking, read_all},
};

fn backend(e: impl Into<Error>) -> Error { e.into() }

pub struct Maintenance<S, L> {
  store:   Arc<S>,
  ledger:  Arc<L>,
  catalog: Arc<DatasetCatalog>,
}

impl<S, L> Maintenance<S, L>
where
  S: ContentStore,
  L: MetadataLedger,
{
  pub fn new(store: Arc<S>, ledger: Arc<L>, catalog: Arc<DatasetCatalog>) -> Self {
    Self { store, ledger, catalog }
  }

  pub fn catalog(&self) -> &DatasetCatalog { &self.catalog }

  // ─── Queries ───────────────────────────────────────────────────────────────

  /// Known versions of `name`, newest first. Empty if it was never
  /// provisioned.
  pub async fn versions(&self, name: &str) -> Result<Vec<VersionRecord>> {
    let dataset = self.catalog.resolve(name)?;
    let entry = self.ledger.entry(&dataset.remote_id).await.map_err(backend)?;
    Ok(entry.map(|e| e.versions_newest_first()).unwrap_or_default())
  }

  /// Ledger entries for `names`, in request order. Datasets that were never
  /// provisioned come back with no versions.
  pub async fn info(&self, names: &[String]) -> Result<Vec<DatasetEntry>> {
    let mut entries = Vec::new();
    for dataset in self.catalog.resolve_all(names)? {
      let entry = self.ledger.entry(&dataset.remote_id).await.map_err(backend)?;
      entries.push(entry.unwrap_or_else(|| DatasetEntry::new(&dataset)));
    }
    Ok(entries)
  }

  /// Every catalog dataset with its ledger entry, sorted by name.
  pub async fn list(&self) -> Result<Vec<DatasetEntry>> {
    let names: Vec<String> = self.catalog.names().map(str::to_owned).collect();
    if names.is_empty() {
      return Ok(Vec::new());
    }
    let mut entries = self.info(&names).await?;
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
  }

  /// Raw ledger contents, optionally narrowed to one remote identifier.
  pub async fn metadata(&self, remote_id: Option<&str>) -> Result<Vec<DatasetEntry>> {
    self.ledger.list(remote_id).await.map_err(backend)
  }

  /// Stream a stored file.
  pub async fn open(&self, role: Role, checksum: &Checksum) -> Result<ByteStream> {
    self
      .store
      .get(role, checksum)
      .await
      .map_err(backend)?
      .ok_or_else(|| Error::NotFound(format!("no {role} file for {checksum}")))
  }

  // ─── Housekeeping ──────────────────────────────────────────────────────────

  /// Rebuild the extracted file of a version from its archive.
  pub async fn unzip(&self, name: &str, checksum: &Checksum) -> Result<VersionRecord> {
    let dataset = self.holder_of(name, checksum).await?;
    let archived = self.read(Role::Archived, checksum).await?;
    let tabular = blocking(move || archive::extract(&archived)).await?;

    self
      .store
      .put_as(Role::Extracted, checksum, Bytes::from(tabular))
      .await
      .map_err(backend)?;
    let record = self
      .ledger
      .mark(&dataset.remote_id, checksum, VersionFlag::Extracted)
      .await
      .map_err(backend)?;
    info!(dataset = %dataset.name, %checksum, "extracted from archive");
    Ok(record)
  }

  /// Rebuild the archive of a version from its extracted file.
  pub async fn zip(&self, name: &str, checksum: &Checksum) -> Result<VersionRecord> {
    let dataset = self.holder_of(name, checksum).await?;
    let tabular = self.read(Role::Extracted, checksum).await?;
    let sum = checksum.clone();
    let archived = blocking(move || {
      if Checksum::of(&tabular) != sum {
        return Err(Error::Integrity(format!(
          "extracted file for {sum} does not match its name"
        )));
      }
      archive::compress(&sum, &tabular)
    })
    .await?;

    self
      .store
      .put_as(Role::Archived, checksum, Bytes::from(archived))
      .await
      .map_err(backend)?;
    let record = self
      .ledger
      .mark(&dataset.remote_id, checksum, VersionFlag::Archived)
      .await
      .map_err(backend)?;
    info!(dataset = %dataset.name, %checksum, "archived");
    Ok(record)
  }

  /// Delete one form of a version and clear its flag. Returns what remains
  /// of the version, or `None` once neither form is left.
  pub async fn delete_form(
    &self,
    name: &str,
    checksum: &Checksum,
    role: Role,
  ) -> Result<Option<VersionRecord>> {
    let dataset = self.holder_of(name, checksum).await?;
    let removed = self.store.delete(role, checksum).await.map_err(backend)?;
    let remaining = self
      .ledger
      .clear(&dataset.remote_id, checksum, role.flag())
      .await
      .map_err(backend)?;
    info!(dataset = %dataset.name, %checksum, %role, removed, "deleted form");
    Ok(remaining)
  }

  /// Delete one version entirely, or with no checksum the whole dataset:
  /// every stored form plus its ledger entry.
  pub async fn delete(&self, name: &str, checksum: Option<&Checksum>) -> Result<()> {
    let Some(checksum) = checksum else {
      return self.delete_dataset(name).await;
    };

    let dataset = self.holder_of(name, checksum).await?;
    self.delete_files(checksum).await?;
    for flag in [VersionFlag::Extracted, VersionFlag::Archived] {
      let remaining = self
        .ledger
        .clear(&dataset.remote_id, checksum, flag)
        .await
        .map_err(backend)?;
      if remaining.is_none() {
        break;
      }
    }
    info!(dataset = %dataset.name, %checksum, "deleted version");
    Ok(())
  }

  async fn delete_dataset(&self, name: &str) -> Result<()> {
    let dataset = self.catalog.resolve(name)?;
    let Some(entry) = self.ledger.entry(&dataset.remote_id).await.map_err(backend)? else {
      return Err(Error::NotFound(format!("'{name}' has no stored versions")));
    };
    for version in &entry.versions {
      self.delete_files(&version.checksum).await?;
    }
    self.ledger.remove(&dataset.remote_id).await.map_err(backend)?;
    info!(dataset = %dataset.name, versions = entry.versions.len(), "deleted dataset");
    Ok(())
  }

  // ─── Helpers ───────────────────────────────────────────────────────────────

  /// Resolve `name` and make sure the ledger lists `checksum` for it.
  async fn holder_of(&self, name: &str, checksum: &Checksum) -> Result<DatasetRef> {
    let dataset = self.catalog.resolve(name)?;
    let known = self
      .ledger
      .entry(&dataset.remote_id)
      .await
      .map_err(backend)?
      .is_some_and(|entry| entry.version(checksum).is_some());
    if !known {
      return Err(Error::NotFound(format!("'{name}' has no version {checksum}")));
    }
    Ok(dataset)
  }

  async fn read(&self, role: Role, checksum: &Checksum) -> Result<Vec<u8>> {
    let stream = self.open(role, checksum).await?;
    read_all(stream)
      .await
      .map_err(|e| Error::storage(format!("reading {role} file"), e))
  }

  async fn delete_files(&self, checksum: &Checksum) -> Result<()> {
    for role in [Role::Extracted, Role::Archived] {
      self.store.delete(role, checksum).await.map_err(backend)?;
    }
    Ok(())
  }
}

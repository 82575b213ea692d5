//! Name → remote identifier mapping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, dataset::DatasetRef};

/// One configured dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
  pub name: String,
  pub rid:  String,
}

/// The set of datasets callers may request, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct DatasetCatalog {
  datasets: BTreeMap<String, String>,
}

impl DatasetCatalog {
  pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
    Self {
      datasets: entries.into_iter().map(|e| (e.name, e.rid)).collect(),
    }
  }

  pub fn resolve(&self, name: &str) -> Result<DatasetRef> {
    self
      .datasets
      .get(name)
      .map(|rid| DatasetRef::new(name, rid.clone()))
      .ok_or_else(|| Error::UnknownDataset(name.to_owned()))
  }

  /// Resolve every requested name, dropping repeats. Fails on an empty list
  /// or if any name is unknown, so no partial set is ever returned.
  pub fn resolve_all(&self, names: &[String]) -> Result<Vec<DatasetRef>> {
    if names.is_empty() {
      return Err(Error::InvalidRequest("no dataset names given".into()));
    }

    let mut resolved: Vec<DatasetRef> = Vec::with_capacity(names.len());
    let mut unknown = Vec::new();
    for name in names {
      match self.datasets.get(name) {
        Some(rid) => {
          if !resolved.iter().any(|d| &d.name == name) {
            resolved.push(DatasetRef::new(name.clone(), rid.clone()));
          }
        }
        None => unknown.push(format!("'{name}'")),
      }
    }

    if unknown.is_empty() {
      Ok(resolved)
    } else {
      Err(Error::UnknownDataset(unknown.join(", ")))
    }
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.datasets.keys().map(String::as_str)
  }
}

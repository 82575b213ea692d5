//! Dataset identity and the ledger's persisted shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Checksum, window::DateWindow};

// ─── Identity ────────────────────────────────────────────────────────────────

/// A dataset as the engine sees it: the caller-facing name (for reporting)
/// and the identifier on the remote platform (for fetching and keying).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetRef {
  pub name:      String,
  pub remote_id: String,
}

impl DatasetRef {
  pub fn new(name: impl Into<String>, remote_id: impl Into<String>) -> Self {
    Self { name: name.into(), remote_id: remote_id.into() }
  }
}

// ─── Ledger records ──────────────────────────────────────────────────────────

/// One known version of a dataset, addressed by its content checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
  pub checksum:       Checksum,
  /// Every moment this exact content was observed on the remote platform,
  /// ascending.
  pub observed_dates: Vec<DateTime<Utc>>,
  pub archived:       bool,
  pub extracted:      bool,
}

impl VersionRecord {
  pub fn new(checksum: Checksum, observed_at: DateTime<Utc>) -> Self {
    Self {
      checksum,
      observed_dates: vec![observed_at],
      archived: false,
      extracted: false,
    }
  }

  /// Most recent observation overall.
  pub fn last_observed(&self) -> Option<DateTime<Utc>> {
    self.observed_dates.iter().max().copied()
  }

  /// Most recent observation that falls inside `window`.
  pub fn last_observed_in(&self, window: &DateWindow) -> Option<DateTime<Utc>> {
    self
      .observed_dates
      .iter()
      .filter(|at| window.contains(**at))
      .max()
      .copied()
  }

  /// Insert `at` keeping the dates ordered and free of duplicates.
  pub fn observe(&mut self, at: DateTime<Utc>) {
    if let Err(pos) = self.observed_dates.binary_search(&at) {
      self.observed_dates.insert(pos, at);
    }
  }

  pub fn flag(&self, flag: VersionFlag) -> bool {
    match flag {
      VersionFlag::Archived => self.archived,
      VersionFlag::Extracted => self.extracted,
    }
  }

  pub fn set_flag(&mut self, flag: VersionFlag, value: bool) {
    match flag {
      VersionFlag::Archived => self.archived = value,
      VersionFlag::Extracted => self.extracted = value,
    }
  }
}

/// The two on-disk forms a version can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionFlag {
  Archived,
  Extracted,
}

/// Everything the ledger knows about one dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetEntry {
  pub name:      String,
  pub remote_id: String,
  pub versions:  Vec<VersionRecord>,
}

impl DatasetEntry {
  pub fn new(dataset: &DatasetRef) -> Self {
    Self {
      name:      dataset.name.clone(),
      remote_id: dataset.remote_id.clone(),
      versions:  Vec::new(),
    }
  }

  pub fn version(&self, checksum: &Checksum) -> Option<&VersionRecord> {
    self.versions.iter().find(|v| &v.checksum == checksum)
  }

  pub fn version_mut(&mut self, checksum: &Checksum) -> Option<&mut VersionRecord> {
    self.versions.iter_mut().find(|v| &v.checksum == checksum)
  }

  /// The version observed most recently inside `window`; for an unbounded
  /// window, the most recently observed version overall. Ties keep the later
  /// record in `versions`.
  pub fn newest_in(&self, window: &DateWindow) -> Option<&VersionRecord> {
    self
      .versions
      .iter()
      .filter_map(|v| v.last_observed_in(window).map(|at| (at, v)))
      .max_by_key(|(at, _)| *at)
      .map(|(_, v)| v)
  }

  /// Versions sorted newest first by their latest observation.
  pub fn versions_newest_first(&self) -> Vec<VersionRecord> {
    let mut versions = self.versions.clone();
    versions.sort_by(|a, b| b.last_observed().cmp(&a.last_observed()));
    versions
  }
}

#[cfg(test)]
mod tests {
  use chrono::{NaiveDate, TimeZone};

  use super::*;

  fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
  }

  fn window(from: (i32, u32, u32), to: (i32, u32, u32)) -> DateWindow {
    DateWindow::new(
      NaiveDate::from_ymd_opt(from.0, from.1, from.2),
      NaiveDate::from_ymd_opt(to.0, to.1, to.2),
    )
    .unwrap()
  }

  fn entry() -> DatasetEntry {
    let mut e = DatasetEntry::new(&DatasetRef::new("snp", "rid-1"));
    let mut a = VersionRecord::new(Checksum::of(b"a"), at(2025, 6, 3));
    a.observe(at(2025, 6, 20));
    let b = VersionRecord::new(Checksum::of(b"b"), at(2025, 6, 10));
    let c = VersionRecord::new(Checksum::of(b"c"), at(2025, 8, 1));
    e.versions = vec![a, b, c];
    e
  }

  #[test]
  fn newest_in_window_uses_latest_matching_date() {
    let e = entry();
    let found = e.newest_in(&window((2025, 6, 1), (2025, 6, 30))).unwrap();
    assert_eq!(found.checksum, Checksum::of(b"a"));

    let found = e.newest_in(&window((2025, 6, 5), (2025, 6, 15))).unwrap();
    assert_eq!(found.checksum, Checksum::of(b"b"));
  }

  #[test]
  fn unbounded_window_returns_latest() {
    let e = entry();
    let found = e.newest_in(&DateWindow::UNBOUNDED).unwrap();
    assert_eq!(found.checksum, Checksum::of(b"c"));
  }

  #[test]
  fn window_without_observations_finds_nothing() {
    assert!(entry().newest_in(&window((2024, 1, 1), (2024, 12, 31))).is_none());
  }

  #[test]
  fn observe_keeps_dates_sorted_and_unique() {
    let mut v = VersionRecord::new(Checksum::of(b"x"), at(2025, 6, 10));
    v.observe(at(2025, 6, 1));
    v.observe(at(2025, 6, 10));
    assert_eq!(v.observed_dates, vec![at(2025, 6, 1), at(2025, 6, 10)]);
  }

  #[test]
  fn versions_newest_first_orders_by_last_observation() {
    let order: Vec<_> = entry()
      .versions_newest_first()
      .into_iter()
      .map(|v| v.checksum)
      .collect();
    assert_eq!(
      order,
      vec![Checksum::of(b"c"), Checksum::of(b"a"), Checksum::of(b"b")]
    );
  }
}

//! Integration tests for the filesystem backend against a temp directory.

use bytes::Bytes;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use depot_core::{
  Checksum,
  dataset::{DatasetRef, VersionFlag},
  store::{ContentStore, MetadataLedger, Role},
  window::DateWindow,
};
use futures::TryStreamExt as _;
use tempfile::TempDir;

use crate::{Error, FsContentStore, JsonLedger, Layout};

async fn content_store() -> (TempDir, FsContentStore) {
  let dir = tempfile::tempdir().expect("tempdir");
  let store = FsContentStore::open(Layout::new(dir.path()))
    .await
    .expect("open store");
  (dir, store)
}

async fn ledger() -> (TempDir, JsonLedger) {
  let dir = tempfile::tempdir().expect("tempdir");
  let ledger = JsonLedger::open(Layout::new(dir.path())).await.expect("open ledger");
  (dir, ledger)
}

async fn read_all(store: &FsContentStore, role: Role, checksum: &Checksum) -> Option<Vec<u8>> {
  let stream = store.get(role, checksum).await.unwrap()?;
  let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
  Some(chunks.concat())
}

fn count_files(dir: &std::path::Path) -> usize {
  std::fs::read_dir(dir).unwrap().count()
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(y, m, d, 9, 30, 0).unwrap()
}

fn june_2025() -> DateWindow {
  DateWindow::new(NaiveDate::from_ymd_opt(2025, 6, 1), NaiveDate::from_ymd_opt(2025, 6, 30))
    .unwrap()
}

fn july_2025() -> DateWindow {
  DateWindow::new(NaiveDate::from_ymd_opt(2025, 7, 1), NaiveDate::from_ymd_opt(2025, 7, 31))
    .unwrap()
}

// ─── Content store ───────────────────────────────────────────────────────────

#[tokio::test]
async fn put_twice_yields_one_file() {
  let (_dir, store) = content_store().await;
  let bytes = Bytes::from_static(b"id,value\n1,a\n");

  let first = store.put(Role::Extracted, bytes.clone()).await.unwrap();
  let second = store.put(Role::Extracted, bytes.clone()).await.unwrap();

  assert_eq!(first, second);
  assert_eq!(first, Checksum::of(&bytes));
  assert_eq!(count_files(&store.layout().role_dir(Role::Extracted)), 1);
  assert_eq!(count_files(&store.layout().staging_dir()), 0);
  assert_eq!(read_all(&store, Role::Extracted, &first).await.unwrap(), bytes.to_vec());
}

#[tokio::test]
async fn get_unknown_checksum_is_a_miss() {
  let (_dir, store) = content_store().await;
  assert!(store.get(Role::Archived, &Checksum::of(b"nothing")).await.unwrap().is_none());
  assert!(!store.delete(Role::Archived, &Checksum::of(b"nothing")).await.unwrap());
}

#[tokio::test]
async fn put_as_rejects_mismatched_extracted_content() {
  let (_dir, store) = content_store().await;
  let err = store
    .put_as(Role::Extracted, &Checksum::of(b"other"), Bytes::from_static(b"rows"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ChecksumMismatch { .. }));
  assert_eq!(
    depot_core::Error::from(err).kind(),
    depot_core::ErrorKind::Integrity
  );
}

#[tokio::test]
async fn archives_are_addressed_by_the_given_checksum() {
  let (_dir, store) = content_store().await;
  let key = Checksum::of(b"tabular");
  store
    .put_as(Role::Archived, &key, Bytes::from_static(b"zip bytes"))
    .await
    .unwrap();
  assert!(store.contains(Role::Archived, &key).await.unwrap());
  assert!(store.layout().file_path(Role::Archived, &key).ends_with(format!("{key}.zip")));
}

#[tokio::test]
async fn differing_content_under_existing_checksum_is_a_collision() {
  let (_dir, store) = content_store().await;
  let bytes = Bytes::from_static(b"original");
  let sum = store.put(Role::Extracted, bytes).await.unwrap();

  // Corrupt the stored file so the next write of the same checksum differs.
  std::fs::write(store.layout().file_path(Role::Extracted, &sum), b"tampered").unwrap();

  let err = store
    .put(Role::Extracted, Bytes::from_static(b"original"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Collision(_)));
}

#[tokio::test]
async fn staged_but_unpromoted_content_is_invisible() {
  let dir = tempfile::tempdir().unwrap();
  let layout = Layout::new(dir.path());
  let store = FsContentStore::open(layout.clone()).await.unwrap();

  let staged = store
    .stage(Role::Extracted, None, Bytes::from_static(b"half written"))
    .await
    .unwrap();
  let sum = staged.checksum().clone();
  // Simulated crash: the staged file is never promoted.
  drop(staged);

  assert!(store.get(Role::Extracted, &sum).await.unwrap().is_none());
  assert!(!store.contains(Role::Extracted, &sum).await.unwrap());
  assert_eq!(count_files(&layout.staging_dir()), 1);

  // Reopening sweeps the leftover staging file.
  let reopened = FsContentStore::open(layout.clone()).await.unwrap();
  assert_eq!(count_files(&layout.staging_dir()), 0);
  assert!(reopened.get(Role::Extracted, &sum).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_removes_only_that_role() {
  let (_dir, store) = content_store().await;
  let bytes = Bytes::from_static(b"a,b\n");
  let sum = store.put(Role::Extracted, bytes.clone()).await.unwrap();
  store.put_as(Role::Archived, &sum, Bytes::from_static(b"zip")).await.unwrap();

  assert!(store.delete(Role::Extracted, &sum).await.unwrap());
  assert!(!store.contains(Role::Extracted, &sum).await.unwrap());
  assert!(store.contains(Role::Archived, &sum).await.unwrap());
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_content_deduplicates_into_one_record() {
  let (_dir, l) = ledger().await;
  let ds = DatasetRef::new("SNP", "rid-snp");
  let sum = Checksum::of(b"same rows");

  l.record(&ds, &sum, at(2025, 6, 1)).await.unwrap();
  let rec = l.record(&ds, &sum, at(2025, 6, 15)).await.unwrap();

  assert_eq!(rec.observed_dates, vec![at(2025, 6, 1), at(2025, 6, 15)]);
  let entry = l.entry("rid-snp").await.unwrap().unwrap();
  assert_eq!(entry.versions.len(), 1);
  assert_eq!(entry.name, "SNP");
}

#[tokio::test]
async fn new_records_start_unflagged_and_marks_stick() {
  let (_dir, l) = ledger().await;
  let ds = DatasetRef::new("SNP", "rid-snp");
  let sum = Checksum::of(b"rows");

  let rec = l.record(&ds, &sum, at(2025, 6, 1)).await.unwrap();
  assert!(!rec.archived && !rec.extracted);

  l.mark("rid-snp", &sum, VersionFlag::Archived).await.unwrap();
  l.mark("rid-snp", &sum, VersionFlag::Extracted).await.unwrap();

  // A later observation of the same content never resets flags.
  let rec = l.record(&ds, &sum, at(2025, 6, 2)).await.unwrap();
  assert!(rec.archived && rec.extracted);
}

#[tokio::test]
async fn find_version_respects_the_window() {
  let (_dir, l) = ledger().await;
  let ds = DatasetRef::new("SNP", "rid-snp");
  let sum = Checksum::of(b"rows");
  l.record(&ds, &sum, at(2025, 6, 15)).await.unwrap();

  let hit = l.find_version("rid-snp", &june_2025()).await.unwrap();
  assert_eq!(hit.map(|v| v.checksum), Some(sum.clone()));
  assert!(l.find_version("rid-snp", &july_2025()).await.unwrap().is_none());
  assert!(l.find_version("rid-unknown", &june_2025()).await.unwrap().is_none());
}

#[tokio::test]
async fn find_version_prefers_most_recent_observation() {
  let (_dir, l) = ledger().await;
  let ds = DatasetRef::new("SNP", "rid-snp");
  let old = Checksum::of(b"old");
  let new = Checksum::of(b"new");
  l.record(&ds, &old, at(2025, 6, 2)).await.unwrap();
  l.record(&ds, &new, at(2025, 6, 20)).await.unwrap();
  l.record(&ds, &old, at(2025, 8, 1)).await.unwrap();

  let in_june = l.find_version("rid-snp", &june_2025()).await.unwrap().unwrap();
  assert_eq!(in_june.checksum, new);

  let latest = l.find_version("rid-snp", &DateWindow::UNBOUNDED).await.unwrap().unwrap();
  assert_eq!(latest.checksum, old);
}

#[tokio::test]
async fn mark_unknown_version_is_not_found() {
  let (_dir, l) = ledger().await;
  let err = l
    .mark("rid-snp", &Checksum::of(b"x"), VersionFlag::Archived)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DatasetNotFound(_)));
}

#[tokio::test]
async fn clear_drops_version_once_both_forms_are_gone() {
  let (_dir, l) = ledger().await;
  let ds = DatasetRef::new("SNP", "rid-snp");
  let sum = Checksum::of(b"rows");
  l.record(&ds, &sum, at(2025, 6, 1)).await.unwrap();
  l.mark("rid-snp", &sum, VersionFlag::Archived).await.unwrap();
  l.mark("rid-snp", &sum, VersionFlag::Extracted).await.unwrap();

  let left = l.clear("rid-snp", &sum, VersionFlag::Extracted).await.unwrap();
  assert!(left.is_some_and(|v| v.archived && !v.extracted));

  let left = l.clear("rid-snp", &sum, VersionFlag::Archived).await.unwrap();
  assert!(left.is_none());
  assert!(l.entry("rid-snp").await.unwrap().unwrap().versions.is_empty());
}

#[tokio::test]
async fn entries_survive_reopen_and_list_sorts_by_name() {
  let dir = tempfile::tempdir().unwrap();
  {
    let l = JsonLedger::open(Layout::new(dir.path())).await.unwrap();
    l.record(&DatasetRef::new("b-set", "rid-b"), &Checksum::of(b"b"), at(2025, 6, 1))
      .await
      .unwrap();
    l.record(&DatasetRef::new("a-set", "rid-a"), &Checksum::of(b"a"), at(2025, 6, 1))
      .await
      .unwrap();
  }

  let l = JsonLedger::open(Layout::new(dir.path())).await.unwrap();
  let names: Vec<_> = l.list(None).await.unwrap().into_iter().map(|e| e.name).collect();
  assert_eq!(names, vec!["a-set", "b-set"]);
  assert_eq!(l.list(Some("rid-b")).await.unwrap().len(), 1);
  assert!(l.list(Some("rid-zzz")).await.unwrap().is_empty());
}

#[tokio::test]
async fn remove_deletes_the_document() {
  let (_dir, l) = ledger().await;
  l.record(&DatasetRef::new("SNP", "rid-snp"), &Checksum::of(b"x"), at(2025, 6, 1))
    .await
    .unwrap();
  assert!(l.remove("rid-snp").await.unwrap().is_some());
  assert!(l.entry("rid-snp").await.unwrap().is_none());
  assert!(l.remove("rid-snp").await.unwrap().is_none());
}

#[tokio::test]
async fn path_like_remote_ids_are_refused() {
  let (_dir, l) = ledger().await;
  let err = l
    .record(&DatasetRef::new("evil", "../escape"), &Checksum::of(b"x"), at(2025, 6, 1))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidRemoteId(_)));
}

#[tokio::test]
async fn lookups_of_unknown_ids_leave_no_locks_behind() {
  let (_dir, l) = ledger().await;
  for i in 0..1_000 {
    let id = format!("unknown-{i}");
    assert!(l.list(Some(&id)).await.unwrap().is_empty());
    assert!(l.entry(&id).await.unwrap().is_none());
    assert!(l.find_version(&id, &june_2025()).await.unwrap().is_none());
  }
  assert_eq!(l.tracked_locks(), 0);
}

#[tokio::test]
async fn concurrent_mutations_release_their_lock() {
  let (_dir, l) = ledger().await;
  let ds = DatasetRef::new("SNP", "rid-snp");
  let records = (0..8u32).map(|day| {
    let checksum = Checksum::of(format!("rows {day}").as_bytes());
    let (l, ds) = (&l, &ds);
    async move { l.record(ds, &checksum, at(2025, 6, day + 1)).await }
  });
  for result in futures::future::join_all(records).await {
    result.unwrap();
  }

  assert_eq!(l.entry("rid-snp").await.unwrap().unwrap().versions.len(), 8);
  assert_eq!(l.tracked_locks(), 0);
}

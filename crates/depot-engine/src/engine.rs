//! The provisioning engine: one workflow per dataset, coalesced by remote
//! identifier.
//!
//! ```text
//! Idle → CheckingCache ─┬─→ CacheHitExtract ───────────────────────────────→ Done
//!                       └─→ Downloading → Checksumming → Persisting
//!                             → Archiving → MetadataUpdate ─────────────────→ Done
//! any non-terminal stage ──────────────────────────────────────────────────→ Error
//! ```
//!
//! Workflows run on their own tokio task. Callers get a [`Flight`]: a
//! subscription to the run's updates plus a shared handle on its outcome. A
//! caller that asks for a dataset already in flight is attached to the
//! running workflow instead of starting another one.

use std::{
  collections::HashMap,
  fmt,
  sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};

use bytes::Bytes;
use chrono::Utc;
use depot_core::{
  Checksum, Error,
  dataset::{DatasetRef, VersionFlag, VersionRecord},
  event::ProgressEvent,
  fetch::{DatasetFetcher, RowBatch},
  store::{ByteStream, ContentStore, MetadataLedger, Role},
  window::DateWindow,
};
use futures::{
  FutureExt as _, StreamExt as _, TryStreamExt as _,
  future::{BoxFuture, Shared},
};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{archive, tabular};

const RUN_CHANNEL_CAPACITY: usize = 128;

// ─── Stages ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
  Idle,
  CheckingCache,
  CacheHitExtract,
  Downloading,
  Checksumming,
  Persisting,
  Archiving,
  MetadataUpdate,
  Done,
  Error,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Idle => "idle",
      Self::CheckingCache => "checking cache",
      Self::CacheHitExtract => "restoring from cache",
      Self::Downloading => "downloading",
      Self::Checksumming => "computing checksum",
      Self::Persisting => "saving",
      Self::Archiving => "archiving",
      Self::MetadataUpdate => "updating metadata",
      Self::Done => "done",
      Self::Error => "failed",
    })
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Where a provisioned version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
  /// An archived version inside the requested window was reused.
  Cache,
  /// The dataset was fetched from the remote platform.
  Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
  pub dataset:  DatasetRef,
  pub checksum: Checksum,
  pub origin:   Origin,
}

/// A workflow that ended in [`Stage::Error`].
#[derive(Debug)]
pub struct ProvisionFailure {
  pub dataset: DatasetRef,
  /// The stage that was running when the error occurred.
  pub stage:   Stage,
  pub error:   Error,
}

impl fmt::Display for ProvisionFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "'{}' failed while {}: {}", self.dataset.name, self.stage, self.error)
  }
}

impl std::error::Error for ProvisionFailure {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> { Some(&self.error) }
}

pub type Outcome = Result<Provisioned, Arc<ProvisionFailure>>;
pub type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;

// ─── Retry policy ────────────────────────────────────────────────────────────

/// How often a single batch is retried after a transient failure.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_retries: u32,
  /// Delay before the first retry; doubled on each further attempt.
  pub backoff:     Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_retries: 3, backoff: Duration::from_millis(500) }
  }
}

impl RetryPolicy {
  fn delay(&self, attempt: u32) -> Duration {
    self.backoff.saturating_mul(1 << attempt.saturating_sub(1).min(16))
  }
}

// ─── Flight ──────────────────────────────────────────────────────────────────

/// A caller's handle on a running workflow.
pub struct Flight {
  /// Non-terminal updates from the run, from the moment of attaching.
  pub updates: broadcast::Receiver<ProgressEvent>,
  outcome:     SharedOutcome,
  joined:      bool,
}

impl Flight {
  /// Whether this caller attached to a workflow someone else started.
  pub fn joined(&self) -> bool { self.joined }

  pub fn outcome(&self) -> SharedOutcome { self.outcome.clone() }

  pub async fn wait(self) -> Outcome { self.outcome.await }
}

struct InFlight {
  run:     u64,
  tx:      broadcast::Sender<ProgressEvent>,
  outcome: SharedOutcome,
}

/// Removes the in-flight entry when the run ends, including by panic.
struct FlightGuard<S, L, F> {
  engine: Arc<Engine<S, L, F>>,
  key:    String,
  run:    u64,
}

impl<S, L, F> Drop for FlightGuard<S, L, F> {
  fn drop(&mut self) {
    let mut in_flight = self.engine.in_flight.lock().unwrap_or_else(|p| p.into_inner());
    if in_flight.get(&self.key).is_some_and(|f| f.run == self.run) {
      in_flight.remove(&self.key);
    }
  }
}

// ─── Per-run bookkeeping ─────────────────────────────────────────────────────

/// Tracks the current stage of one workflow and reports transitions.
struct Run {
  dataset: DatasetRef,
  stage:   Stage,
  tx:      broadcast::Sender<ProgressEvent>,
}

impl Run {
  fn enter(&mut self, stage: Stage) {
    debug!(dataset = %self.dataset.name, from = %self.stage, to = %stage, "stage transition");
    self.stage = stage;
    if !matches!(stage, Stage::Idle | Stage::Done | Stage::Error) {
      self.update(format!("{} | {}", self.dataset.name, stage));
    }
  }

  fn update(&self, message: String) {
    // No receivers simply means nobody is watching.
    let _ = self.tx.send(ProgressEvent::update(message));
  }

  fn fail(&self, error: Error) -> ProvisionFailure {
    ProvisionFailure { dataset: self.dataset.clone(), stage: self.stage, error }
  }
}

/// Attach the current stage to any error.
trait AtStage<T> {
  fn at(self, run: &Run) -> Result<T, ProvisionFailure>;
}

impl<T, E: Into<Error>> AtStage<T> for Result<T, E> {
  fn at(self, run: &Run) -> Result<T, ProvisionFailure> {
    self.map_err(|e| run.fail(e.into()))
  }
}

pub(crate) async fn read_all(mut stream: ByteStream) -> std::io::Result<Vec<u8>> {
  let mut buf = Vec::new();
  while let Some(chunk) = stream.try_next().await? {
    buf.extend_from_slice(&chunk);
  }
  Ok(buf)
}

/// Run CPU-heavy codec work off the async workers.
pub(crate) async fn blocking<T: Send + 'static>(
  f: impl FnOnce() -> Result<T, Error> + Send + 'static,
) -> Result<T, Error> {
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| Error::storage("codec task", std::io::Error::other(e)))?
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Orchestrates provisioning workflows over shared store, ledger and
/// fetcher services.
pub struct Engine<S, L, F> {
  store:     Arc<S>,
  ledger:    Arc<L>,
  fetcher:   Arc<F>,
  retry:     RetryPolicy,
  in_flight: Mutex<HashMap<String, InFlight>>,
  next_run:  AtomicU64,
}

impl<S, L, F> Engine<S, L, F>
where
  S: ContentStore + 'static,
  L: MetadataLedger + 'static,
  F: DatasetFetcher + 'static,
{
  pub fn new(store: Arc<S>, ledger: Arc<L>, fetcher: Arc<F>, retry: RetryPolicy) -> Self {
    Self {
      store,
      ledger,
      fetcher,
      retry,
      in_flight: Mutex::new(HashMap::new()),
      next_run: AtomicU64::new(0),
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn ledger(&self) -> &Arc<L> { &self.ledger }

  /// Number of workflows currently running.
  pub fn in_flight(&self) -> usize {
    self.in_flight.lock().unwrap_or_else(|p| p.into_inner()).len()
  }

  /// Start provisioning `dataset`, or attach to the workflow already running
  /// for it. An attached caller shares that run's window and outcome.
  ///
  /// The workflow runs on its own task and finishes even if every `Flight`
  /// is dropped.
  pub fn provision(self: &Arc<Self>, dataset: DatasetRef, window: DateWindow) -> Flight {
    let mut in_flight = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());

    if let Some(running) = in_flight.get(&dataset.remote_id) {
      debug!(dataset = %dataset.name, run = running.run, "joining in-flight workflow");
      return Flight {
        updates: running.tx.subscribe(),
        outcome: running.outcome.clone(),
        joined:  true,
      };
    }

    let run = self.next_run.fetch_add(1, Ordering::Relaxed);
    let (tx, updates) = broadcast::channel(RUN_CHANNEL_CAPACITY);
    let guard = FlightGuard {
      engine: Arc::clone(self),
      key:    dataset.remote_id.clone(),
      run,
    };

    let for_panic = dataset.clone();
    let task = tokio::spawn(Arc::clone(self).run(dataset.clone(), window, tx.clone(), guard));
    let outcome = async move {
      task.await.unwrap_or_else(|join| {
        Err(Arc::new(ProvisionFailure {
          dataset: for_panic,
          stage:   Stage::Error,
          error:   Error::storage("provisioning task", std::io::Error::other(join)),
        }))
      })
    }
    .boxed()
    .shared();

    in_flight.insert(dataset.remote_id.clone(), InFlight {
      run,
      tx,
      outcome: outcome.clone(),
    });

    Flight { updates, outcome, joined: false }
  }

  async fn run(
    self: Arc<Self>,
    dataset: DatasetRef,
    window: DateWindow,
    tx: broadcast::Sender<ProgressEvent>,
    guard: FlightGuard<S, L, F>,
  ) -> Outcome {
    info!(dataset = %dataset.name, remote_id = %dataset.remote_id, ?window, "provisioning");
    let mut run = Run { dataset, stage: Stage::Idle, tx };

    let outcome = match self.workflow(&mut run, window).await {
      Ok(provisioned) => {
        run.enter(Stage::Done);
        info!(
          dataset = %provisioned.dataset.name,
          checksum = %provisioned.checksum,
          origin = ?provisioned.origin,
          "provisioned"
        );
        let _ = run.tx.send(ProgressEvent::finished(
          true,
          format!("{} | ready", provisioned.dataset.name),
          vec![provisioned.checksum.clone()],
        ));
        Ok(provisioned)
      }
      Err(failure) => {
        run.enter(Stage::Error);
        error!(dataset = %failure.dataset.name, stage = %failure.stage, error = %failure.error, "provisioning failed");
        let _ = run.tx.send(ProgressEvent::error(format!("ERROR | {failure}")));
        Err(Arc::new(failure))
      }
    };

    drop(guard);
    outcome
  }

  async fn workflow(
    &self,
    run: &mut Run,
    window: DateWindow,
  ) -> Result<Provisioned, ProvisionFailure> {
    run.enter(Stage::CheckingCache);
    let cached = self
      .ledger
      .find_version(&run.dataset.remote_id, &window)
      .await
      .at(run)?;

    if let Some(version) = cached.filter(|v| v.archived)
      && let Some(provisioned) = self.restore(run, version).await?
    {
      return Ok(provisioned);
    }

    self.download_and_store(run, window).await
  }

  /// `CacheHitExtract`: make sure the extracted form of a cached version
  /// exists. Returns `None` if the archive the ledger points at is gone, in
  /// which case the caller downloads instead.
  async fn restore(
    &self,
    run: &mut Run,
    version: VersionRecord,
  ) -> Result<Option<Provisioned>, ProvisionFailure> {
    let checksum = version.checksum;
    if !self.store.contains(Role::Archived, &checksum).await.at(run)? {
      warn!(dataset = %run.dataset.name, %checksum, "archive listed in ledger is missing");
      return Ok(None);
    }

    run.enter(Stage::CacheHitExtract);
    let done = Provisioned {
      dataset:  run.dataset.clone(),
      checksum: checksum.clone(),
      origin:   Origin::Cache,
    };

    if version.extracted && self.store.contains(Role::Extracted, &checksum).await.at(run)? {
      return Ok(Some(done));
    }

    let Some(stream) = self.store.get(Role::Archived, &checksum).await.at(run)? else {
      return Ok(None);
    };
    let archived = read_all(stream)
      .await
      .map_err(|e| Error::storage("reading archive", e))
      .at(run)?;
    let tabular = blocking(move || archive::extract(&archived)).await.at(run)?;

    self
      .store
      .put_as(Role::Extracted, &checksum, Bytes::from(tabular))
      .await
      .at(run)?;
    self
      .ledger
      .mark(&run.dataset.remote_id, &checksum, VersionFlag::Extracted)
      .await
      .at(run)?;

    Ok(Some(done))
  }

  async fn download_and_store(
    &self,
    run: &mut Run,
    window: DateWindow,
  ) -> Result<Provisioned, ProvisionFailure> {
    run.enter(Stage::Downloading);
    let batches = self.download(run, window).await.at(run)?;

    run.enter(Stage::Checksumming);
    let tabular = blocking(move || tabular::encode_csv(&batches)).await.at(run)?;
    let tabular = Bytes::from(tabular);
    let checksum = Checksum::of(&tabular);

    run.enter(Stage::Persisting);
    self
      .store
      .put_as(Role::Extracted, &checksum, tabular.clone())
      .await
      .at(run)?;

    run.enter(Stage::Archiving);
    let sum = checksum.clone();
    let archived = blocking(move || archive::compress(&sum, &tabular)).await.at(run)?;
    self
      .store
      .put_as(Role::Archived, &checksum, Bytes::from(archived))
      .await
      .at(run)?;

    run.enter(Stage::MetadataUpdate);
    let remote_id = &run.dataset.remote_id;
    self.ledger.record(&run.dataset, &checksum, Utc::now()).await.at(run)?;
    self.ledger.mark(remote_id, &checksum, VersionFlag::Archived).await.at(run)?;
    self.ledger.mark(remote_id, &checksum, VersionFlag::Extracted).await.at(run)?;

    Ok(Provisioned { dataset: run.dataset.clone(), checksum, origin: Origin::Remote })
  }

  /// Pull every batch, retrying each one on transient failures. Resumable
  /// fetchers restart at the failed batch, others from the beginning; the
  /// retry budget is per batch index either way.
  async fn download(&self, run: &Run, window: DateWindow) -> Result<Vec<RowBatch>, Error> {
    let resumable = self.fetcher.resumable();
    let mut batches: Vec<RowBatch> = Vec::new();
    let mut failures: HashMap<usize, u32> = HashMap::new();

    'attempt: loop {
      if !resumable {
        batches.clear();
      }
      let from_batch = batches.len() as u64;
      let mut stream = self.fetcher.fetch(&run.dataset.remote_id, window, from_batch);

      while let Some(item) = stream.next().await {
        let index = batches.len();
        match item {
          Ok(batch) => {
            run.update(format!(
              "{} | received batch {} ({} rows)",
              run.dataset.name,
              index + 1,
              batch.rows.len()
            ));
            batches.push(batch);
          }
          Err(e) => {
            let attempts = failures.entry(index).or_default();
            *attempts += 1;
            if !e.is_transient() || *attempts > self.retry.max_retries {
              return Err(Error::Transport(format!(
                "batch {} failed after {} attempt(s): {e}",
                index + 1,
                attempts
              )));
            }

            let delay = self.retry.delay(*attempts);
            warn!(
              dataset = %run.dataset.name,
              batch = index + 1,
              attempt = *attempts,
              ?delay,
              error = %e,
              "batch failed, retrying"
            );
            run.update(format!(
              "{} | batch {} failed, retrying ({}/{})",
              run.dataset.name,
              index + 1,
              attempts,
              self.retry.max_retries
            ));
            tokio::time::sleep(delay).await;
            continue 'attempt;
          }
        }
      }

      return Ok(batches);
    }
  }
}

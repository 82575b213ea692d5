//! Session coordination: one inbound request, many dataset workflows, one
//! aggregated answer.

use std::sync::Arc;

use depot_core::{
  Error, Result,
  catalog::DatasetCatalog,
  event::{EventKind, ProgressEvent, SessionRequest},
  fetch::DatasetFetcher,
  store::{ContentStore, MetadataLedger},
};
use futures::future::join_all;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
  engine::{Engine, Flight, Outcome, ProvisionFailure, Provisioned},
  progress::{ProgressChannel, SessionId, Subscription},
};

/// What a finished session produced.
#[derive(Debug)]
pub struct SessionSummary {
  pub session:     SessionId,
  pub provisioned: Vec<Provisioned>,
  pub failed:      Vec<Arc<ProvisionFailure>>,
}

pub struct Coordinator<S, L, F> {
  engine:   Arc<Engine<S, L, F>>,
  catalog:  Arc<DatasetCatalog>,
  progress: ProgressChannel,
}

impl<S, L, F> Coordinator<S, L, F>
where
  S: ContentStore + 'static,
  L: MetadataLedger + 'static,
  F: DatasetFetcher + 'static,
{
  pub fn new(
    engine: Arc<Engine<S, L, F>>,
    catalog: Arc<DatasetCatalog>,
    progress: ProgressChannel,
  ) -> Self {
    Self { engine, catalog, progress }
  }

  pub fn engine(&self) -> &Arc<Engine<S, L, F>> { &self.engine }

  pub fn progress(&self) -> &ProgressChannel { &self.progress }

  /// Start a new session and subscribe to it before anything is published.
  pub fn open(&self) -> (SessionId, Subscription) {
    let session = Uuid::new_v4();
    let subscription = self.progress.open(session);
    (session, subscription)
  }

  /// Run every workflow `request` names and report on `session` until they
  /// have all terminated, then close the session.
  ///
  /// Malformed requests and unknown names are rejected before any workflow
  /// starts: an `error` event is published and the error returned. A failing
  /// dataset never affects its siblings; it is reported as its own `error`
  /// event ahead of the aggregated `final`.
  pub async fn handle(&self, session: SessionId, request: SessionRequest) -> Result<SessionSummary> {
    let resolved = request
      .window()
      .and_then(|window| Ok((self.catalog.resolve_all(&request.names)?, window)));
    let (datasets, window) = match resolved {
      Ok(ok) => ok,
      Err(e) => {
        warn!(%session, error = %e, "rejecting session request");
        self.progress.publish(session, ProgressEvent::error(format!("ERROR | {e}")));
        self.progress.close(session);
        return Err(e);
      }
    };

    info!(%session, datasets = datasets.len(), ?window, "session started");
    self.progress.start_heartbeat(session);
    self.progress.publish(
      session,
      ProgressEvent::update(format!(
        "Connection established, starting operation for {} dataset(s)...",
        datasets.len()
      )),
    );

    let total = datasets.len();
    let follows = datasets
      .into_iter()
      .map(|dataset| self.follow(session, self.engine.provision(dataset, window)));
    let outcomes = join_all(follows).await;

    let mut summary = SessionSummary { session, provisioned: Vec::new(), failed: Vec::new() };
    for outcome in outcomes {
      match outcome {
        Ok(provisioned) => summary.provisioned.push(provisioned),
        Err(failure) => {
          self
            .progress
            .publish(session, ProgressEvent::error(format!("ERROR | {failure}")));
          summary.failed.push(failure);
        }
      }
    }

    let message = if summary.failed.is_empty() {
      "DONE".to_owned()
    } else {
      format!("DONE | {} of {total} dataset(s) failed", summary.failed.len())
    };
    let checksums = summary.provisioned.iter().map(|p| p.checksum.clone()).collect();
    self.progress.publish(
      session,
      ProgressEvent::finished(summary.failed.is_empty(), message, checksums),
    );
    self.progress.close(session);

    info!(
      %session,
      provisioned = summary.provisioned.len(),
      failed = summary.failed.len(),
      "session finished"
    );
    Ok(summary)
  }

  /// Relay a flight's updates into the session until its outcome is known.
  /// Terminal events of the run are not relayed; the session reports those
  /// itself once every dataset is done.
  async fn follow(&self, session: SessionId, flight: Flight) -> Outcome {
    let mut outcome = flight.outcome();
    let mut updates = flight.updates;

    let relay = |event: ProgressEvent| {
      if event.kind == EventKind::Update {
        self.progress.publish(session, event);
      }
    };

    loop {
      tokio::select! {
        result = &mut outcome => {
          loop {
            match updates.try_recv() {
              Ok(event) => relay(event),
              Err(TryRecvError::Lagged(_)) => continue,
              Err(_) => break,
            }
          }
          return result;
        }
        received = updates.recv() => match received {
          Ok(event) => relay(event),
          Err(RecvError::Lagged(_)) => {}
          Err(RecvError::Closed) => return outcome.await,
        },
      }
    }
  }
}

impl<S, L, F> Coordinator<S, L, F> {
  /// Reject a request without running anything, e.g. when its payload could
  /// not be parsed.
  pub fn reject(&self, session: SessionId, error: &Error) {
    self.progress.publish(session, ProgressEvent::error(format!("ERROR | {error}")));
    self.progress.close(session);
  }
}

//! Per-session fan-out of progress events with idle heartbeats.
//!
//! A session is opened before its workflows start and closed after its
//! terminal event. Once its workflows are running, a heartbeat task
//! publishes a `keepalive` whenever nothing else was published for one
//! interval.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
  time::Duration,
};

use depot_core::event::ProgressEvent;
use tokio::{
  sync::broadcast,
  task::JoinHandle,
  time::{Instant, sleep_until},
};
use tracing::{debug, trace};
use uuid::Uuid;

pub type SessionId = Uuid;

const CHANNEL_CAPACITY: usize = 256;

struct Slot {
  tx:         broadcast::Sender<ProgressEvent>,
  last_event: Arc<Mutex<Instant>>,
  heartbeat:  Option<JoinHandle<()>>,
}

/// Receiving half of a session. Ends once the session is closed and every
/// buffered event has been read.
pub struct Subscription {
  rx: broadcast::Receiver<ProgressEvent>,
}

impl Subscription {
  /// Next event, skipping over any this subscriber was too slow to read.
  pub async fn next(&mut self) -> Option<ProgressEvent> {
    loop {
      match self.rx.recv().await {
        Ok(event) => return Some(event),
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
          debug!(skipped, "progress subscriber lagged");
        }
        Err(broadcast::error::RecvError::Closed) => return None,
      }
    }
  }
}

/// Registry of open sessions. Cheap to clone.
#[derive(Clone)]
pub struct ProgressChannel {
  sessions:  Arc<Mutex<HashMap<SessionId, Slot>>>,
  heartbeat: Duration,
}

impl ProgressChannel {
  pub fn new(heartbeat: Duration) -> Self {
    Self { sessions: Arc::default(), heartbeat }
  }

  fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Slot>> {
    self.sessions.lock().unwrap_or_else(|p| p.into_inner())
  }

  /// Register `session`. Returns a first subscription so the opener cannot
  /// miss early events. Opening an already open session just subscribes
  /// again.
  pub fn open(&self, session: SessionId) -> Subscription {
    let mut sessions = self.sessions();
    if let Some(slot) = sessions.get(&session) {
      return Subscription { rx: slot.tx.subscribe() };
    }

    let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
    let last_event = Arc::new(Mutex::new(Instant::now()));
    sessions.insert(session, Slot { tx, last_event, heartbeat: None });
    debug!(%session, "session opened");
    Subscription { rx }
  }

  /// Start injecting keepalives into `session` until it is closed. Does
  /// nothing if the session is unknown or already beating.
  pub fn start_heartbeat(&self, session: SessionId) {
    let mut sessions = self.sessions();
    let Some(slot) = sessions.get_mut(&session) else {
      return;
    };
    if slot.heartbeat.is_none() {
      *slot.last_event.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
      let task = tokio::spawn(beat(slot.tx.clone(), slot.last_event.clone(), self.heartbeat));
      slot.heartbeat = Some(task);
    }
  }

  /// Attach another subscriber to an open session.
  pub fn subscribe(&self, session: SessionId) -> Option<Subscription> {
    self
      .sessions()
      .get(&session)
      .map(|slot| Subscription { rx: slot.tx.subscribe() })
  }

  /// Deliver `event` to every subscriber of `session`. Returns how many
  /// received it; publishing to a closed or unknown session is a no-op.
  pub fn publish(&self, session: SessionId, event: ProgressEvent) -> usize {
    let sessions = self.sessions();
    let Some(slot) = sessions.get(&session) else {
      return 0;
    };
    *slot.last_event.lock().unwrap_or_else(|p| p.into_inner()) = Instant::now();
    slot.tx.send(event).unwrap_or(0)
  }

  /// Stop the heartbeat and drop the sender; subscriptions drain and end.
  pub fn close(&self, session: SessionId) {
    if let Some(slot) = self.sessions().remove(&session) {
      if let Some(heartbeat) = slot.heartbeat {
        heartbeat.abort();
      }
      debug!(%session, "session closed");
    }
  }

  pub fn is_open(&self, session: SessionId) -> bool {
    self.sessions().contains_key(&session)
  }
}

async fn beat(
  tx: broadcast::Sender<ProgressEvent>,
  last_event: Arc<Mutex<Instant>>,
  interval: Duration,
) {
  loop {
    let due = *last_event.lock().unwrap_or_else(|p| p.into_inner()) + interval;
    sleep_until(due).await;

    let mut last = last_event.lock().unwrap_or_else(|p| p.into_inner());
    if last.elapsed() >= interval {
      *last = Instant::now();
      drop(last);
      trace!("keepalive");
      let _ = tx.send(ProgressEvent::keepalive());
    }
  }
}

#[cfg(test)]
mod tests {
  use depot_core::event::EventKind;

  use super::*;

  #[tokio::test]
  async fn publish_fans_out_to_every_subscriber() {
    let channel = ProgressChannel::new(Duration::from_secs(60));
    let session = Uuid::new_v4();
    let mut a = channel.open(session);
    let mut b = channel.subscribe(session).unwrap();

    assert_eq!(channel.publish(session, ProgressEvent::update("one")), 2);
    assert_eq!(a.next().await.unwrap().message, "one");
    assert_eq!(b.next().await.unwrap().message, "one");
  }

  #[tokio::test]
  async fn closing_ends_subscriptions() {
    let channel = ProgressChannel::new(Duration::from_secs(60));
    let session = Uuid::new_v4();
    let mut sub = channel.open(session);
    channel.publish(session, ProgressEvent::update("last"));
    channel.close(session);

    assert_eq!(sub.next().await.unwrap().message, "last");
    assert!(sub.next().await.is_none());
    assert_eq!(channel.publish(session, ProgressEvent::update("late")), 0);
    assert!(channel.subscribe(session).is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn no_keepalives_until_the_heartbeat_starts() {
    let channel = ProgressChannel::new(Duration::from_secs(5));
    let session = Uuid::new_v4();
    let mut sub = channel.open(session);

    let waited = tokio::time::timeout(Duration::from_secs(60), sub.next()).await;
    assert!(waited.is_err(), "got {waited:?}");

    channel.start_heartbeat(session);
    assert_eq!(sub.next().await.unwrap().kind, EventKind::Keepalive);
    channel.close(session);
  }

  #[tokio::test(start_paused = true)]
  async fn idle_sessions_get_keepalives() {
    let channel = ProgressChannel::new(Duration::from_secs(5));
    let session = Uuid::new_v4();
    let mut sub = channel.open(session);
    channel.start_heartbeat(session);

    let event = sub.next().await.unwrap();
    assert_eq!(event.kind, EventKind::Keepalive);
    let event = sub.next().await.unwrap();
    assert_eq!(event.kind, EventKind::Keepalive);
    channel.close(session);
  }

  #[tokio::test(start_paused = true)]
  async fn updates_postpone_the_heartbeat() {
    let channel = ProgressChannel::new(Duration::from_secs(5));
    let session = Uuid::new_v4();
    let mut sub = channel.open(session);
    channel.start_heartbeat(session);

    tokio::time::sleep(Duration::from_secs(3)).await;
    channel.publish(session, ProgressEvent::update("busy"));
    let started = Instant::now();

    assert_eq!(sub.next().await.unwrap().kind, EventKind::Update);
    assert_eq!(sub.next().await.unwrap().kind, EventKind::Keepalive);
    assert!(started.elapsed() >= Duration::from_secs(5));
    channel.close(session);
  }
}

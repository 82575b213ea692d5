//! Session wire types: the inbound provisioning request and the outbound
//! progress events.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Checksum, Result, window::DateWindow};

// ─── Request ─────────────────────────────────────────────────────────────────

/// The first (and only) message a caller sends on a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
  #[serde(default)]
  pub names:   Vec<String>,
  #[serde(default)]
  pub from_dt: Option<NaiveDate>,
  #[serde(default)]
  pub to_dt:   Option<NaiveDate>,
}

impl SessionRequest {
  pub fn window(&self) -> Result<DateWindow> {
    DateWindow::new(self.from_dt, self.to_dt)
  }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
  Update,
  Keepalive,
  Final,
  Error,
}

impl EventKind {
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Final | Self::Error)
  }
}

/// A progress message pushed to session subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
  #[serde(rename = "type")]
  pub kind:     EventKind,
  pub success:  bool,
  pub message:  String,
  /// Resolved checksums; only present on `final`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub datasets: Option<Vec<Checksum>>,
}

impl ProgressEvent {
  pub fn update(message: impl Into<String>) -> Self {
    Self {
      kind:     EventKind::Update,
      success:  true,
      message:  message.into(),
      datasets: None,
    }
  }

  pub fn keepalive() -> Self {
    Self {
      kind:     EventKind::Keepalive,
      success:  true,
      message:  "still working".into(),
      datasets: None,
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      kind:     EventKind::Error,
      success:  false,
      message:  message.into(),
      datasets: None,
    }
  }

  pub fn finished(success: bool, message: impl Into<String>, datasets: Vec<Checksum>) -> Self {
    Self {
      kind: EventKind::Final,
      success,
      message: message.into(),
      datasets: Some(datasets),
    }
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn update_omits_datasets() {
    let v = serde_json::to_value(ProgressEvent::update("downloading")).unwrap();
    assert_eq!(
      v,
      json!({"type": "update", "success": true, "message": "downloading"})
    );
  }

  #[test]
  fn final_carries_checksums() {
    let sum = Checksum::of(b"rows");
    let v = serde_json::to_value(ProgressEvent::finished(true, "DONE", vec![sum.clone()]))
      .unwrap();
    assert_eq!(v["type"], "final");
    assert_eq!(v["datasets"], json!([sum.as_str()]));
  }

  #[test]
  fn request_dates_are_optional() {
    let req: SessionRequest = serde_json::from_str(r#"{"names":["a"]}"#).unwrap();
    assert!(req.window().unwrap().is_unbounded());

    let req: SessionRequest = serde_json::from_str(
      r#"{"names":["a"],"from_dt":"2025-06-01","to_dt":"2025-06-30"}"#,
    )
    .unwrap();
    assert_eq!(req.from_dt, NaiveDate::from_ymd_opt(2025, 6, 1));
  }
}

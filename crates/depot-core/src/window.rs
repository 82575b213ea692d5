//! Inclusive date windows used to judge cache freshness.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An inclusive `[from, to]` range of calendar dates (UTC). Either bound may
/// be absent; a window with neither bound accepts everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
  pub from: Option<NaiveDate>,
  pub to:   Option<NaiveDate>,
}

impl DateWindow {
  pub const UNBOUNDED: Self = Self { from: None, to: None };

  /// Build a window, rejecting `from > to`.
  pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self> {
    if let (Some(f), Some(t)) = (from, to)
      && f > t
    {
      return Err(Error::InvalidRequest(format!(
        "date window starts after it ends ({f} > {t})"
      )));
    }
    Ok(Self { from, to })
  }

  pub fn is_unbounded(&self) -> bool {
    self.from.is_none() && self.to.is_none()
  }

  /// Whether the calendar date of `at` falls inside the window.
  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    let day = at.date_naive();
    self.from.is_none_or(|f| f <= day) && self.to.is_none_or(|t| day <= t)
  }
}

//! [`RemoteFetcher`]: pages row batches out of the data platform's HTTP API.
//!
//! `GET {base_url}/datasets/{prefix}{rid}/batches/{index}?from=&to=` answers
//! with `{"columns": [...], "rows": [[...]], "next": <index or null>}`.

use std::time::Duration;

use depot_core::{
  fetch::{BatchStream, DatasetFetcher, FetchError, RowBatch},
  window::DateWindow,
};
use futures::StreamExt as _;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::config::RemoteConfig;

#[derive(Debug, Deserialize)]
struct Page {
  columns: Vec<String>,
  rows:    Vec<Vec<serde_json::Value>>,
  #[serde(default)]
  next:    Option<u64>,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct RemoteFetcher {
  client:   Client,
  base_url: String,
  token:    Option<String>,
  prefix:   String,
}

impl RemoteFetcher {
  pub fn new(config: &RemoteConfig) -> reqwest::Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_owned(),
      token: config.token.clone().filter(|t| !t.is_empty()),
      prefix: config.prefix.clone(),
    })
  }

  fn url(&self, remote_id: &str, index: u64) -> String {
    format!("{}/datasets/{}{}/batches/{}", self.base_url, self.prefix, remote_id, index)
  }

  async fn page(&self, remote_id: &str, window: DateWindow, index: u64) -> Result<Page, FetchError> {
    let url = self.url(remote_id, index);
    let mut request = self.client.get(&url);
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }
    let bounds: Vec<(&str, String)> = [("from", window.from), ("to", window.to)]
      .into_iter()
      .filter_map(|(key, date)| date.map(|d| (key, d.to_string())))
      .collect();

    debug!(%url, "requesting batch");
    let response = request.query(&bounds).send().await.map_err(classify)?;
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
      return Err(FetchError::Transient(format!("GET {url} → {status}")));
    }
    if !status.is_success() {
      return Err(FetchError::Fatal(format!("GET {url} → {status}")));
    }
    response.json().await.map_err(classify)
  }
}

/// Timeouts and connection failures are worth retrying; malformed bodies and
/// everything else are not.
fn classify(e: reqwest::Error) -> FetchError {
  if e.is_timeout() || e.is_connect() {
    FetchError::Transient(e.to_string())
  } else {
    FetchError::Fatal(e.to_string())
  }
}

impl DatasetFetcher for RemoteFetcher {
  fn fetch(&self, remote_id: &str, window: DateWindow, from_batch: u64) -> BatchStream {
    let fetcher = self.clone();
    let remote_id = remote_id.to_owned();

    futures::stream::unfold(Some(from_batch), move |cursor| {
      let fetcher = fetcher.clone();
      let remote_id = remote_id.clone();
      async move {
        let index = cursor?;
        match fetcher.page(&remote_id, window, index).await {
          Ok(Page { next: Some(next), .. }) if next <= index => Some((
            Err(FetchError::Fatal(format!(
              "batch {index} of {remote_id} points back to batch {next}"
            ))),
            None,
          )),
          Ok(page) => {
            let batch = RowBatch { columns: page.columns, rows: page.rows };
            Some((Ok(batch), page.next))
          }
          Err(e) => Some((Err(e), None)),
        }
      }
    })
    .boxed()
  }

  fn resumable(&self) -> bool { true }
}

//! `GET /dataset/get`: the provisioning session over a WebSocket.
//!
//! The client sends one JSON [`SessionRequest`] as a text message and then
//! only listens. Every progress event of the session is sent back as a JSON
//! text message, ending with a `final` (or a lone `error` if the request was
//! rejected), after which the server closes the socket. Workflows keep
//! running if the client goes away.

use std::sync::Arc;

use axum::{
  extract::{
    State,
    ws::{Message, WebSocket, WebSocketUpgrade},
  },
  response::Response,
};
use depot_core::{
  Error,
  event::SessionRequest,
  fetch::DatasetFetcher,
  store::{ContentStore, MetadataLedger},
};
use depot_engine::Coordinator;
use tracing::{debug, warn};

use crate::AppState;

pub async fn handler<S, L, F>(
  ws: WebSocketUpgrade,
  State(state): State<AppState<S, L, F>>,
) -> Response
where
  S: ContentStore + 'static,
  L: MetadataLedger + 'static,
  F: DatasetFetcher + 'static,
{
  ws.on_upgrade(move |socket| serve(socket, state.coordinator))
}

fn parse(message: Message) -> Result<SessionRequest, Error> {
  match message {
    Message::Text(text) => serde_json::from_str(text.as_str())
      .map_err(|e| Error::InvalidRequest(format!("malformed session request: {e}"))),
    _ => Err(Error::InvalidRequest("expected a JSON text message".into())),
  }
}

async fn serve<S, L, F>(mut socket: WebSocket, coordinator: Arc<Coordinator<S, L, F>>)
where
  S: ContentStore + 'static,
  L: MetadataLedger + 'static,
  F: DatasetFetcher + 'static,
{
  let (session, mut subscription) = coordinator.open();

  let message = loop {
    match socket.recv().await {
      Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
      Some(Ok(message)) => break message,
      Some(Err(e)) => {
        debug!(%session, error = %e, "socket failed before request");
        coordinator.progress().close(session);
        return;
      }
      None => {
        coordinator.progress().close(session);
        return;
      }
    }
  };

  match parse(message) {
    Ok(request) => {
      let coordinator = coordinator.clone();
      tokio::spawn(async move {
        // Rejections and failures are reported on the session itself.
        let _ = coordinator.handle(session, request).await;
      });
    }
    Err(e) => {
      warn!(%session, error = %e, "rejecting session");
      coordinator.reject(session, &e);
    }
  }

  while let Some(event) = subscription.next().await {
    let text = match serde_json::to_string(&event) {
      Ok(text) => text,
      Err(e) => {
        warn!(%session, error = %e, "could not encode progress event");
        continue;
      }
    };
    if socket.send(Message::Text(text.into())).await.is_err() {
      debug!(%session, "client disconnected; session continues");
      return;
    }
  }

  let _ = socket.send(Message::Close(None)).await;
}

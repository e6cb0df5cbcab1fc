use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use server_api::{list_signals, update_mode, update_phase};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{ClientRequest, ServerEvent},
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app_state::AppState;

const DIRECT_QUEUE: usize = 16;

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket))
}

async fn ws_connection(state: Arc<AppState>, socket: WebSocket) {
    let viewer_id = state.viewers.connect().await;
    info!(%viewer_id, "viewer connected");

    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.api.controller.subscribe());
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerEvent>(DIRECT_QUEUE);
    let updates_enabled = Arc::new(AtomicBool::new(true));

    let initial = ServerEvent::SignalsUpdated {
        signals: list_signals(&state.api).await,
    };
    let _ = direct_tx.send(initial).await;

    let send_updates = updates_enabled.clone();
    let send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(event) = direct_rx.recv() => event,
                item = events.next() => match item {
                    Some(Ok(event)) if event.is_periodic() && !send_updates.load(Ordering::Relaxed) => continue,
                    Some(Ok(event)) => event,
                    Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                        warn!(%viewer_id, skipped, "viewer fell behind the event stream");
                        continue;
                    }
                    None => break,
                },
            };
            let text = match serde_json::to_string(&event) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                if let Some(reply) =
                    handle_client_text(&state, viewer_id, &text, &updates_enabled).await
                {
                    if direct_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    state.viewers.disconnect(viewer_id).await;
    info!(%viewer_id, "viewer disconnected");
}

/// Applies one client request. Returns the event that should go back to this
/// viewer only; successful commands reach everyone through the event channel.
pub(crate) async fn handle_client_text(
    state: &AppState,
    viewer_id: Uuid,
    text: &str,
    updates_enabled: &AtomicBool,
) -> Option<ServerEvent> {
    let request = match serde_json::from_str::<ClientRequest>(text) {
        Ok(request) => request,
        Err(error) => {
            debug!(%viewer_id, %error, "malformed client request");
            return Some(ServerEvent::Error(ApiError::new(
                ErrorCode::Validation,
                format!("malformed request: {error}"),
            )));
        }
    };

    let result = match request {
        ClientRequest::StartUpdates => {
            updates_enabled.store(true, Ordering::Relaxed);
            Ok(())
        }
        ClientRequest::StopUpdates => {
            updates_enabled.store(false, Ordering::Relaxed);
            Ok(())
        }
        ClientRequest::SetMode { signal_id, mode } => {
            update_mode(&state.api, &signal_id, &mode).await.map(|_| ())
        }
        ClientRequest::SetPhase {
            signal_id,
            phase,
            time_remaining,
        } => update_phase(&state.api, &signal_id, &phase, time_remaining)
            .await
            .map(|_| ()),
    };

    result.err().map(|error| {
        debug!(%viewer_id, message = %error.message, "rejected client request");
        ServerEvent::Error(error)
    })
}

#[cfg(test)]
#[path = "tests/ws_tests.rs"]
mod tests;

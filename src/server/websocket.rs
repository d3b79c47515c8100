//! WebSocket push channel: one project's events as JSON text frames.

use axum::{
    extract::{
        Path as AxumPath, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::AppState;

/// WebSocket upgrade handler for `/projects/:id/events`
pub async fn events_handler(
    ws: WebSocketUpgrade,
    AxumPath(project_id): AxumPath<String>,
    State(state): State<AppState>,
) -> Response {
    if state.store.lock().await.get(&project_id).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, project_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, project_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let subscription = match state.registry.subscribe(&project_id, move |event| {
        match event.to_json() {
            Ok(json) => {
                let _ = tx.send(json);
            }
            Err(e) => warn!(error = %e, "failed to encode event"),
        }
    }) {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(project_id = %project_id, error = %e, "cannot subscribe socket");
            return;
        }
    };
    debug!(project_id = %project_id, "socket subscribed");

    // Forward channel events to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if sender.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Clients only ever close; anything else is ignored
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    subscription.unsubscribe();
    debug!(project_id = %project_id, "socket closed");
}

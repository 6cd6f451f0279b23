use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::identity::Identity;
use crate::router::auth::bearer_credential;
use crate::session;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    token: Option<String>,
}

/// Authenticates before upgrading; a bad credential never gets a socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let credential = bearer_credential(authorization, params.token.as_deref());

    let identity = state.router.authenticate(credential).map_err(|err| {
        warn!(error = %err, "websocket authentication failed");
        AppError::from(err)
    })?;

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, identity))
        .into_response())
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let (guard, mut events) = state.router.register(identity);
    let connection_id = guard.id();
    state
        .metrics
        .open_connections
        .set(state.router.connection_count() as i64);

    session::on_connect(&state, connection_id, identity);

    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(err) => {
                    warn!(event = event.name(), error = %err, "failed to serialize event for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    session::handle_text(&recv_state, connection_id, identity, text.as_str()).await;
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    drop(guard);
    state
        .metrics
        .open_connections
        .set(state.router.connection_count() as i64);

    info!(connection_id = %connection_id, identity = %identity, "websocket client disconnected");
}

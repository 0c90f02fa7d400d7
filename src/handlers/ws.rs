use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::jwt::verify_access_token;
use crate::models::log_entry::LogEntry;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// Frames pushed to the client.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame<'a> {
    Logs { logs: &'a [LogEntry] },
    Error { message: &'a str },
}

/// Live journal over a WebSocket. Browsers cannot set headers on the upgrade
/// request, so the access token comes in the `token` query parameter.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> Response {
    let user_id = match query
        .token
        .as_deref()
        .map(|t| verify_access_token(t, &state.config))
    {
        Some(Ok(claims)) => claims.sub,
        _ => {
            tracing::warn!("WebSocket auth failed");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.logs.list(user_id);

    tracing::debug!(user_id = %user_id, "WebSocket connection established");

    let mut send_task = tokio::spawn(async move {
        while let Some(snapshot) = subscription.next().await {
            let frame = match &snapshot {
                Ok(logs) => serde_json::to_string(&Frame::Logs { logs }),
                Err(_) => serde_json::to_string(&Frame::Error {
                    message: "Could not load logs. Retrying on the next change.",
                }),
            };
            let Ok(text) = frame else { continue };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        subscription.cancel();
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(user_id = %user_id, "WebSocket connection closed");
}

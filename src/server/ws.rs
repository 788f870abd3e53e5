// WebSocket binding for the real-time authenticator

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::AppState;
use crate::error::ApiError;
use crate::realtime::{ConnectionHandle, InboundEvent, Outbound, RealtimeAuthenticator};

/// `GET /realtime/*namespace` upgrade handler
pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    namespace: Option<Path<String>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(authenticator) = state.realtime.clone() else {
        return ApiError::service_unavailable("Real-time is not enabled").into_response();
    };

    let namespace = format!("/{}", namespace.map(|Path(ns)| ns).unwrap_or_default());
    ws.on_upgrade(move |socket| session(socket, authenticator, namespace, query))
}

async fn session(
    socket: WebSocket,
    authenticator: Arc<RealtimeAuthenticator>,
    namespace: String,
    query: HashMap<String, String>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<InboundEvent>();
    let id = handle.id();

    tracing::debug!("Real-time connection {} opened on {}", id, namespace);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            match message {
                Outbound::Event(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!("Failed to encode event '{}': {}", event.event, e);
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let reader = tokio::spawn(async move {
        while let Some(received) = ws_rx.next().await {
            let text = match received {
                Ok(Message::Text(text)) => text,
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => continue,
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!("WebSocket error on {}: {}", id, e);
                    break;
                }
            };

            match serde_json::from_str::<InboundEvent>(&text) {
                Ok(event) => {
                    if inbound_tx.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!("Dropping malformed frame on {}: {}", id, e),
            }
        }
    });

    let end = authenticator.serve(&namespace, query, handle.clone(), inbound_rx).await;

    // Observers hold handle clones; closing the writer releases them
    handle.disconnect();
    reader.abort();
    let _ = writer.await;

    tracing::debug!("Real-time connection {} ended: {:?}", id, end);
}

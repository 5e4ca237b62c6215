//! WebSocket change feed.
//!
//! Each connection gets its own bus subscription. The first message is the
//! catalog snapshot taken at subscribe time, every following message is one
//! change.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use swatchr_core::{CatalogSnapshot, Change};
use tracing::{debug, error, info, warn};

use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_FEED_DROPPED, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Message sent to feed clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage<'a> {
    /// Whole catalog at subscribe time.
    Snapshot(&'a CatalogSnapshot),
    /// One catalog change.
    Change(&'a Change),
    /// Sent before closing a feed the server could not keep up.
    Error { message: String },
}

impl WsMessage<'_> {
    fn type_label(&self) -> &'static str {
        match self {
            WsMessage::Snapshot(_) => "snapshot",
            WsMessage::Change(_) => "change",
            WsMessage::Error { .. } => "error",
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

fn encode(msg: &WsMessage<'_>) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => {
            WS_MESSAGES_SENT.with_label_values(&[msg.type_label()]).inc();
            Some(Message::Text(json.into()))
        }
        Err(e) => {
            error!("Failed to serialize WsMessage: {}", e);
            None
        }
    }
}

/// Handle a single WebSocket connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (snapshot, mut subscription) = match state.service().subscribe() {
        Ok(feed) => feed,
        Err(e) => {
            error!("Failed to subscribe WebSocket client: {}", e);
            let msg = WsMessage::Error {
                message: e.to_string(),
            };
            if let Some(msg) = encode(&msg) {
                let _ = sender.send(msg).await;
            }
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    let subscriber_id = subscription.id();
    info!(subscriber = %subscriber_id, "WebSocket client connected");

    // Forward the snapshot, then every change, to this client
    let mut send_task = tokio::spawn(async move {
        if let Some(msg) = encode(&WsMessage::Snapshot(&snapshot)) {
            if sender.send(msg).await.is_err() {
                return;
            }
        }
        drop(snapshot);

        loop {
            let Some(change) = subscription.recv().await else {
                // The bus dropped us because our queue overflowed
                warn!(subscriber = %subscriber_id, "Change feed closed, client fell behind");
                WS_FEED_DROPPED.inc();
                let msg = WsMessage::Error {
                    message: "change feed overflowed, resubscribe".to_string(),
                };
                if let Some(msg) = encode(&msg) {
                    let _ = sender.send(msg).await;
                }
                let _ = sender.send(Message::Close(None)).await;
                break;
            };

            let Some(msg) = encode(&WsMessage::Change(&change)) else {
                continue;
            };
            if sender.send(msg).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
        }
    });

    // Client messages are only watched for close
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    debug!("WebSocket client requested close");
                    break;
                }
                Ok(Message::Text(text)) => {
                    debug!("Received text message: {}", text);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    WS_CONNECTIONS_ACTIVE.dec();
    info!(subscriber = %subscriber_id, "WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use swatchr_core::{ChangeKind, EntityRecord, EntityState};

    fn record() -> EntityRecord {
        EntityRecord {
            key: "0".repeat(40),
            title: "Movie".to_string(),
            descriptor: String::new(),
            resolved_name: "movie.mkv".to_string(),
            storage_path: "/data/Movie".into(),
            size_bytes: 1536,
            state: EntityState::Active,
            added_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_snapshot_message_shape() {
        let snapshot = CatalogSnapshot {
            quota_bytes: 1000,
            used_bytes: 0,
            records: vec![record()],
        };
        let json = serde_json::to_value(WsMessage::Snapshot(&snapshot)).unwrap();

        assert_eq!(json["type"], "snapshot");
        assert_eq!(json["quota_bytes"], 1000);
        assert_eq!(json["records"][0]["state"], "active");
    }

    #[test]
    fn test_change_message_is_flat() {
        let change = Change::from_record(ChangeKind::ProgressUpdated, &record()).with_progress(50, Some(12));
        let json = serde_json::to_value(WsMessage::Change(&change)).unwrap();

        assert_eq!(json["type"], "change");
        assert_eq!(json["kind"], "progress_updated");
        assert_eq!(json["progress_percent"], 50);
        assert_eq!(json["eta_seconds"], 12);
        assert_eq!(json["size_formatted"], "1.5K");
        assert!(json.get("reason").is_none());
    }
}

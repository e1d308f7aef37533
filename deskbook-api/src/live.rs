//! WebSocket push channel for live desk availability.
//!
//! Frames are JSON text of the form `{"event": ..., "data": ...}`.
//!
//! **Client → Server**
//! - `filter_update`: data is a filter set (`location_ids`, `desk_type_ids`,
//!   `slot_type_ids`, `booking_date`); replaces this connection's filters
//! - `ping`: answered with `pong`
//!
//! **Server → Client**
//! - `desk_update`: data is the availability snapshot for this connection's
//!   filters, sent on connect, after every `filter_update` and whenever the
//!   broadcaster refreshes
//! - `error`: data is `{"message": ...}` for frames that could not be applied

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use deskbook_booking::BroadcastCoordinator;
use deskbook_core::{AvailabilitySnapshot, FilterPayload};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    FilterUpdate(FilterPayload),
    Ping,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerFrame<'a> {
    DeskUpdate(&'a AvailabilitySnapshot),
    Pong,
    Error { message: String },
}

impl ServerFrame<'_> {
    fn to_text(&self) -> Option<String> {
        serde_json::to_string(self)
            .map_err(|e| warn!("Failed to encode frame: {}", e))
            .ok()
    }
}

pub async fn live_updates(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    let capacity = state.broadcaster.settings().outbox_capacity.max(1);
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<Arc<AvailabilitySnapshot>>(capacity);
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(8);

    // Queues the initial snapshot before the writer starts.
    let viewer_id = state.broadcaster.connect(outbox_tx).await;
    info!("WebSocket connection established for viewer {}", viewer_id);

    let mut send_task = tokio::spawn(async move {
        loop {
            let text = tokio::select! {
                Some(snapshot) = outbox_rx.recv() => ServerFrame::DeskUpdate(&snapshot).to_text(),
                Some(reply) = reply_rx.recv() => Some(reply),
                else => break,
            };
            let Some(text) = text else { continue };
            if sender.send(Message::Text(text.into())).await.is_err() {
                debug!("Client went away mid-send");
                break;
            }
        }
    });

    let broadcaster = state.broadcaster.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    handle_frame(&broadcaster, viewer_id, text.as_str(), &reply_tx).await
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

    state.broadcaster.disconnect(viewer_id).await;
    info!("WebSocket connection closed for viewer {}", viewer_id);
}

async fn handle_frame(
    broadcaster: &BroadcastCoordinator,
    viewer_id: Uuid,
    text: &str,
    replies: &mpsc::Sender<String>,
) {
    let reply = match serde_json::from_str::<ClientFrame>(text) {
        Ok(ClientFrame::Ping) => ServerFrame::Pong.to_text(),
        Ok(ClientFrame::FilterUpdate(payload)) => match payload.validate() {
            Ok(filter) => match broadcaster.update_filter(viewer_id, filter).await {
                Ok(()) => None,
                Err(e) => ServerFrame::Error { message: e.to_string() }.to_text(),
            },
            Err(e) => {
                warn!("Viewer {} sent invalid filters: {}", viewer_id, e);
                ServerFrame::Error { message: e.to_string() }.to_text()
            }
        },
        Err(e) => {
            warn!("Viewer {} sent an unreadable frame: {}", viewer_id, e);
            ServerFrame::Error { message: format!("Unrecognized frame: {}", e) }.to_text()
        }
    };

    if let Some(reply) = reply {
        // A full reply queue means the client is not reading; drop it.
        let _ = replies.try_send(reply);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_client_frames() {
        let frame: ClientFrame = serde_json::from_str(
            r#"{"event": "filter_update", "data": {"desk_type_ids": ["1,2"], "booking_date": "2024-03-20"}}"#,
        )
        .unwrap();
        let ClientFrame::FilterUpdate(payload) = frame else {
            panic!("expected filter_update");
        };
        let filter = payload.validate().unwrap();
        assert_eq!(filter.desk_type_ids, vec![1, 2]);

        assert!(matches!(
            serde_json::from_str::<ClientFrame>(r#"{"event": "ping"}"#).unwrap(),
            ClientFrame::Ping
        ));
        assert!(serde_json::from_str::<ClientFrame>(r#"{"event": "subscribe"}"#).is_err());
    }

    #[test]
    fn test_server_frames() {
        let snapshot = AvailabilitySnapshot {
            booking_date: NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
            desks: Vec::new(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&ServerFrame::DeskUpdate(&snapshot).to_text().unwrap()).unwrap();
        assert_eq!(value["event"], "desk_update");
        assert_eq!(value["data"]["booking_date"], "2024-03-20");

        assert_eq!(ServerFrame::Pong.to_text().unwrap(), r#"{"event":"pong"}"#);
    }
}

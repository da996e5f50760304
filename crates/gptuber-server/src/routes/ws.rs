use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use gptuber_core::types::ChatMessage;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::state::AppState;

/// Frames the front end may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InboundFrame {
    Chat {
        message: String,
        #[serde(default)]
        author: String,
    },
}

/// Decode an inbound text frame into a chat message. Anything else is
/// logged and dropped.
pub fn parse_inbound(text: &str) -> Option<ChatMessage> {
    match serde_json::from_str::<InboundFrame>(text) {
        Ok(InboundFrame::Chat { message, author }) => {
            let chat = ChatMessage::new(author, message);
            if chat.is_well_formed() {
                Some(chat)
            } else {
                tracing::debug!("empty chat frame dropped");
                None
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "malformed frame from front end dropped");
            None
        }
    }
}

/// GET /ws: display messages out, chat in.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app))
}

async fn handle_socket(socket: WebSocket, app: AppState) {
    tracing::info!("front end connected");
    let (mut sender, mut receiver) = socket.split();

    let mut outbound = BroadcastStream::new(app.display_tx.subscribe());
    let mut send_task = tokio::spawn(async move {
        while let Some(item) = outbound.next().await {
            match item {
                Ok(json) => {
                    if let Err(e) = sender.send(Message::Text(json.into())).await {
                        tracing::warn!(error = %e, "failed to send display message");
                        break;
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "front end lagging, display messages skipped");
                }
            }
        }
    });

    let chat = app.chat.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    tracing::debug!(frame = %text.as_str(), "frame received");
                    if let Some(message) = parse_inbound(text.as_str()) {
                        chat.push(message);
                    }
                }
                Ok(Message::Binary(_)) => {
                    tracing::warn!("binary frame from front end ignored");
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "websocket error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("front end disconnected");
}

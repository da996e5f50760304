use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use gptuber_core::types::ChatMessage;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PostChatBody {
    #[serde(default)]
    pub author: String,
    pub message: String,
}

/// POST /api/chat: queue a chat message for the next report.
pub async fn post_chat(
    State(app): State<AppState>,
    Json(body): Json<PostChatBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let message = ChatMessage::new(body.author, body.message);
    if !message.is_well_formed() {
        return Err(AppError::bad_request("message must not be empty"));
    }
    app.chat.push(message);
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "accepted": true })),
    ))
}

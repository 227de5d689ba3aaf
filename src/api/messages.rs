//! Messages API endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::auth::Subject;
use crate::error::ApiError;
use crate::server::state::AppState;
use crate::services::{BoardError, Message};

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,
    #[validate(length(min = 1, max = 2000, message = "content must be 1 to 2000 characters"))]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub conversation_id: Option<Uuid>,
}

/// POST /api/messages - Send a message to a conversation
pub async fn send_message(
    State(state): State<AppState>,
    subject: Option<Extension<Subject>>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    request
        .validate()
        .map_err(|err| ApiError::InvalidRequest(err.to_string()))?;

    let sender = subject.map(|Extension(subject)| subject.username);
    let message = state
        .board
        .post_message(request.conversation_id, sender, request.content)
        .map_err(not_found)?;

    tracing::info!(
        message_id = %message.id,
        conversation_id = %message.conversation_id,
        sender = message.sender.as_deref().unwrap_or("Anonymous"),
        "Message stored"
    );

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/messages - List messages, optionally scoped to one conversation
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = match query.conversation_id {
        Some(conversation_id) => state.board.messages_in(conversation_id).map_err(not_found)?,
        None => state.board.all_messages(),
    };
    Ok(Json(messages))
}

fn not_found(err: BoardError) -> ApiError {
    match err {
        BoardError::ConversationNotFound(id) => {
            ApiError::NotFound(format!("Conversation {} not found", id))
        }
    }
}

//! Conversations API endpoints

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Deserialize;
use validator::Validate;

use crate::auth::Subject;
use crate::error::ApiError;
use crate::server::state::AppState;
use crate::services::Conversation;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateConversationRequest {
    #[validate(length(min = 1, max = 200, message = "title must be 1 to 200 characters"))]
    pub title: String,
    #[serde(default)]
    pub participants: Vec<String>,
}

/// POST /api/conversations - Create a conversation
pub async fn create_conversation(
    State(state): State<AppState>,
    subject: Option<Extension<Subject>>,
    Json(request): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    request
        .validate()
        .map_err(|err| ApiError::InvalidRequest(err.to_string()))?;

    let created_by = subject.map(|Extension(subject)| subject.username);
    let conversation =
        state
            .board
            .create_conversation(request.title, request.participants, created_by);

    tracing::info!(
        conversation_id = %conversation.id,
        participants = conversation.participants.len(),
        created_by = conversation.created_by.as_deref().unwrap_or("Anonymous"),
        "Conversation created"
    );

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// GET /api/conversations - List conversations, oldest first
pub async fn list_conversations(State(state): State<AppState>) -> Json<Vec<Conversation>> {
    Json(state.board.list_conversations())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_length_bounds() {
        let ok = CreateConversationRequest {
            title: "standup".to_string(),
            participants: vec!["bob".to_string()],
        };
        assert!(ok.validate().is_ok());

        let empty = CreateConversationRequest {
            title: String::new(),
            participants: Vec::new(),
        };
        assert!(empty.validate().is_err());

        let too_long = CreateConversationRequest {
            title: "x".repeat(201),
            participants: Vec::new(),
        };
        assert!(too_long.validate().is_err());
    }

    #[test]
    fn test_participants_default_to_empty() {
        let request: CreateConversationRequest =
            serde_json::from_str(r#"{"title": "standup"}"#).unwrap();
        assert!(request.participants.is_empty());
    }
}

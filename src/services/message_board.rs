//! In-memory conversation and message storage.
//!
//! State is process-local and lost on restart, mirroring the per-process
//! scope of the rate limiter. Conversations own their messages; message
//! order within a conversation is insertion order.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub participants: Vec<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender: Option<String>,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Shared message store.
#[derive(Debug, Default)]
pub struct MessageBoard {
    conversations: DashMap<Uuid, Conversation>,
    messages: DashMap<Uuid, Vec<Message>>,
}

impl MessageBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a conversation. The creator, when known, is always among the
    /// participants.
    pub fn create_conversation(
        &self,
        title: String,
        mut participants: Vec<String>,
        created_by: Option<String>,
    ) -> Conversation {
        if let Some(creator) = &created_by {
            if !participants.contains(creator) {
                participants.push(creator.clone());
            }
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            title,
            participants,
            created_by,
            created_at: Utc::now(),
        };
        self.conversations
            .insert(conversation.id, conversation.clone());
        self.messages.insert(conversation.id, Vec::new());
        conversation
    }

    /// All conversations, oldest first.
    pub fn list_conversations(&self) -> Vec<Conversation> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        conversations.sort_by_key(|conversation| (conversation.created_at, conversation.id));
        conversations
    }

    pub fn get_conversation(&self, id: Uuid) -> Option<Conversation> {
        self.conversations.get(&id).map(|entry| entry.value().clone())
    }

    /// Append a message to an existing conversation.
    ///
    /// The message list for a conversation is created together with the
    /// conversation, so a missing entry means the conversation itself does
    /// not exist.
    pub fn post_message(
        &self,
        conversation_id: Uuid,
        sender: Option<String>,
        content: String,
    ) -> Result<Message, BoardError> {
        let mut messages = self
            .messages
            .get_mut(&conversation_id)
            .ok_or(BoardError::ConversationNotFound(conversation_id))?;

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender,
            content,
            sent_at: Utc::now(),
        };
        messages.push(message.clone());
        Ok(message)
    }

    /// Messages of one conversation in send order.
    pub fn messages_in(&self, conversation_id: Uuid) -> Result<Vec<Message>, BoardError> {
        self.messages
            .get(&conversation_id)
            .map(|entry| entry.value().clone())
            .ok_or(BoardError::ConversationNotFound(conversation_id))
    }

    /// Every message across all conversations, oldest first.
    pub fn all_messages(&self) -> Vec<Message> {
        let mut all: Vec<Message> = self
            .messages
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|message| (message.sent_at, message.id));
        all
    }
}

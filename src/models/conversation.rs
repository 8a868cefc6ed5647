use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named, user-owned thread of turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: i32,
    pub user_id: i32,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConversationSummary {
    pub id: i32,
    pub name: String,
}

impl From<&Conversation> for ConversationSummary {
    fn from(conversation: &Conversation) -> Self {
        Self {
            id: conversation.id,
            name: conversation.name.clone(),
        }
    }
}

/// Name of a new conversation: the first `words` whitespace-delimited tokens
/// of its first message.
pub fn derive_conversation_name(body: &str, words: usize) -> String {
    body.split_whitespace()
        .take(words)
        .collect::<Vec<_>>()
        .join(" ")
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sender tag of every model-authored turn.
pub const MODEL_SENDER: &str = "AI";

/// One message within a conversation. Only `body` is ever mutated, while a
/// model answer is streaming in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Turn {
    pub id: i32,
    pub conversation_id: i32,
    pub user_id: i32,
    pub sender: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn is_model(&self) -> bool {
        self.sender == MODEL_SENDER
    }
}

/// Insert payload for a turn; ids and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTurn {
    pub conversation_id: i32,
    pub user_id: i32,
    pub sender: String,
    pub body: String,
}

impl NewTurn {
    pub fn new(conversation_id: i32, user_id: i32, sender: &str, body: &str) -> Self {
        Self {
            conversation_id,
            user_id,
            sender: sender.to_string(),
            body: body.to_string(),
        }
    }
}

use super::store::ChatStore;
use crate::errors::ChatError;
use crate::models::{NewTurn, Turn};
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: i64 = 5;

#[derive(Clone)]
pub struct TurnService {
    store: Arc<dyn ChatStore>,
}

impl TurnService {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, turn: &NewTurn) -> Result<Turn, ChatError> {
        Ok(self.store.insert_turn(turn).await?)
    }

    /// Replaces the body; `NotFound` when the turn no longer exists.
    pub async fn update_body(&self, id: i32, body: &str) -> Result<(), ChatError> {
        match self.store.update_turn_body(id, body).await? {
            0 => Err(ChatError::NotFound(format!("Turn {} not found", id))),
            _ => Ok(()),
        }
    }

    /// A page of turns, newest first. `limit <= 0` means the default page.
    pub async fn recent(
        &self,
        conversation_id: i32,
        before_id: i32,
        limit: i64,
    ) -> Result<Vec<Turn>, ChatError> {
        let limit = if limit <= 0 { DEFAULT_PAGE_SIZE } else { limit };
        Ok(self
            .store
            .recent_turns(conversation_id, before_id, limit)
            .await?)
    }
}

use crate::db;
use crate::models::{Conversation, ConversationSummary, NewTurn, Turn};
use sqlx::PgPool;

/// Conversation and turn persistence as seen by the chat services.
///
/// Production: `PgChatStore`. Tests: `mock::MemoryStore`.
#[async_trait::async_trait]
pub trait ChatStore: Send + Sync {
    async fn insert_conversation(
        &self,
        user_id: i32,
        name: &str,
    ) -> Result<Conversation, sqlx::Error>;

    async fn fetch_conversation(&self, id: i32) -> Result<Option<Conversation>, sqlx::Error>;

    async fn rename_conversation(
        &self,
        id: i32,
        name: &str,
    ) -> Result<Option<Conversation>, sqlx::Error>;

    /// Newest first.
    async fn conversation_summaries(
        &self,
        user_id: i32,
    ) -> Result<Vec<ConversationSummary>, sqlx::Error>;

    /// Removes the conversation and its turns. Returns the number of
    /// conversations removed.
    async fn delete_conversation(&self, id: i32, user_id: i32) -> Result<u64, sqlx::Error>;

    async fn delete_conversations_by_user(&self, user_id: i32) -> Result<u64, sqlx::Error>;

    async fn insert_turn(&self, turn: &NewTurn) -> Result<Turn, sqlx::Error>;

    async fn update_turn_body(&self, id: i32, body: &str) -> Result<u64, sqlx::Error>;

    /// Up to `limit` turns, descending by id; `before_id == 0` starts at the
    /// newest turn, otherwise only ids strictly lower than `before_id`.
    async fn recent_turns(
        &self,
        conversation_id: i32,
        before_id: i32,
        limit: i64,
    ) -> Result<Vec<Turn>, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgChatStore {
    pool: PgPool,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ChatStore for PgChatStore {
    async fn insert_conversation(
        &self,
        user_id: i32,
        name: &str,
    ) -> Result<Conversation, sqlx::Error> {
        db::conversation::insert(&self.pool, user_id, name).await
    }

    async fn fetch_conversation(&self, id: i32) -> Result<Option<Conversation>, sqlx::Error> {
        db::conversation::fetch(&self.pool, id).await
    }

    async fn rename_conversation(
        &self,
        id: i32,
        name: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        db::conversation::rename(&self.pool, id, name).await
    }

    async fn conversation_summaries(
        &self,
        user_id: i32,
    ) -> Result<Vec<ConversationSummary>, sqlx::Error> {
        db::conversation::summaries_by_user(&self.pool, user_id).await
    }

    async fn delete_conversation(&self, id: i32, user_id: i32) -> Result<u64, sqlx::Error> {
        db::conversation::delete(&self.pool, id, user_id).await
    }

    async fn delete_conversations_by_user(&self, user_id: i32) -> Result<u64, sqlx::Error> {
        db::conversation::delete_by_user(&self.pool, user_id).await
    }

    async fn insert_turn(&self, turn: &NewTurn) -> Result<Turn, sqlx::Error> {
        db::turn::insert(&self.pool, turn).await
    }

    async fn update_turn_body(&self, id: i32, body: &str) -> Result<u64, sqlx::Error> {
        db::turn::update_body(&self.pool, id, body).await
    }

    async fn recent_turns(
        &self,
        conversation_id: i32,
        before_id: i32,
        limit: i64,
    ) -> Result<Vec<Turn>, sqlx::Error> {
        db::turn::fetch_page(&self.pool, conversation_id, before_id, limit).await
    }
}

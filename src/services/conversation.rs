use super::store::ChatStore;
use crate::errors::ChatError;
use crate::models::{
    derive_conversation_name, Conversation, ConversationSummary, NewTurn, Turn,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ChatStore>,
    name_words: usize,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ChatStore>, name_words: usize) -> Self {
        Self { store, name_words }
    }

    /// Creates a conversation named after `body` together with its first
    /// turn. Two writes; if the second fails the empty conversation is
    /// removed again before the error is returned.
    #[tracing::instrument(name = "Start conversation.", skip(self, body), fields(body_len = body.len()))]
    pub async fn start(
        &self,
        user_id: i32,
        sender: &str,
        body: &str,
    ) -> Result<(Conversation, Turn), ChatError> {
        let name = derive_conversation_name(body, self.name_words);
        let conversation = self.store.insert_conversation(user_id, &name).await?;

        let first = NewTurn::new(conversation.id, user_id, sender, body);
        match self.store.insert_turn(&first).await {
            Ok(turn) => Ok((conversation, turn)),
            Err(err) => {
                tracing::error!("Failed to save first turn: {:?}", err);
                if let Err(cleanup) = self
                    .store
                    .delete_conversation(conversation.id, user_id)
                    .await
                {
                    tracing::error!("Failed to remove empty conversation: {:?}", cleanup);
                }
                Err(err.into())
            }
        }
    }

    pub async fn get(&self, id: i32) -> Result<Conversation, ChatError> {
        self.store
            .fetch_conversation(id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("Conversation {} not found", id)))
    }

    pub async fn summaries(&self, user_id: i32) -> Result<Vec<ConversationSummary>, ChatError> {
        Ok(self.store.conversation_summaries(user_id).await?)
    }

    /// The conversation, if `user_id` owns it.
    pub async fn owned(&self, id: i32, user_id: i32) -> Result<Conversation, ChatError> {
        let conversation = self.get(id).await?;
        if conversation.user_id != user_id {
            tracing::warn!(
                conversation_id = id,
                user_id,
                "user does not own the conversation"
            );
            return Err(ChatError::Authorization(format!(
                "Conversation {} does not belong to the user",
                id
            )));
        }
        Ok(conversation)
    }

    #[tracing::instrument(name = "Rename conversation.", skip(self, name))]
    pub async fn rename(
        &self,
        id: i32,
        user_id: i32,
        name: &str,
    ) -> Result<ConversationSummary, ChatError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ChatError::Validation("Name must not be empty".to_string()));
        }
        self.owned(id, user_id).await?;

        self.store
            .rename_conversation(id, name)
            .await?
            .map(|conversation| ConversationSummary::from(&conversation))
            .ok_or_else(|| ChatError::NotFound(format!("Conversation {} not found", id)))
    }

    /// Ownership is checked before anything is removed.
    #[tracing::instrument(name = "Delete conversation.", skip(self))]
    pub async fn delete(&self, id: i32, user_id: i32) -> Result<(), ChatError> {
        self.owned(id, user_id).await?;
        self.store.delete_conversation(id, user_id).await?;
        Ok(())
    }

    pub async fn delete_all(&self, user_id: i32) -> Result<u64, ChatError> {
        Ok(self.store.delete_conversations_by_user(user_id).await?)
    }
}

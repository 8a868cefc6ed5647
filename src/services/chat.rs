use super::completion::CompletionClient;
use super::conversation::ConversationService;
use super::relay::{Fragment, FragmentSink, Relay, RelayOutcome, RelayRequest};
use super::store::ChatStore;
use super::turn::TurnService;
use crate::configuration::RelaySettings;
use crate::errors::ChatError;
use crate::models::{ConversationSummary, NewTurn, Turn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const RELAY_CHANNEL_CAPACITY: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Fragment(Fragment),
    Complete(RelayOutcome),
}

/// Events of one relay; ends after `Complete` or the first error.
pub type RelayStream = ReceiverStream<Result<RelayEvent, ChatError>>;

/// Chat operations exposed to the transport layer.
#[derive(Clone)]
pub struct ChatService {
    conversations: ConversationService,
    turns: TurnService,
    relay: Arc<Relay>,
}

struct ChannelSink {
    tx: mpsc::Sender<Result<RelayEvent, ChatError>>,
}

#[async_trait::async_trait]
impl FragmentSink for ChannelSink {
    async fn push(&mut self, fragment: Fragment) -> Result<(), ChatError> {
        self.tx
            .send(Ok(RelayEvent::Fragment(fragment)))
            .await
            .map_err(|_| ChatError::Stream("Fragment receiver closed".to_string()))
    }
}

impl ChatService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        completion: Arc<dyn CompletionClient>,
        settings: &RelaySettings,
    ) -> Self {
        let conversations = ConversationService::new(store.clone(), settings.name_words);
        let turns = TurnService::new(store);
        let relay = Relay::new(conversations.clone(), turns.clone(), completion, settings);

        Self::from_parts(conversations, turns, relay)
    }

    pub fn from_parts(conversations: ConversationService, turns: TurnService, relay: Relay) -> Self {
        Self {
            conversations,
            turns,
            relay: Arc::new(relay),
        }
    }

    /// Stores a turn without generating an answer. `conversation_id == 0`
    /// starts a new conversation and returns its first turn.
    pub async fn create_message(
        &self,
        conversation_id: i32,
        sender: &str,
        body: &str,
        user_id: i32,
    ) -> Result<Turn, ChatError> {
        if conversation_id == 0 {
            let (_, turn) = self.conversations.start(user_id, sender, body).await?;
            return Ok(turn);
        }
        self.turns
            .create(&NewTurn::new(conversation_id, user_id, sender, body))
            .await
    }

    /// Starts a relay on its own task and returns its events.
    pub fn stream_messages(&self, request: RelayRequest) -> RelayStream {
        let (tx, rx) = mpsc::channel(RELAY_CHANNEL_CAPACITY);
        let relay = self.relay.clone();

        tokio::spawn(async move {
            let mut sink = ChannelSink { tx: tx.clone() };
            let event = relay.run(request, &mut sink).await.map(RelayEvent::Complete);
            if let Err(err) = &event {
                tracing::warn!("relay ended with error: {}", err);
            }
            if tx.send(event).await.is_err() {
                tracing::debug!("relay receiver dropped before completion");
            }
        });

        ReceiverStream::new(rx)
    }

    /// `Authorization` unless `user_id` owns the conversation.
    pub async fn ensure_owner(&self, conversation_id: i32, user_id: i32) -> Result<(), ChatError> {
        self.conversations.owned(conversation_id, user_id).await?;
        Ok(())
    }

    pub async fn get_recent_messages(
        &self,
        conversation_id: i32,
        before_id: i32,
        limit: i64,
    ) -> Result<Vec<Turn>, ChatError> {
        self.turns.recent(conversation_id, before_id, limit).await
    }

    pub async fn get_conversation_summaries(
        &self,
        user_id: i32,
    ) -> Result<Vec<ConversationSummary>, ChatError> {
        self.conversations.summaries(user_id).await
    }

    pub async fn delete_conversation(&self, id: i32, user_id: i32) -> Result<(), ChatError> {
        self.conversations.delete(id, user_id).await
    }

    pub async fn delete_all_conversations(&self, user_id: i32) -> Result<u64, ChatError> {
        self.conversations.delete_all(user_id).await
    }

    pub async fn rename_conversation(
        &self,
        id: i32,
        user_id: i32,
        name: &str,
    ) -> Result<ConversationSummary, ChatError> {
        self.conversations.rename(id, user_id, name).await
    }
}

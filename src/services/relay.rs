use super::completion::{ChatMessage, CompletionClient};
use super::conversation::ConversationService;
use super::turn::TurnService;
use super::turn_writer::TurnWriter;
use crate::configuration::RelaySettings;
use crate::errors::ChatError;
use crate::models::{NewTurn, Turn, MODEL_SENDER};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const SYSTEM_PREAMBLE: &str = "You are Bible Dive, a friendly and knowledgeable guide to the Bible. \
Answer questions about scripture, its history and its teaching clearly and respectfully, \
citing book, chapter and verse where it helps.";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RelayRequest {
    /// 0 starts a new conversation.
    pub conversation_id: i32,
    pub sender: String,
    pub body: String,
    pub user_id: i32,
}

/// One forwarded piece of a model answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    /// 0 when the model turn could not be stored yet.
    pub turn_id: i32,
    pub conversation_id: i32,
    pub sender: String,
    pub body_fragment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayOutcome {
    pub conversation_id: i32,
    pub turn_id: i32,
    #[serde(skip)]
    pub fragments: usize,
}

/// Receiving end of a relay, usually the client connection.
#[async_trait::async_trait]
pub trait FragmentSink: Send {
    async fn push(&mut self, fragment: Fragment) -> Result<(), ChatError>;
}

/// Bridges a user message to the streaming completion and back, storing
/// the conversation as it goes.
pub struct Relay {
    conversations: ConversationService,
    turns: TurnService,
    completion: Arc<dyn CompletionClient>,
    history_limit: i64,
    persist_retries: u32,
    deadline: Duration,
}

impl Relay {
    pub fn new(
        conversations: ConversationService,
        turns: TurnService,
        completion: Arc<dyn CompletionClient>,
        settings: &RelaySettings,
    ) -> Self {
        Self {
            conversations,
            turns,
            completion,
            history_limit: settings.history_limit,
            persist_retries: settings.persist_retries,
            deadline: Duration::from_secs(settings.deadline_secs),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Runs the relay under its deadline. Fragments already pushed or stored
    /// when the deadline hits are kept.
    #[tracing::instrument(
        name = "Relay message.",
        skip(self, request, sink),
        fields(
            conversation_id = request.conversation_id,
            user_id = request.user_id,
            body_len = request.body.len()
        )
    )]
    pub async fn run<S: FragmentSink>(
        &self,
        request: RelayRequest,
        sink: &mut S,
    ) -> Result<RelayOutcome, ChatError> {
        match tokio::time::timeout(self.deadline, self.relay(request, sink)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("relay deadline of {:?} exceeded", self.deadline);
                Err(ChatError::Timeout(self.deadline))
            }
        }
    }

    async fn relay<S: FragmentSink>(
        &self,
        request: RelayRequest,
        sink: &mut S,
    ) -> Result<RelayOutcome, ChatError> {
        let (conversation_id, history) = if request.conversation_id == 0 {
            let (conversation, _first) = self
                .conversations
                .start(request.user_id, &request.sender, &request.body)
                .await?;
            tracing::info!(conversation_id = conversation.id, "conversation started");
            (conversation.id, Vec::new())
        } else {
            let conversation_id = request.conversation_id;
            let turn = NewTurn::new(
                conversation_id,
                request.user_id,
                &request.sender,
                &request.body,
            );
            // generation goes ahead even when the user turn is lost
            let before_id = match self.turns.create(&turn).await {
                Ok(saved) => saved.id,
                Err(err) => {
                    tracing::error!("Failed to save user turn: {}", err);
                    0
                }
            };
            (conversation_id, self.history(conversation_id, before_id).await)
        };

        let messages = build_messages(&history, &request.body);
        let mut stream = self.completion.stream_chat(messages).await?;

        let mut writer = TurnWriter::new(
            self.turns.clone(),
            conversation_id,
            request.user_id,
            self.persist_retries,
        );
        let mut fragments = 0;

        while let Some(item) = stream.next().await {
            let piece = match item {
                Ok(piece) => piece,
                Err(err) => {
                    tracing::error!(fragments, "completion stream failed: {}", err);
                    writer.finish().await;
                    return Err(err);
                }
            };

            let turn_id = writer.write(&piece).await;
            let pushed = sink
                .push(Fragment {
                    turn_id,
                    conversation_id,
                    sender: MODEL_SENDER.to_string(),
                    body_fragment: piece,
                })
                .await;
            if let Err(err) = pushed {
                tracing::warn!(fragments, "fragment receiver closed: {}", err);
                writer.finish().await;
                return Err(err);
            }
            fragments += 1;
        }

        let turn_id = writer.finish().await;
        tracing::info!(conversation_id, turn_id, fragments, "relay complete");

        Ok(RelayOutcome {
            conversation_id,
            turn_id,
            fragments,
        })
    }

    /// Recent turns before `before_id`, oldest first. Read failures only
    /// shrink the context.
    async fn history(&self, conversation_id: i32, before_id: i32) -> Vec<Turn> {
        match self
            .turns
            .recent(conversation_id, before_id, self.history_limit)
            .await
        {
            Ok(mut turns) => {
                turns.reverse();
                turns
            }
            Err(err) => {
                tracing::error!("Failed to load conversation history: {}", err);
                Vec::new()
            }
        }
    }
}

/// Preamble, then history mapped to roles, then the new message.
pub fn build_messages(history: &[Turn], body: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(SYSTEM_PREAMBLE));
    messages.extend(history.iter().map(|turn| {
        if turn.is_model() {
            ChatMessage::assistant(turn.body.clone())
        } else {
            ChatMessage::user(turn.body.clone())
        }
    }));
    messages.push(ChatMessage::user(body));
    messages
}

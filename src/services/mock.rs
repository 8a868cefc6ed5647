//! In-memory doubles for the store and completion seams.

use super::completion::{ChatMessage, CompletionClient, FragmentStream, FunctionSpec};
use super::store::ChatStore;
use crate::errors::ChatError;
use crate::models::{Conversation, ConversationSummary, NewTurn, Turn};
use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct Tables {
    conversations: Vec<Conversation>,
    turns: Vec<Turn>,
    next_conversation_id: i32,
    next_turn_id: i32,
}

/// `ChatStore` over two vectors. Failure switches make individual
/// operations return `PoolTimedOut`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    turn_inserts: AtomicUsize,
    body_updates: AtomicUsize,
    conversation_inserts: AtomicUsize,
    failing_turn_inserts: AtomicUsize,
    failing_body_updates: AtomicUsize,
    fail_reads: AtomicBool,
}

fn take_failure(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` turn inserts fail.
    pub fn fail_turn_inserts(&self, n: usize) {
        self.failing_turn_inserts.store(n, Ordering::SeqCst);
    }

    /// The next `n` body updates fail.
    pub fn fail_body_updates(&self, n: usize) {
        self.failing_body_updates.store(n, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Successful turn inserts.
    pub fn turn_inserts(&self) -> usize {
        self.turn_inserts.load(Ordering::SeqCst)
    }

    /// Successful body updates.
    pub fn body_updates(&self) -> usize {
        self.body_updates.load(Ordering::SeqCst)
    }

    pub fn conversation_inserts(&self) -> usize {
        self.conversation_inserts.load(Ordering::SeqCst)
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.tables.lock().unwrap().conversations.clone()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.tables.lock().unwrap().turns.clone()
    }

    pub fn turn(&self, id: i32) -> Option<Turn> {
        self.turns().into_iter().find(|turn| turn.id == id)
    }

    fn check_read(&self) -> Result<(), sqlx::Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChatStore for MemoryStore {
    async fn insert_conversation(
        &self,
        user_id: i32,
        name: &str,
    ) -> Result<Conversation, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        tables.next_conversation_id += 1;
        let conversation = Conversation {
            id: tables.next_conversation_id,
            user_id,
            name: name.to_string(),
            created_at: chrono::Utc::now(),
        };
        tables.conversations.push(conversation.clone());
        self.conversation_inserts.fetch_add(1, Ordering::SeqCst);
        Ok(conversation)
    }

    async fn fetch_conversation(&self, id: i32) -> Result<Option<Conversation>, sqlx::Error> {
        self.check_read()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn rename_conversation(
        &self,
        id: i32,
        name: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        Ok(tables
            .conversations
            .iter_mut()
            .find(|c| c.id == id)
            .map(|c| {
                c.name = name.to_string();
                c.clone()
            }))
    }

    async fn conversation_summaries(
        &self,
        user_id: i32,
    ) -> Result<Vec<ConversationSummary>, sqlx::Error> {
        self.check_read()?;
        let tables = self.tables.lock().unwrap();
        let mut summaries: Vec<ConversationSummary> = tables
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(ConversationSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(summaries)
    }

    async fn delete_conversation(&self, id: i32, user_id: i32) -> Result<u64, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.conversations.len();
        tables
            .conversations
            .retain(|c| !(c.id == id && c.user_id == user_id));
        let removed = (before - tables.conversations.len()) as u64;
        if removed > 0 {
            tables.turns.retain(|t| t.conversation_id != id);
        }
        Ok(removed)
    }

    async fn delete_conversations_by_user(&self, user_id: i32) -> Result<u64, sqlx::Error> {
        let mut tables = self.tables.lock().unwrap();
        let ids: Vec<i32> = tables
            .conversations
            .iter()
            .filter(|c| c.user_id == user_id)
            .map(|c| c.id)
            .collect();
        tables.conversations.retain(|c| c.user_id != user_id);
        tables.turns.retain(|t| !ids.contains(&t.conversation_id));
        Ok(ids.len() as u64)
    }

    async fn insert_turn(&self, turn: &NewTurn) -> Result<Turn, sqlx::Error> {
        if take_failure(&self.failing_turn_inserts) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut tables = self.tables.lock().unwrap();
        if !tables
            .conversations
            .iter()
            .any(|c| c.id == turn.conversation_id)
        {
            return Err(sqlx::Error::RowNotFound);
        }
        tables.next_turn_id += 1;
        let saved = Turn {
            id: tables.next_turn_id,
            conversation_id: turn.conversation_id,
            user_id: turn.user_id,
            sender: turn.sender.clone(),
            body: turn.body.clone(),
            created_at: chrono::Utc::now(),
        };
        tables.turns.push(saved.clone());
        self.turn_inserts.fetch_add(1, Ordering::SeqCst);
        Ok(saved)
    }

    async fn update_turn_body(&self, id: i32, body: &str) -> Result<u64, sqlx::Error> {
        if take_failure(&self.failing_body_updates) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let mut tables = self.tables.lock().unwrap();
        match tables.turns.iter_mut().find(|t| t.id == id) {
            Some(turn) => {
                turn.body = body.to_string();
                self.body_updates.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn recent_turns(
        &self,
        conversation_id: i32,
        before_id: i32,
        limit: i64,
    ) -> Result<Vec<Turn>, sqlx::Error> {
        self.check_read()?;
        let tables = self.tables.lock().unwrap();
        let mut turns: Vec<Turn> = tables
            .turns
            .iter()
            .filter(|t| t.conversation_id == conversation_id)
            .filter(|t| before_id == 0 || t.id < before_id)
            .cloned()
            .collect();
        turns.sort_by(|a, b| b.id.cmp(&a.id));
        turns.truncate(limit.max(0) as usize);
        Ok(turns)
    }
}

/// One step of a scripted completion stream.
#[derive(Debug, Clone)]
pub enum Step {
    Fragment(String),
    /// Mid-stream failure.
    Fail(String),
    /// Never yields again.
    Hang,
}

/// `CompletionClient` that replays a fixed script and records the messages
/// it was called with.
#[derive(Default)]
pub struct ScriptedCompletion {
    steps: Vec<Step>,
    connect_error: Option<String>,
    fragment_delay: Option<Duration>,
    reply: String,
    structured: Vec<Value>,
    structured_calls: AtomicUsize,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn fragments(fragments: &[&str]) -> Self {
        Self {
            steps: fragments
                .iter()
                .map(|f| Step::Fragment(f.to_string()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn steps(steps: Vec<Step>) -> Self {
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn unreachable(message: &str) -> Self {
        Self {
            connect_error: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Answer of `complete_chat` and `quick_response`.
    pub fn with_reply(mut self, reply: &str) -> Self {
        self.reply = reply.to_string();
        self
    }

    /// Arguments returned by successive `complete_structured` calls.
    pub fn with_structured(mut self, values: Vec<Value>) -> Self {
        self.structured = values;
        self
    }

    pub fn with_fragment_delay(mut self, delay: Duration) -> Self {
        self.fragment_delay = Some(delay);
        self
    }

    /// Message lists passed to `stream_chat` and `complete_chat`.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap().clone()
    }

    /// Prompts passed to `quick_response` and `complete_structured`.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CompletionClient for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn quick_response(&self, prompt: &str) -> Result<String, ChatError> {
        if let Some(message) = &self.connect_error {
            return Err(ChatError::Upstream(message.clone()));
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }

    async fn complete_chat(&self, messages: &[ChatMessage]) -> Result<String, ChatError> {
        if let Some(message) = &self.connect_error {
            return Err(ChatError::Upstream(message.clone()));
        }
        self.calls.lock().unwrap().push(messages.to_vec());
        Ok(self.reply.clone())
    }

    async fn stream_chat(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream, ChatError> {
        if let Some(message) = &self.connect_error {
            return Err(ChatError::Upstream(message.clone()));
        }
        self.calls.lock().unwrap().push(messages);

        let delay = self.fragment_delay;
        let stream = futures::stream::unfold(self.steps.clone().into_iter(), move |mut steps| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match steps.next()? {
                Step::Fragment(text) => Some((Ok(text), steps)),
                Step::Fail(message) => Some((Err(ChatError::Stream(message)), steps)),
                Step::Hang => {
                    futures::future::pending::<()>().await;
                    None
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn complete_structured(
        &self,
        prompt: &str,
        function: &FunctionSpec,
    ) -> Result<Value, ChatError> {
        if let Some(message) = &self.connect_error {
            return Err(ChatError::Upstream(message.clone()));
        }
        self.prompts.lock().unwrap().push(prompt.to_string());
        let index = self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.structured.get(index).cloned().ok_or_else(|| {
            ChatError::Upstream(format!("No scripted {} arguments", function.name))
        })
    }
}

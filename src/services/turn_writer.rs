use super::turn::TurnService;
use crate::models::{NewTurn, MODEL_SENDER};

/// Persists one streamed model turn.
///
/// Every write stores the full body accumulated so far: the first write
/// inserts the turn, later ones replace its body. A failed write is parked
/// in a single slot; since writes are full replaces only the latest body
/// matters, so the next write (or `finish`) supersedes it. After
/// `max_attempts` consecutive failures the parked write is dropped.
pub struct TurnWriter {
    turns: TurnService,
    conversation_id: i32,
    user_id: i32,
    body: String,
    turn_id: i32,
    parked: Option<u32>,
    max_attempts: u32,
}

impl TurnWriter {
    pub fn new(turns: TurnService, conversation_id: i32, user_id: i32, max_attempts: u32) -> Self {
        Self {
            turns,
            conversation_id,
            user_id,
            body: String::new(),
            turn_id: 0,
            parked: None,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Appends `fragment` and persists the whole body. Never fails; returns
    /// the turn id to tag the fragment with.
    pub async fn write(&mut self, fragment: &str) -> i32 {
        self.body.push_str(fragment);
        self.persist().await;
        self.turn_id
    }

    /// Retries a parked write once more and returns the final turn id.
    pub async fn finish(mut self) -> i32 {
        if self.parked.is_some() {
            self.persist().await;
            if let Some(attempts) = self.parked {
                tracing::error!(
                    conversation_id = self.conversation_id,
                    turn_id = self.turn_id,
                    attempts,
                    body_len = self.body.len(),
                    "dropping model turn write after stream end"
                );
            }
        }
        self.turn_id
    }

    async fn persist(&mut self) {
        let result = if self.turn_id == 0 {
            let turn = NewTurn::new(self.conversation_id, self.user_id, MODEL_SENDER, &self.body);
            self.turns.create(&turn).await.map(|saved| {
                self.turn_id = saved.id;
            })
        } else {
            self.turns.update_body(self.turn_id, &self.body).await
        };

        match result {
            Ok(()) => {
                if let Some(attempts) = self.parked.take() {
                    tracing::info!(
                        turn_id = self.turn_id,
                        attempts,
                        "parked model turn write recovered"
                    );
                }
            }
            Err(err) => {
                let attempts = self.parked.map_or(1, |n| n + 1);
                tracing::warn!(
                    conversation_id = self.conversation_id,
                    turn_id = self.turn_id,
                    attempts,
                    "model turn write failed: {}",
                    err
                );
                if attempts >= self.max_attempts {
                    tracing::error!(
                        conversation_id = self.conversation_id,
                        turn_id = self.turn_id,
                        body_len = self.body.len(),
                        "dropping model turn write after {} attempts",
                        attempts
                    );
                    self.parked = None;
                } else {
                    self.parked = Some(attempts);
                }
            }
        }
    }
}

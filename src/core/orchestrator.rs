//! Turn orchestration
//!
//! For every user message the [`Orchestrator`]:
//! 1. Appends the message to the session's conversation and persists it
//! 2. Classifies it as a deal query or ordinary dialogue
//! 3. Fetches deals for the extracted facets, or asks the dialogue engine
//! 4. Appends and persists the assistant reply
//!
//! A session runs one turn at a time; a message arriving mid-turn is refused.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::catalog::DealCatalog;
use crate::conversation::{Greeting, Message};

use super::classifier::{DealQueryIntent, IntentClassifier};
use super::dialogue::{DialogueEngine, DialogueError};
use super::inflight::InFlight;
use super::memory::{ConversationStore, StoreError};

/// Maximum accepted message length in characters
const MAX_MESSAGE_LENGTH: usize = 2000;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),

    #[error("A message for this session is still being processed")]
    Busy,

    #[error("Assistant unavailable: {0}")]
    Dialogue(#[from] DialogueError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Which downstream produced the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Deals,
    Dialogue,
}

pub struct Orchestrator {
    classifier: Arc<dyn IntentClassifier>,
    catalog: Arc<dyn DealCatalog>,
    dialogue: DialogueEngine,
    store: Arc<dyn ConversationStore>,
    store_name: String,
    greeting_cooldown: Duration,
    turns: InFlight<String>,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        catalog: Arc<dyn DealCatalog>,
        dialogue: DialogueEngine,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            classifier,
            catalog,
            dialogue,
            store,
            store_name: "Daddy's Deals".to_string(),
            greeting_cooldown: Duration::hours(1),
            turns: InFlight::new(),
        }
    }

    pub fn with_store_name(mut self, name: impl Into<String>) -> Self {
        self.store_name = name.into();
        self
    }

    pub fn with_greeting_cooldown(mut self, cooldown: Duration) -> Self {
        self.greeting_cooldown = cooldown;
        self
    }

    /// Load a session's conversation, starting it with a greeting when empty
    pub async fn open_session(&self, session: &str) -> Result<Vec<Message>, StoreError> {
        self.open_session_at(session, Utc::now()).await
    }

    pub async fn open_session_at(&self, session: &str, now: DateTime<Utc>) -> Result<Vec<Message>, StoreError> {
        let history = self.store.load(session).await?;
        if !history.is_empty() {
            return Ok(history);
        }
        self.start_over(session, now).await
    }

    /// Wipe a session's history and start over with a fresh greeting
    pub async fn clear_session(&self, session: &str) -> Result<Vec<Message>, TurnError> {
        self.clear_session_at(session, Utc::now()).await
    }

    pub async fn clear_session_at(&self, session: &str, now: DateTime<Utc>) -> Result<Vec<Message>, TurnError> {
        let _turn = self.turns.try_acquire(session.to_string()).ok_or(TurnError::Busy)?;

        let history = self.start_over(session, now).await?;
        tracing::info!(session, "🧹 Conversation cleared");
        Ok(history)
    }

    /// Replace the whole history with a single greeting in one `save`
    async fn start_over(&self, session: &str, now: DateTime<Utc>) -> Result<Vec<Message>, StoreError> {
        let last_visit = self.store.last_visit(session).await?;
        let greeting = Greeting::for_visit(now, last_visit, self.greeting_cooldown);
        tracing::debug!(session, ?greeting, "Starting conversation");

        let history = vec![greeting.message(&self.store_name)];
        self.store.save(session, &history).await?;
        self.store.record_visit(session, now).await?;
        Ok(history)
    }

    /// Append an assistant notice to a session outside a regular turn
    pub async fn append_notice(&self, session: &str, content: impl Into<String>) -> Result<Message, TurnError> {
        let _turn = self.turns.try_acquire(session.to_string()).ok_or(TurnError::Busy)?;

        let mut conversation = self.open_session(session).await?;
        let notice = Message::assistant(content);
        conversation.push(notice.clone());
        self.store.save(session, &conversation).await?;
        Ok(notice)
    }

    /// Run one turn and return the assistant's reply
    pub async fn handle_turn(&self, session: &str, text: &str) -> Result<Message, TurnError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyMessage);
        }
        if text.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(TurnError::MessageTooLong(MAX_MESSAGE_LENGTH));
        }

        let _turn = self.turns.try_acquire(session.to_string()).ok_or(TurnError::Busy)?;

        let mut conversation = self.open_session(session).await?;
        let prior_len = conversation.len();
        conversation.push(Message::user(text));
        self.store.save(session, &conversation).await?;

        let intent = match self.classifier.classify(text).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(session, error = %e, "Classification failed, treating as dialogue");
                DealQueryIntent::default()
            }
        };

        let route = if intent.is_deal_query { Route::Deals } else { Route::Dialogue };
        tracing::debug!(session, ?route, category = ?intent.category, location = ?intent.location, "Routing turn");

        let reply = match route {
            Route::Deals => {
                let deals = self.catalog.fetch_deals(&intent.tags()).await;
                tracing::info!(session, deal_count = deals.len(), "Answered with deals");
                Message::deal_list(intent.lead_in(), deals)
            }
            Route::Dialogue => {
                let content = self.dialogue.reply(text, &conversation[..prior_len]).await?;
                Message::assistant(content)
            }
        };

        conversation.push(reply.clone());
        self.store.save(session, &conversation).await?;

        Ok(reply)
    }
}

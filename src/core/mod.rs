//! Core conversation components
//!
//! Intent classification, dialogue, history storage and the orchestrator
//! that routes each turn between them.

mod classifier;
mod dialogue;
mod inflight;
mod memory;
mod orchestrator;

pub use classifier::LlmIntentClassifier;
pub use dialogue::DialogueEngine;
pub use inflight::InFlight;
pub use memory::{ConversationStore, InMemoryConversationStore, SqliteConversationStore, StoreError};
pub use orchestrator::{Orchestrator, TurnError};

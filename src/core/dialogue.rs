//! Free-form dialogue with the store assistant persona

use std::sync::Arc;

use crate::conversation::Message;
use crate::providers::{CompletionBackend, CompletionRequest, PromptMessage, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Assistant returned an empty reply")]
    EmptyReply,
}

pub struct DialogueEngine {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    temperature: Option<f32>,
    persona: String,
}

impl DialogueEngine {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: impl Into<String>, persona: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            temperature: None,
            persona: persona.into(),
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Produce the assistant's reply to `message` given the prior `history`.
    ///
    /// `history` must not already contain `message`.
    pub async fn reply(&self, message: &str, history: &[Message]) -> Result<String, DialogueError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(PromptMessage::system(self.persona.clone()));
        messages.extend(history.iter().map(PromptMessage::from));
        messages.push(PromptMessage::user(message));

        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
        };

        let reply = self.backend.complete(&request).await?;
        if reply.trim().is_empty() {
            return Err(DialogueError::EmptyReply);
        }

        Ok(reply)
    }
}

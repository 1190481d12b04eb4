//! Generative-text backend integrations

mod ollama;
mod openai_compat;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, LlmSettings};
use crate::conversation::{Message, Role};

pub use ollama::OllamaProvider;
pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

/// One role-tagged entry of a prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
        }
    }
}

impl From<&Message> for PromptMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: match msg.role {
                Role::User => PromptRole::User,
                Role::Assistant => PromptRole::Assistant,
            },
            content: msg.content.clone(),
        }
    }
}

/// A single-completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<PromptMessage>,
    pub temperature: Option<f32>,
}

/// Anything that can turn a prompt into one completion's text
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}

pub enum Provider {
    OpenAI(OpenAICompatProvider),
    Ollama(OllamaProvider),
}

impl Provider {
    pub fn from_settings(settings: &LlmSettings, config: &Config, timeout: Duration) -> Result<Self, ProviderError> {
        match settings.provider.to_lowercase().as_str() {
            "openai" => {
                let mut compat = OpenAICompatConfig::openai(config.openai_api_key.clone());
                if let Some(ref base_url) = settings.base_url {
                    compat.base_url = base_url.clone();
                }
                compat.timeout = timeout;
                Ok(Provider::OpenAI(OpenAICompatProvider::new(compat)?))
            }
            "openai-compatible" | "local" => {
                let base_url = settings
                    .base_url
                    .clone()
                    .ok_or_else(|| ProviderError::NotConfigured("llm.base_url is required for a local server".into()))?;
                let mut compat = OpenAICompatConfig::local(base_url);
                compat.api_key = config.openai_api_key.clone();
                compat.timeout = timeout;
                Ok(Provider::OpenAI(OpenAICompatProvider::new(compat)?))
            }
            "ollama" => {
                let url = settings
                    .base_url
                    .clone()
                    .or_else(|| config.ollama_url.clone())
                    .unwrap_or_else(|| "http://localhost:11434".into());
                Ok(Provider::Ollama(OllamaProvider::new(url, timeout)?))
            }
            other => Err(ProviderError::UnknownProvider(other.to_string())),
        }
    }
}

#[async_trait]
impl CompletionBackend for Provider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        match self {
            Provider::OpenAI(p) => p.complete(request).await,
            Provider::Ollama(p) => p.complete(request).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Backend that replays canned completions and records every request
    pub(crate) struct ScriptedBackend {
        replies: Mutex<VecDeque<Result<String, String>>>,
        pub requests: Mutex<Vec<CompletionRequest>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedBackend {
        pub(crate) fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                requests: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            match self.replies.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err(e)) => Err(ProviderError::InvalidResponse(e)),
                None => Err(ProviderError::InvalidResponse("no scripted reply".into())),
            }
        }
    }

    /// OpenAI-compatible provider whose server answers only after `delay`
    pub(crate) async fn slow_provider(delay: Duration, timeout: Duration) -> OpenAICompatProvider {
        use axum::{routing::post, Json, Router};

        let router = Router::new().route(
            "/chat/completions",
            post(move || async move {
                tokio::time::sleep(delay).await;
                Json(serde_json::json!({"choices": [{"message": {"content": "late"}}]}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let config = OpenAICompatConfig {
            timeout,
            ..OpenAICompatConfig::local(format!("http://{}", addr))
        };
        OpenAICompatProvider::new(config).unwrap()
    }

    #[test]
    fn test_prompt_message_from_conversation() {
        let msg = Message::assistant("Hi there");
        let prompt = PromptMessage::from(&msg);
        assert_eq!(prompt.role, PromptRole::Assistant);
        assert_eq!(prompt.content, "Hi there");

        let json = serde_json::to_value(PromptMessage::system("rules")).unwrap();
        assert_eq!(json["role"], "system");
    }

    #[test]
    fn test_unknown_provider() {
        let settings = LlmSettings {
            provider: "anthropic".into(),
            ..LlmSettings::default()
        };
        let config = Config::for_tests();
        let result = Provider::from_settings(&settings, &config, Duration::from_secs(5));
        assert!(matches!(result, Err(ProviderError::UnknownProvider(_))));
    }

    #[test]
    fn test_local_provider_requires_base_url() {
        let settings = LlmSettings {
            provider: "local".into(),
            ..LlmSettings::default()
        };
        let result = Provider::from_settings(&settings, &Config::for_tests(), Duration::from_secs(5));
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));

        let settings = LlmSettings {
            provider: "local".into(),
            base_url: Some("http://localhost:8000/v1".into()),
            ..LlmSettings::default()
        };
        let result = Provider::from_settings(&settings, &Config::for_tests(), Duration::from_secs(5));
        assert!(matches!(result, Ok(Provider::OpenAI(_))));
    }
}

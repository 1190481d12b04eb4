//! Deployment settings loaded from a TOML file
//!
//! Every section is optional. A deployment usually only overrides the store
//! branding and, for self-hosted models, the `[llm]` section:
//!
//! ```toml
//! [store]
//! name = "Daddy's Deals"
//! storefront_url = "https://daddysdeals.co.za"
//!
//! [llm]
//! provider = "openai"
//! classifier_model = "gpt-4"
//! dialogue_model = "gpt-4o"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Longest accepted greeting cooldown (one week)
const MAX_GREETING_COOLDOWN_MINUTES: i64 = 7 * 24 * 60;

/// Root settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,

    #[serde(default)]
    pub email: EmailSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub http: HttpSettings,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load settings from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Validation("http.timeout_secs must be positive".into()));
        }
        if self.email.sender.trim().is_empty() {
            return Err(ConfigError::Validation("email.sender must not be empty".into()));
        }
        if self.catalog.base_url.trim().is_empty() {
            return Err(ConfigError::Validation("catalog.base_url must not be empty".into()));
        }
        let cooldown = self.session.greeting_cooldown_minutes;
        if !(0..=MAX_GREETING_COOLDOWN_MINUTES).contains(&cooldown) {
            return Err(ConfigError::Validation(format!(
                "session.greeting_cooldown_minutes must be between 0 and {MAX_GREETING_COOLDOWN_MINUTES}, got {cooldown}"
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }

    pub fn greeting_cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session.greeting_cooldown_minutes)
    }
}

/// Storefront branding and links
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_name")]
    pub name: String,

    /// Used to build canonical deal URLs
    #[serde(default = "default_storefront_url")]
    pub storefront_url: String,

    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
}

fn default_store_name() -> String {
    "Daddy's Deals".to_string()
}

fn default_storefront_url() -> String {
    "https://daddysdeals.co.za".to_string()
}

fn default_currency_symbol() -> String {
    "R".to_string()
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            name: default_store_name(),
            storefront_url: default_storefront_url(),
            currency_symbol: default_currency_symbol(),
        }
    }
}

/// Generative-text backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider name: "openai", "openai-compatible" (alias "local") or "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Custom API endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_classifier_model")]
    pub classifier_model: String,

    #[serde(default = "default_classifier_temperature")]
    pub classifier_temperature: f32,

    #[serde(default = "default_dialogue_model")]
    pub dialogue_model: String,

    /// Left to the backend's default when unset
    #[serde(default)]
    pub dialogue_temperature: Option<f32>,

    /// Replaces the built-in store assistant persona
    #[serde(default)]
    pub persona_prompt: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_classifier_model() -> String {
    "gpt-4".to_string()
}

fn default_classifier_temperature() -> f32 {
    0.3
}

fn default_dialogue_model() -> String {
    "gpt-4o".to_string()
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            classifier_model: default_classifier_model(),
            classifier_temperature: default_classifier_temperature(),
            dialogue_model: default_dialogue_model(),
            dialogue_temperature: None,
            persona_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSettings {
    #[serde(default = "default_catalog_url")]
    pub base_url: String,
}

fn default_catalog_url() -> String {
    "https://daddysdeals.co.za/wp-json/daddybot/v1".to_string()
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            base_url: default_catalog_url(),
        }
    }
}

/// Transactional email settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    #[serde(default = "default_email_endpoint")]
    pub endpoint: String,

    /// Fixed sender address
    #[serde(default = "default_sender")]
    pub sender: String,
}

fn default_email_endpoint() -> String {
    "https://api.sendgrid.com/v3/mail/send".to_string()
}

fn default_sender() -> String {
    "daddy@daddydeals.co.za".to_string()
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            endpoint: default_email_endpoint(),
            sender: default_sender(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_cooldown")]
    pub greeting_cooldown_minutes: i64,
}

fn default_cooldown() -> i64 {
    60
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            greeting_cooldown_minutes: default_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Bounded wait applied to every backend call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

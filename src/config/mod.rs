//! Application configuration

pub mod prompts;
pub mod settings;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use settings::{ConfigError, LlmSettings, Settings};

/// Process-level configuration read from the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub sendgrid_api_key: Option<String>,
    pub ollama_url: Option<String>,
    /// Overrides `[catalog] base_url` from the settings file
    pub catalog_base_url: Option<String>,
    pub allowed_origin: String,
    pub data_dir: PathBuf,
    pub settings_path: Option<PathBuf>,
    /// "sqlite" (default) or "memory"
    pub store_backend: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            openai_api_key: non_empty_var("OPENAI_API_KEY"),
            sendgrid_api_key: non_empty_var("SENDGRID_API_KEY"),
            ollama_url: non_empty_var("OLLAMA_URL"),
            catalog_base_url: non_empty_var("CATALOG_BASE_URL"),
            allowed_origin: env::var("ALLOWED_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
            data_dir: env::var("DEALS_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            settings_path: non_empty_var("DEALS_CONFIG").map(PathBuf::from),
            store_backend: env::var("DEALS_STORE").unwrap_or_else(|_| "sqlite".into()),
        })
    }

    /// Load the settings file when one is configured, defaults otherwise
    pub fn load_settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = match self.settings_path {
            Some(ref path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        if let Some(ref url) = self.catalog_base_url {
            settings.catalog.base_url = url.clone();
        }

        settings.validate()?;
        Ok(settings)
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            openai_api_key: None,
            sendgrid_api_key: None,
            ollama_url: None,
            catalog_base_url: None,
            allowed_origin: "http://localhost:5173".into(),
            data_dir: PathBuf::from("./data"),
            settings_path: None,
            store_backend: "memory".into(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

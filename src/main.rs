//! Deals Chat - conversational deals assistant API
//!
//! Classifies each chat message as a deal query or ordinary dialogue, answers
//! with catalog listings or an LLM reply, and emails deals on request.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod catalog;
mod config;
mod conversation;
mod core;
mod notify;
mod providers;
mod routes;

use crate::catalog::CatalogClient;
use crate::config::{prompts, Config};
use crate::core::{
    ConversationStore, DialogueEngine, InMemoryConversationStore, LlmIntentClassifier, Orchestrator,
    SqliteConversationStore,
};
use crate::notify::{DealMailer, NotificationClient, SendGridBackend};
use crate::providers::Provider;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub notifier: Arc<NotificationClient>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deals_chat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let settings = config.load_settings().context("Failed to load settings")?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let timeout = settings.timeout();

    if config.openai_api_key.is_none() && settings.llm.provider == "openai" {
        tracing::warn!("OPENAI_API_KEY is not set; every turn will fall back to an error notice");
    }
    if config.sendgrid_api_key.is_none() {
        tracing::warn!("SENDGRID_API_KEY is not set; deal emails will fail");
    }

    let store: Arc<dyn ConversationStore> = match config.store_backend.as_str() {
        "sqlite" => Arc::new(
            SqliteConversationStore::new(&config.data_dir.join("conversations.db"))
                .await
                .context("Failed to initialize conversation store")?,
        ),
        "memory" => {
            tracing::warn!("Using in-memory conversation store; history is lost on restart");
            Arc::new(InMemoryConversationStore::new())
        }
        other => anyhow::bail!("Unknown DEALS_STORE {other:?}, expected \"sqlite\" or \"memory\""),
    };

    let backend = Arc::new(Provider::from_settings(&settings.llm, &config, timeout)?);

    let classifier = Arc::new(LlmIntentClassifier::new(
        backend.clone(),
        settings.llm.classifier_model.clone(),
        settings.llm.classifier_temperature,
    ));

    let persona = settings
        .llm
        .persona_prompt
        .clone()
        .unwrap_or_else(|| prompts::store_assistant(&settings.store.name));
    let dialogue = DialogueEngine::new(backend, settings.llm.dialogue_model.clone(), persona)
        .with_temperature(settings.llm.dialogue_temperature);

    let catalog = Arc::new(CatalogClient::new(settings.catalog.base_url.clone(), timeout)?);

    let orchestrator = Orchestrator::new(classifier, catalog, dialogue, store)
        .with_store_name(settings.store.name.clone())
        .with_greeting_cooldown(settings.greeting_cooldown());

    let email_backend = Arc::new(SendGridBackend::new(
        settings.email.endpoint.clone(),
        config.sendgrid_api_key.clone(),
        timeout,
    )?);
    let notifier = NotificationClient::new(
        email_backend,
        DealMailer {
            sender: settings.email.sender.clone(),
            storefront_url: settings.store.storefront_url.clone(),
            currency_symbol: settings.store.currency_symbol.clone(),
        },
    );

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        notifier: Arc::new(notifier),
    };

    let cors = CorsLayer::new()
        .allow_origin(
            config
                .allowed_origin
                .parse::<HeaderValue>()
                .context("ALLOWED_ORIGIN is not a valid origin")?,
        )
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    let app = Router::new()
        .merge(routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("🛍️ Deals Chat API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! API routes

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::catalog::Deal;
use crate::config::prompts;
use crate::conversation::Message;
use crate::core::{StoreError, TurnError};
use crate::notify::{self, EmailDealRequest, NotifyError};
use crate::AppState;

const MAX_SESSION_ID_LENGTH: usize = 128;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub message: Message,
}

#[derive(Debug, Deserialize)]
pub struct SendDealEmailRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub deal: Option<Deal>,
    /// Conversation that receives the confirmation notice
    #[serde(default)]
    pub session: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendDealEmailResponse {
    pub success: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation: Option<Message>,
}

/// Error envelope returned by every handler
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    Upstream(String),
    Internal(String),
    EmailFailed { message: String, detail: Value },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(error) => (StatusCode::BAD_REQUEST, json!({ "error": error })),
            ApiError::Conflict(error) => (StatusCode::CONFLICT, json!({ "error": error })),
            ApiError::Upstream(error) => (StatusCode::BAD_GATEWAY, json!({ "error": error })),
            ApiError::Internal(error) => (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": error })),
            ApiError::EmailFailed { message, detail } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "message": message, "error": detail }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        match err {
            TurnError::EmptyMessage | TurnError::MessageTooLong(_) => ApiError::BadRequest(err.to_string()),
            TurnError::Busy => ApiError::Conflict(err.to_string()),
            TurnError::Dialogue(e) => {
                tracing::error!(error = %e, "Dialogue turn failed");
                ApiError::Upstream("Failed to get response from the assistant. Please try again.".into())
            }
            TurnError::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Conversation store failed");
        ApiError::Internal("Conversation history is unavailable.".into())
    }
}

impl From<NotifyError> for ApiError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::Validation(error) => ApiError::BadRequest(error),
            NotifyError::InFlight => ApiError::Conflict(err.to_string()),
            NotifyError::Email(e) => ApiError::EmailFailed {
                message: "Failed to send deal email.".into(),
                detail: e.diagnostic(),
            },
        }
    }
}

fn validate_session_id(id: &str) -> Result<(), ApiError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LENGTH
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Invalid session id: {id:?}")))
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn suggestions() -> Json<Vec<&'static str>> {
    Json(prompts::SUGGESTIONS.to_vec())
}

async fn create_session(State(state): State<AppState>) -> Result<Json<SessionResponse>, ApiError> {
    let session = uuid::Uuid::new_v4().to_string();
    let messages = state.orchestrator.open_session(&session).await?;
    tracing::info!(%session, "New session");
    Ok(Json(SessionResponse { session, messages }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    validate_session_id(&session)?;
    let messages = state.orchestrator.open_session(&session).await?;
    Ok(Json(SessionResponse { session, messages }))
}

async fn post_message(
    State(state): State<AppState>,
    Path(session): Path<String>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Json<TurnResponse>, ApiError> {
    validate_session_id(&session)?;
    let Json(request) = payload?;
    let message = state.orchestrator.handle_turn(&session, &request.message).await?;
    Ok(Json(TurnResponse { message }))
}

async fn clear_session(
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    validate_session_id(&session)?;
    let messages = state.orchestrator.clear_session(&session).await?;
    Ok(Json(SessionResponse { session, messages }))
}

async fn send_deal_email(
    State(state): State<AppState>,
    payload: Result<Json<SendDealEmailRequest>, JsonRejection>,
) -> Result<Json<SendDealEmailResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "Unreadable deal email request");
        ApiError::BadRequest(notify::MISSING_FIELDS.into())
    })?;
    if let Some(ref session) = request.session {
        validate_session_id(session)?;
    }

    let recipient = request.email.unwrap_or_default();
    state
        .notifier
        .send_deal_email(EmailDealRequest {
            recipient_email: recipient.clone(),
            deal: request.deal,
        })
        .await?;

    // The email is already out; a notice that cannot be stored is only logged
    let confirmation = match request.session {
        Some(session) => {
            let notice = notify::sent_confirmation(recipient.trim());
            match state.orchestrator.append_notice(&session, notice).await {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(%session, error = %e, "Could not record email confirmation");
                    None
                }
            }
        }
        None => None,
    };

    Ok(Json(SendDealEmailResponse {
        success: true,
        message: "Deal email sent successfully!",
        confirmation,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/suggestions", get(suggestions))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/messages", post(post_message).delete(clear_session))
        .route("/api/send-deal-email", post(send_deal_email))
}

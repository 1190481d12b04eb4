//! "Email me this deal" notifications
//!
//! [`NotificationClient`] validates a request, renders the deal into a
//! plain-text and HTML message and hands it to an [`EmailBackend`] exactly
//! once. Failures are reported, never retried.

mod sendgrid;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::catalog::Deal;
use crate::core::InFlight;

pub use sendgrid::SendGridBackend;

pub const MISSING_FIELDS: &str = "Email and deal information are required.";

/// Assistant notice appended to the conversation after a successful send
pub fn sent_confirmation(recipient: &str) -> String {
    format!("Great! The deal has been sent to {recipient}. Check your inbox!")
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email backend not configured: {0}")]
    NotConfigured(String),

    #[error("Email backend rejected the message (HTTP {status})")]
    Rejected { status: u16, detail: Option<Value> },

    #[error("Email backend unreachable: {0}")]
    Unreachable(String),
}

impl EmailError {
    /// Backend diagnostic payload when one was returned, the error text otherwise
    pub fn diagnostic(&self) -> Value {
        match self {
            EmailError::Rejected {
                detail: Some(detail), ..
            } => detail.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("An email for this deal is already being sent")]
    InFlight,

    #[error(transparent)]
    Email(#[from] EmailError),
}

/// A user's request to have a deal emailed to them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailDealRequest {
    pub recipient_email: String,
    pub deal: Option<Deal>,
}

/// A fully rendered message ready for the backend
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait EmailBackend: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError>;
}

/// How deals are presented in outgoing mail
#[derive(Debug, Clone)]
pub struct DealMailer {
    pub sender: String,
    pub storefront_url: String,
    pub currency_symbol: String,
}

impl DealMailer {
    pub fn compose(&self, recipient: &str, deal: &Deal) -> OutgoingEmail {
        let price = deal.display_price(&self.currency_symbol);
        let url = deal.url(&self.storefront_url);

        let text = format!(
            "Deal: {}\nPrice: {}\nDescription: {}\nView the deal at: {}",
            deal.name, price, deal.description, url
        );

        let name = escape_html(&deal.name);
        let image = deal
            .first_image()
            .map(|img| {
                format!(
                    "<img src=\"{}\" alt=\"{}\" style=\"width:100%;height:auto;\">\n",
                    escape_html(&img.src),
                    name
                )
            })
            .unwrap_or_default();

        // The deal arrives in the request body, so every field is escaped
        let html = format!(
            "<h1>{name}</h1>\n{image}<p>{}</p>\n<p>Price: {price}</p>\n<p><a href=\"{url}\">View Deal</a></p>",
            escape_html(&deal.description)
        );

        OutgoingEmail {
            to: recipient.to_string(),
            from: self.sender.clone(),
            subject: format!("Check out this deal: {}", deal.name),
            text,
            html,
        }
    }
}

pub struct NotificationClient {
    backend: Arc<dyn EmailBackend>,
    mailer: DealMailer,
    pending: InFlight<(u64, String)>,
}

impl NotificationClient {
    pub fn new(backend: Arc<dyn EmailBackend>, mailer: DealMailer) -> Self {
        Self {
            backend,
            mailer,
            pending: InFlight::new(),
        }
    }

    /// Send one deal email. A second request for the same deal and recipient
    /// while the first is pending fails with [`NotifyError::InFlight`].
    pub async fn send_deal_email(&self, request: EmailDealRequest) -> Result<(), NotifyError> {
        let recipient = request.recipient_email.trim();
        let deal = match request.deal {
            Some(ref deal) if !recipient.is_empty() => deal,
            _ => return Err(NotifyError::Validation(MISSING_FIELDS.into())),
        };
        if !recipient.contains('@') {
            return Err(NotifyError::Validation(format!("{recipient:?} is not an email address")));
        }

        let _guard = self
            .pending
            .try_acquire((deal.id, recipient.to_lowercase()))
            .ok_or(NotifyError::InFlight)?;

        let email = self.mailer.compose(recipient, deal);

        match self.backend.send(&email).await {
            Ok(()) => {
                tracing::info!(deal_id = deal.id, "📧 Deal email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(deal_id = deal.id, error = %e, detail = %e.diagnostic(), "Deal email failed");
                Err(e.into())
            }
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

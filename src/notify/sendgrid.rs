//! SendGrid v3 mail-send backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;

use super::{EmailBackend, EmailError, OutgoingEmail};

#[derive(Debug, Serialize)]
struct MailSend<'a> {
    personalizations: [Personalization<'a>; 1],
    from: Address<'a>,
    subject: &'a str,
    content: [Content<'a>; 2],
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: [Address<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'static str,
    value: &'a str,
}

impl<'a> From<&'a OutgoingEmail> for MailSend<'a> {
    fn from(email: &'a OutgoingEmail) -> Self {
        Self {
            personalizations: [Personalization {
                to: [Address { email: &email.to }],
            }],
            from: Address { email: &email.from },
            subject: &email.subject,
            content: [
                Content {
                    content_type: "text/plain",
                    value: &email.text,
                },
                Content {
                    content_type: "text/html",
                    value: &email.html,
                },
            ],
        }
    }
}

pub struct SendGridBackend {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl SendGridBackend {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl EmailBackend for SendGridBackend {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EmailError::NotConfigured("SENDGRID_API_KEY is not set".into()))?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&MailSend::from(email))
            .send()
            .await
            .map_err(|e| EmailError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(status = status.as_u16(), "SendGrid accepted message");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = if body.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body)))
        };

        Err(EmailError::Rejected {
            status: status.as_u16(),
            detail,
        })
    }
}

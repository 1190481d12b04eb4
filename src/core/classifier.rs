//! Deal-intent classification
//!
//! Asks the generative backend whether a message is a request for deals and
//! which facets (category, location) it names. The backend answers in free
//! text, so output is validated strictly: anything other than a JSON object
//! carrying all three fields is a [`ClassificationError`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::join_tags;
use crate::config::prompts;
use crate::providers::{CompletionBackend, CompletionRequest, PromptMessage, ProviderError};

/// Result of classifying one user message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealQueryIntent {
    pub is_deal_query: bool,
    pub category: Option<String>,
    pub location: Option<String>,
}

impl DealQueryIntent {
    #[cfg(test)]
    pub fn deals(category: Option<&str>, location: Option<&str>) -> Self {
        Self {
            is_deal_query: true,
            category: category.map(str::to_string),
            location: location.map(str::to_string),
        }
    }

    /// Catalog `tags` value for this intent
    pub fn tags(&self) -> String {
        join_tags(self.location.as_deref(), self.category.as_deref())
    }

    /// Lead-in sentence for a deal listing, naming whichever facets are known
    pub fn lead_in(&self) -> String {
        let mut text = String::from("Here are some current deals");
        if let Some(ref location) = self.location {
            text.push_str(" in ");
            text.push_str(location);
        }
        if let Some(ref category) = self.category {
            text.push_str(" for ");
            text.push_str(category);
        }
        text.push(':');
        text
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Unparseable classifier output: {0}")]
    Malformed(String),

    #[error("Classifier output missing field: {0}")]
    MissingField(&'static str),
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, message: &str) -> Result<DealQueryIntent, ClassificationError>;
}

/// Classifier backed by a generative-text model
pub struct LlmIntentClassifier {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    temperature: f32,
}

impl LlmIntentClassifier {
    pub fn new(backend: Arc<dyn CompletionBackend>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            backend,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, message: &str) -> Result<DealQueryIntent, ClassificationError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                PromptMessage::system(prompts::DEAL_CLASSIFIER),
                PromptMessage::user(message),
            ],
            temperature: Some(self.temperature),
        };

        let output = self.backend.complete(&request).await?;
        parse_intent(&output)
    }
}

/// Parse the classifier's reply into an intent.
///
/// A surrounding Markdown code fence is tolerated. Blank facet strings are
/// treated as absent.
pub fn parse_intent(output: &str) -> Result<DealQueryIntent, ClassificationError> {
    let json = strip_code_fence(output);

    let value: Value = serde_json::from_str(json).map_err(|e| ClassificationError::Malformed(e.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| ClassificationError::Malformed("expected a JSON object".into()))?;

    let is_deal_query = match object.get("isDealQuery") {
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(ClassificationError::Malformed(format!(
                "isDealQuery must be a boolean, got {other}"
            )))
        }
        None => return Err(ClassificationError::MissingField("isDealQuery")),
    };

    Ok(DealQueryIntent {
        is_deal_query,
        category: facet(object.get("category"), "category")?,
        location: facet(object.get("location"), "location")?,
    })
}

fn facet(value: Option<&Value>, name: &'static str) -> Result<Option<String>, ClassificationError> {
    match value {
        None => Err(ClassificationError::MissingField(name)),
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(other) => Err(ClassificationError::Malformed(format!(
            "{name} must be a string or null, got {other}"
        ))),
    }
}

fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tests::{slow_provider, ScriptedBackend};
    use crate::providers::PromptRole;
    use std::time::Duration;

    #[test]
    fn test_parse_full_intent() {
        let intent = parse_intent(r#"{"isDealQuery": true, "category": "electronics", "location": "Cape Town"}"#).unwrap();
        assert_eq!(intent, DealQueryIntent::deals(Some("electronics"), Some("Cape Town")));
    }

    #[test]
    fn test_parse_nulls_and_blanks() {
        let intent = parse_intent(r#"{"isDealQuery": true, "category": null, "location": " "}"#).unwrap();
        assert!(intent.is_deal_query);
        assert!(intent.category.is_none());
        assert!(intent.location.is_none());
    }

    #[test]
    fn test_parse_fenced_output() {
        let output = "```json\n{\"isDealQuery\": false, \"category\": null, \"location\": null}\n```";
        let intent = parse_intent(output).unwrap();
        assert_eq!(intent, DealQueryIntent::default());
    }

    #[test]
    fn test_missing_field_is_error() {
        let err = parse_intent(r#"{"isDealQuery": true, "category": "spa"}"#).unwrap_err();
        assert!(matches!(err, ClassificationError::MissingField("location")));
    }

    #[test]
    fn test_prose_is_error() {
        let err = parse_intent("Sure! The user wants deals.").unwrap_err();
        assert!(matches!(err, ClassificationError::Malformed(_)));
    }

    #[test]
    fn test_wrong_types_are_errors() {
        assert!(parse_intent(r#"{"isDealQuery": "yes", "category": null, "location": null}"#).is_err());
        assert!(parse_intent(r#"{"isDealQuery": true, "category": 3, "location": null}"#).is_err());
        assert!(parse_intent(r#"[true, null, null]"#).is_err());
    }

    #[test]
    fn test_lead_in_clauses() {
        let both = DealQueryIntent::deals(Some("electronics"), Some("Cape Town"));
        assert_eq!(both.lead_in(), "Here are some current deals in Cape Town for electronics:");

        let location_only = DealQueryIntent::deals(None, Some("Durban"));
        assert_eq!(location_only.lead_in(), "Here are some current deals in Durban:");
        assert!(!location_only.lead_in().contains(" for "));

        let neither = DealQueryIntent::deals(None, None);
        assert_eq!(neither.lead_in(), "Here are some current deals:");
    }

    #[test]
    fn test_tags_location_first() {
        let intent = DealQueryIntent::deals(Some("electronics"), Some("Cape Town"));
        assert_eq!(intent.tags(), "Cape Town,electronics");
        assert_eq!(DealQueryIntent::deals(Some("spa"), None).tags(), "spa");
    }

    #[tokio::test]
    async fn test_classifier_sends_fixed_prompt_at_low_temperature() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok(
            r#"{"isDealQuery": true, "category": null, "location": "Durban"}"#,
        )]));
        let classifier = LlmIntentClassifier::new(backend.clone(), "gpt-4", 0.3);

        let intent = classifier.classify("any specials in Durban?").await.unwrap();
        assert_eq!(intent.location.as_deref(), Some("Durban"));

        let requests = backend.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, PromptRole::System);
        assert_eq!(request.messages[0].content, prompts::DEAL_CLASSIFIER);
        assert_eq!(request.messages[1].content, "any specials in Durban?");
    }

    #[tokio::test]
    async fn test_backend_failure_is_classification_error() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err("timeout")]));
        let classifier = LlmIntentClassifier::new(backend, "gpt-4", 0.3);

        let err = classifier.classify("hello").await.unwrap_err();
        assert!(matches!(err, ClassificationError::Provider(_)));
    }

    #[tokio::test]
    async fn test_backend_timeout_is_classification_error() {
        let backend = Arc::new(slow_provider(Duration::from_secs(3), Duration::from_secs(1)).await);
        let classifier = LlmIntentClassifier::new(backend, "gpt-4", 0.3);

        let err = classifier.classify("deals in Durban").await.unwrap_err();
        assert!(matches!(err, ClassificationError::Provider(ProviderError::RequestFailed(ref e)) if e.is_timeout()));
    }
}

//! Conversation types and greeting selection

use chrono::{DateTime, Duration, Utc};
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

use crate::catalog::Deal;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    /// Snapshot of the deals rendered under a `dealList` message
    #[serde(default)]
    pub deals: Vec<Deal>,
}

// `deals` is written for every `dealList`, even an empty one, and never for `plain`
impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let listing = self.kind == MessageKind::DealList;
        let mut state = serializer.serialize_struct("Message", if listing { 4 } else { 3 })?;
        state.serialize_field("role", &self.role)?;
        state.serialize_field("content", &self.content)?;
        state.serialize_field("kind", &self.kind)?;
        if listing {
            state.serialize_field("deals", &self.deals)?;
        } else {
            state.skip_field("deals")?;
        }
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    #[default]
    Plain,
    DealList,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Plain => "plain",
            MessageKind::DealList => "dealList",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "plain" => Some(MessageKind::Plain),
            "dealList" => Some(MessageKind::DealList),
            _ => None,
        }
    }
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            kind: MessageKind::Plain,
            deals: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            kind: MessageKind::Plain,
            deals: Vec::new(),
        }
    }

    /// An assistant message carrying a deal listing under a lead-in line
    pub fn deal_list(lead_in: impl Into<String>, deals: Vec<Deal>) -> Self {
        Self {
            role: Role::Assistant,
            content: lead_in.into(),
            kind: MessageKind::DealList,
            deals,
        }
    }
}

/// Greeting shown when a session starts with no history
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
    FirstVisit,
    WelcomeBack,
    HelloAgain,
}

impl Greeting {
    /// Pick the greeting for a visit at `now`.
    ///
    /// A visit strictly more than `cooldown` after the last one counts as a
    /// return; anything sooner is treated as the same stretch of activity.
    pub fn for_visit(now: DateTime<Utc>, last_visit: Option<DateTime<Utc>>, cooldown: Duration) -> Self {
        match last_visit {
            None => Greeting::FirstVisit,
            Some(last) if now - last > cooldown => Greeting::WelcomeBack,
            Some(_) => Greeting::HelloAgain,
        }
    }

    pub fn text(&self, store_name: &str) -> String {
        match self {
            Greeting::FirstVisit => format!("Welcome to {store_name}! How can I assist you today?"),
            Greeting::WelcomeBack => format!("Welcome back to {store_name}! What can I help you with?"),
            Greeting::HelloAgain => "Hello again! How can I help you?".to_string(),
        }
    }

    pub fn message(&self, store_name: &str) -> Message {
        Message::assistant(self.text(store_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_utc()
    }

    #[test]
    fn test_first_visit_without_timestamp() {
        let greeting = Greeting::for_visit(at(12, 0), None, Duration::hours(1));
        assert_eq!(greeting, Greeting::FirstVisit);
    }

    #[test]
    fn test_return_after_cooldown() {
        let greeting = Greeting::for_visit(at(12, 0), Some(at(10, 30)), Duration::hours(1));
        assert_eq!(greeting, Greeting::WelcomeBack);
    }

    #[test]
    fn test_return_within_cooldown() {
        let greeting = Greeting::for_visit(at(12, 0), Some(at(11, 30)), Duration::hours(1));
        assert_eq!(greeting, Greeting::HelloAgain);

        // exactly one hour is still inside the window
        let greeting = Greeting::for_visit(at(12, 0), Some(at(11, 0)), Duration::hours(1));
        assert_eq!(greeting, Greeting::HelloAgain);
    }

    #[test]
    fn test_greeting_text_names_store() {
        let text = Greeting::FirstVisit.text("Daddy's Deals");
        assert_eq!(text, "Welcome to Daddy's Deals! How can I assist you today?");
        assert!(Greeting::WelcomeBack.text("Shop").starts_with("Welcome back to Shop!"));
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::assistant("Hi");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["kind"], "plain");
        assert!(json.get("deals").is_none());

        let listing = Message::deal_list("Here are some current deals:", vec![]);
        let json = serde_json::to_value(&listing).unwrap();
        assert_eq!(json["kind"], "dealList");
        assert_eq!(json["deals"], serde_json::json!([]));
    }

    #[test]
    fn test_kind_defaults_to_plain() {
        let msg: Message = serde_json::from_str(r#"{"role":"user","content":"hello"}"#).unwrap();
        assert_eq!(msg.kind, MessageKind::Plain);
        assert!(msg.deals.is_empty());
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, MessageId};

pub const DEFAULT_TITLE: &str = "New Conversation";
const TITLE_MAX_CHARS: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Empty assistant message whose content is filled in while streaming.
    pub fn assistant_placeholder() -> Self {
        Self::new(Role::Assistant, String::new())
    }
}

/// First 50 characters of the first message, or the default title.
pub fn derive_title(messages: &[Message]) -> String {
    match messages.first() {
        Some(m) if !m.content.is_empty() => m.content.chars().take(TITLE_MAX_CHARS).collect(),
        _ => DEFAULT_TITLE.to_string(),
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: ConversationId,
    pub title: String,
    pub messages: Vec<Message>,
    pub system_prompt: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// Materialise a draft under an id chosen by whichever store accepted it.
    pub fn from_draft(id: ConversationId, draft: ConversationDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            messages: draft.messages,
            system_prompt: draft.system_prompt,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: ConversationUpdate, now: DateTime<Utc>) {
        self.title = update.title;
        self.messages = update.messages;
        self.system_prompt = update.system_prompt;
        self.updated_at = now;
    }

    pub fn to_update(&self) -> ConversationUpdate {
        ConversationUpdate {
            title: self.title.clone(),
            messages: self.messages.clone(),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

/// A conversation that has not been assigned an id yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDraft {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub system_prompt: String,
}

impl ConversationDraft {
    pub fn new(messages: Vec<Message>, system_prompt: impl Into<String>) -> Self {
        Self {
            title: derive_title(&messages),
            messages,
            system_prompt: system_prompt.into(),
        }
    }

    /// Fill in a derived title when the caller sent none.
    pub fn normalized(mut self) -> Self {
        if self.title.trim().is_empty() {
            self.title = derive_title(&self.messages);
        }
        self
    }
}

/// Full replacement of a conversation's mutable fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationUpdate {
    pub title: String,
    pub messages: Vec<Message>,
    pub system_prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_defaults_without_messages() {
        assert_eq!(derive_title(&[]), DEFAULT_TITLE);
        assert_eq!(ConversationDraft::new(vec![], "p").title, DEFAULT_TITLE);
    }

    #[test]
    fn title_truncates_to_fifty_chars() {
        let long = "a".repeat(80);
        let title = derive_title(&[Message::user(long)]);
        assert_eq!(title.chars().count(), 50);
    }

    #[test]
    fn title_truncation_respects_char_boundaries() {
        let text = "é".repeat(60);
        let title = derive_title(&[Message::user(text)]);
        assert_eq!(title, "é".repeat(50));
    }

    #[test]
    fn title_uses_first_message_only() {
        let msgs = vec![Message::user("plan my week"), Message::user("second")];
        assert_eq!(derive_title(&msgs), "plan my week");
    }

    #[test]
    fn role_serializes_lowercase() {
        let m = Message::assistant_placeholder();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "");
        assert!(json.get("timestamp").is_some());
    }

    #[test]
    fn draft_normalization_keeps_explicit_title() {
        let d = ConversationDraft {
            title: "Custom".into(),
            messages: vec![Message::user("hello")],
            system_prompt: String::new(),
        };
        assert_eq!(d.normalized().title, "Custom");

        let d: ConversationDraft =
            serde_json::from_str(r#"{"messages":[],"systemPrompt":"p"}"#).unwrap();
        assert_eq!(d.normalized().title, DEFAULT_TITLE);
    }

    #[test]
    fn apply_replaces_fields_and_bumps_updated_at() {
        let t0 = Utc::now();
        let mut rec = ConversationRecord::from_draft(
            ConversationId::new(),
            ConversationDraft::new(vec![], "old"),
            t0,
        );
        let t1 = t0 + chrono::Duration::seconds(5);
        rec.apply(
            ConversationUpdate {
                title: "t".into(),
                messages: vec![Message::user("x")],
                system_prompt: "new".into(),
            },
            t1,
        );
        assert_eq!(rec.system_prompt, "new");
        assert_eq!(rec.created_at, t0);
        assert_eq!(rec.updated_at, t1);
        assert_eq!(rec.messages.len(), 1);
    }
}

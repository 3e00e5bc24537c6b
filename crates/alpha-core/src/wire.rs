//! JSON bodies exchanged between the client and the server.
//!
//! Read endpoints never fail at the HTTP level: a populated `error` marks a
//! degraded answer and callers fall back to their local cache.

use serde::{Deserialize, Serialize};

use crate::context::ContextRecord;
use crate::conversation::{ConversationRecord, Message, Role};

/// Header naming the installation whose context is addressed.
pub const INSTALLATION_HEADER: &str = "x-alpha-installation";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextEnvelope {
    pub context: Option<ContextRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveEnvelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationsEnvelope {
    pub conversations: Vec<ConversationRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub conversation: ConversationRecord,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuccessEnvelope {
    pub success: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl From<&Message> for ChatTurn {
    fn from(m: &Message) -> Self {
        Self {
            role: m.role,
            content: m.content.clone(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    /// Cleaned text.
    pub text: String,
    /// Raw text as returned by the speech model.
    pub original: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degraded_envelope_keeps_error() {
        let json = r#"{"context":null,"error":"Database not configured"}"#;
        let env: ContextEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.context.is_none());
        assert_eq!(env.error.as_deref(), Some("Database not configured"));
    }

    #[test]
    fn chat_request_is_camel_case() {
        let req = ChatRequest {
            messages: vec![ChatTurn::from(&Message::user("hi"))],
            system_prompt: "be brief".into(),
            model: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["systemPrompt"], "be brief");
        assert_eq!(v["messages"][0]["role"], "user");
        assert!(v.get("model").is_none());
    }
}

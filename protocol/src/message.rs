use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// `role` of a [`Message`] within a session's conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    ToolResult,
}

/// A single append-only entry in a session's message list (I1: every message
/// emitted to the model is a system prompt, a user prompt, a verbatim
/// assistant turn, or a synthetic tool-result produced by the Tool Layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_synthetic_tool_result: bool,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            is_synthetic_tool_result: false,
        }
    }

    pub fn synthetic_tool_result(content: impl Into<String>) -> Self {
        Self {
            role: Role::ToolResult,
            content: content.into(),
            timestamp: Utc::now(),
            is_synthetic_tool_result: true,
        }
    }
}

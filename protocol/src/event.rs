use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// One line of `events.jsonl`: `{ ts, seq, type, payload }`. Event sequence
/// numbers are strictly monotonic within a session (I4, P10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub ts: DateTime<Utc>,
    pub seq: u64,
    #[serde(flatten)]
    pub msg: EventMsg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventMsg {
    SessionStarted { session_id: String },
    UserMessage { content: String },
    AssistantDone { content: String },
    ToolCall { tool: String, args: Value },
    ToolResult { tool: String, ok: bool, preview: String },
    Error { error_type: String, message: String },
    RunComplete { outcome: String, rounds: u64 },
}

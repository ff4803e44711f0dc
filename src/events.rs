use serde::Serialize;
use serde_json::Value;

/// Progress of a chat turn, as sent over `/chat/stream`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ToolCall { tool: String, arguments: Value },
    ToolOutput { tool: String, content: String },
    Message { content: String },
    Done { thread_id: String, result: String },
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done { .. } | StreamEvent::Error { .. })
    }
}

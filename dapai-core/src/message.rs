//! Typed inbound chat messages.
//!
//! The wire payload (`dapai_sdk::event::MessagePayload`) is loose: `type` is
//! a free string and `command_data` any JSON. Here it becomes a closed set of
//! kinds, with the movie URL promoted to a typed field.

use chrono::{Local, NaiveDateTime, TimeZone};
use dapai_sdk::event::MessagePayload;
use serde::Serialize;
use serde_json::Value;

/// Timestamp format used by the chat server for string timestamps.
pub const SERVER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageKind {
    Plain,
    Mention,
    /// `url` is `None` when `command_data` carried no usable URL; such a
    /// movie renders as escaped text only.
    Movie { url: Option<String> },
    Ai { question: Option<String> },
    System,
}

impl MessageKind {
    /// Interpret the wire `type` and `command_data`. Unknown types fall back
    /// to [`MessageKind::Plain`].
    pub fn from_wire(kind: &str, command_data: Option<&Value>) -> Self {
        let field = |name: &str| {
            command_data
                .and_then(|data| data.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        match kind {
            "mention" => MessageKind::Mention,
            "movie" => {
                let url = field("url").filter(|url| !url.is_empty());
                if url.is_none() {
                    tracing::debug!("Movie message without a url, rendering without embed");
                }
                MessageKind::Movie { url }
            }
            "ai" => MessageKind::Ai {
                question: field("question"),
            },
            "system" => MessageKind::System,
            "plain" | "text" | "" => MessageKind::Plain,
            other => {
                tracing::debug!(kind = other, "Unknown message type, rendering as plain text");
                MessageKind::Plain
            }
        }
    }

    /// Name used as a presentation class (`message-content <name>`).
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Plain => "plain",
            MessageKind::Mention => "mention",
            MessageKind::Movie { .. } => "movie",
            MessageKind::Ai { .. } => "ai",
            MessageKind::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender: String,
    /// Raw, untrusted text.
    pub message: String,
    /// Epoch milliseconds; 0 when the server sent nothing usable.
    pub timestamp: i64,
    pub kind: MessageKind,
}

impl From<MessagePayload> for InboundMessage {
    fn from(payload: MessagePayload) -> Self {
        let kind = MessageKind::from_wire(&payload.kind, payload.command_data.as_ref());
        Self {
            timestamp: parse_timestamp(&payload.timestamp),
            sender: payload.sender,
            message: payload.message,
            kind,
        }
    }
}

/// Epoch millis from an integer, a digit string, or a server-format local
/// time string. Anything else is 0.
pub fn parse_timestamp(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(millis) = s.parse::<i64>() {
                return millis;
            }
            NaiveDateTime::parse_from_str(s, SERVER_TIME_FORMAT)
                .ok()
                .and_then(|naive| Local.from_local_datetime(&naive).earliest())
                .map(|dt| dt.timestamp_millis())
                .unwrap_or(0)
        }
        _ => 0,
    }
}

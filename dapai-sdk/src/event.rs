//! Chat protocol events exchanged with the server.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a `new_message` event, exactly as the server sends it.
///
/// Every field is lenient: the server has shipped both integer and string
/// timestamps, and `type`/`command_data` are free-form. Interpretation is
/// left to the consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub timestamp: Value,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub command_data: Option<Value>,
}

/// Events that the SDK emits to the consumer.
///
/// `Open`, `ReconnectAttempt`, `Disconnect` and `ConnectError` originate in
/// the transport itself; the rest are decoded from server event packets.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The Socket.IO connection is established.
    Open,

    /// A connection attempt failed and attempt number `attempt` (1-based)
    /// is about to start after the configured delay.
    ReconnectAttempt { attempt: u32 },

    /// Server greeting sent right after connect.
    ConnectionEstablished { client_id: String },

    LoginSuccess,
    LoginError { message: Option<String> },

    NewMessage(MessagePayload),

    UserJoined { message: String },
    UserLeft { message: String },

    /// Online nicknames, in whatever order the server keeps them.
    UsersList { users: Vec<String> },

    /// An established connection went away.
    Disconnect { reason: String },

    /// The retry budget is exhausted without ever connecting.
    ConnectError { error: String },
}

impl ServerEvent {
    /// Decode a Socket.IO event by name. Returns `None` for names the chat
    /// protocol does not define.
    pub fn from_event(name: &str, args: &[Value]) -> Option<Self> {
        let first = args.first().cloned().unwrap_or(Value::Null);
        let text_field = |field: &str| {
            first
                .get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let event = match name {
            "connection_established" => ServerEvent::ConnectionEstablished {
                client_id: text_field("client_id").unwrap_or_default(),
            },
            "login_success" => ServerEvent::LoginSuccess,
            "login_error" => ServerEvent::LoginError {
                message: text_field("message"),
            },
            "new_message" => match serde_json::from_value::<MessagePayload>(first) {
                Ok(payload) => ServerEvent::NewMessage(payload),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping malformed new_message payload");
                    return None;
                }
            },
            "user_joined" => ServerEvent::UserJoined {
                message: text_field("message").unwrap_or_default(),
            },
            "user_left" => ServerEvent::UserLeft {
                message: text_field("message").unwrap_or_default(),
            },
            "update_users_list" => ServerEvent::UsersList {
                users: first
                    .get("users")
                    .and_then(Value::as_array)
                    .map(|users| {
                        users
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            _ => return None,
        };
        Some(event)
    }
}

/// Events the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Login {
        nickname: String,
        server_address: String,
    },
    /// Raw message text; command parsing happens server-side.
    SendMessage { message: String },
    Logout,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Login { .. } => "login",
            ClientEvent::SendMessage { .. } => "send_message",
            ClientEvent::Logout => "logout",
        }
    }

    /// Event arguments as they go on the wire (`logout` carries none).
    pub fn args(&self) -> Vec<Value> {
        match self {
            ClientEvent::Login {
                nickname,
                server_address,
            } => vec![serde_json::json!({
                "nickname": nickname,
                "server_address": server_address,
            })],
            ClientEvent::SendMessage { message } => {
                vec![serde_json::json!({ "message": message })]
            }
            ClientEvent::Logout => Vec::new(),
        }
    }
}

//! Engine.IO v4 / Socket.IO v5 text packet codec.
//!
//! Engine.IO frames every transport message with a single type digit.
//! Socket.IO packets travel inside Engine.IO `message` packets:
//!
//! ```text
//! <type>[<nsp>,][<ack id>][<json>]
//! 42["new_message",{"sender":"bob",...}]
//! ```
//!
//! Binary packets (Engine.IO `b…`, Socket.IO types 5/6) are not used by the
//! chat protocol and decode to an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Separator between packets in a long-polling body.
pub const PAYLOAD_SEPARATOR: char = '\u{1e}';

/// The default Socket.IO namespace.
pub const DEFAULT_NAMESPACE: &str = "/";

/// Body of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for our pong.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnginePacket {
    Open(Handshake),
    Close,
    Ping(String),
    Pong(String),
    Message(String),
    Upgrade,
    Noop,
}

impl EnginePacket {
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(handshake) => {
                // Handshake only holds strings and integers.
                let body = serde_json::to_string(handshake).unwrap_or_default();
                format!("0{body}")
            }
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(data) => format!("2{data}"),
            EnginePacket::Pong(data) => format!("3{data}"),
            EnginePacket::Message(data) => format!("4{data}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }

    pub fn decode(frame: &str) -> Result<Self, TransportError> {
        let mut chars = frame.chars();
        let Some(kind) = chars.next() else {
            return Err(TransportError::Packet("empty engine packet".to_string()));
        };
        let data = chars.as_str();
        let packet = match kind {
            '0' => {
                let handshake = serde_json::from_str(data)
                    .map_err(|e| TransportError::Packet(format!("bad open packet: {e}")))?;
                EnginePacket::Open(handshake)
            }
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(data.to_string()),
            '3' => EnginePacket::Pong(data.to_string()),
            '4' => EnginePacket::Message(data.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            'b' => {
                return Err(TransportError::Packet(
                    "binary engine packets are not supported".to_string(),
                ));
            }
            other => {
                return Err(TransportError::Packet(format!(
                    "unknown engine packet type '{other}'"
                )));
            }
        };
        Ok(packet)
    }
}

/// Split a long-polling response body into engine packets.
pub fn decode_payload(body: &str) -> Result<Vec<EnginePacket>, TransportError> {
    body.split(PAYLOAD_SEPARATOR)
        .filter(|frame| !frame.is_empty())
        .map(EnginePacket::decode)
        .collect()
}

/// Join engine packets into a long-polling request body.
pub fn encode_payload(packets: &[EnginePacket]) -> String {
    packets
        .iter()
        .map(EnginePacket::encode)
        .collect::<Vec<_>>()
        .join(&PAYLOAD_SEPARATOR.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect(Option<Value>),
    Disconnect,
    Event {
        name: String,
        args: Vec<Value>,
        ack: Option<u64>,
    },
    Ack {
        id: u64,
        args: Vec<Value>,
    },
    ConnectError(Value),
}

impl SocketPacket {
    pub fn event(name: &str, args: Vec<Value>) -> Self {
        SocketPacket::Event {
            name: name.to_string(),
            args,
            ack: None,
        }
    }

    fn type_digit(&self) -> char {
        match self {
            SocketPacket::Connect(_) => '0',
            SocketPacket::Disconnect => '1',
            SocketPacket::Event { .. } => '2',
            SocketPacket::Ack { .. } => '3',
            SocketPacket::ConnectError(_) => '4',
        }
    }

    /// Encode for the given namespace (the default namespace is implicit).
    pub fn encode(&self, namespace: &str) -> String {
        let mut out = String::new();
        out.push(self.type_digit());
        if namespace != DEFAULT_NAMESPACE && !namespace.is_empty() {
            out.push_str(namespace);
            out.push(',');
        }
        match self {
            SocketPacket::Connect(Some(data)) | SocketPacket::ConnectError(data) => {
                out.push_str(&data.to_string());
            }
            SocketPacket::Connect(None) | SocketPacket::Disconnect => {}
            SocketPacket::Event { name, args, ack } => {
                if let Some(id) = ack {
                    out.push_str(&id.to_string());
                }
                let mut array = Vec::with_capacity(args.len() + 1);
                array.push(Value::String(name.clone()));
                array.extend(args.iter().cloned());
                out.push_str(&Value::Array(array).to_string());
            }
            SocketPacket::Ack { id, args } => {
                out.push_str(&id.to_string());
                out.push_str(&Value::Array(args.clone()).to_string());
            }
        }
        out
    }

    /// Decode a Socket.IO packet, returning its namespace and body.
    pub fn decode(data: &str) -> Result<(String, Self), TransportError> {
        let mut chars = data.chars();
        let Some(kind) = chars.next() else {
            return Err(TransportError::Packet("empty socket packet".to_string()));
        };
        let mut rest = chars.as_str();

        if matches!(kind, '5' | '6') {
            return Err(TransportError::Packet(
                "binary socket packets are not supported".to_string(),
            ));
        }

        let namespace = if rest.starts_with('/') {
            match rest.find(',') {
                Some(idx) => {
                    let nsp = rest[..idx].to_string();
                    rest = &rest[idx + 1..];
                    nsp
                }
                None => {
                    let nsp = rest.to_string();
                    rest = "";
                    nsp
                }
            }
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.chars().take_while(char::is_ascii_digit).count();
        let ack = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|e| TransportError::Packet(format!("bad ack id: {e}")))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let json = if rest.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str::<Value>(rest)
                    .map_err(|e| TransportError::Packet(format!("bad packet data: {e}")))?,
            )
        };

        let packet = match kind {
            '0' => SocketPacket::Connect(json),
            '1' => SocketPacket::Disconnect,
            '2' => {
                let Some(Value::Array(mut items)) = json else {
                    return Err(TransportError::Packet(
                        "event packet without an array body".to_string(),
                    ));
                };
                if items.is_empty() {
                    return Err(TransportError::Packet("event packet without a name".to_string()));
                }
                let Value::String(name) = items.remove(0) else {
                    return Err(TransportError::Packet("event name is not a string".to_string()));
                };
                SocketPacket::Event {
                    name,
                    args: items,
                    ack,
                }
            }
            '3' => {
                let Some(id) = ack else {
                    return Err(TransportError::Packet("ack packet without an id".to_string()));
                };
                let args = match json {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                };
                SocketPacket::Ack { id, args }
            }
            '4' => SocketPacket::ConnectError(json.unwrap_or(Value::Null)),
            other => {
                return Err(TransportError::Packet(format!(
                    "unknown socket packet type '{other}'"
                )));
            }
        };
        Ok((namespace, packet))
    }
}

/// Human-readable reason out of a CONNECT_ERROR body (`{"message": "..."}`
/// or a bare string).
pub fn connect_error_message(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .or_else(|| data.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| data.to_string())
}

//! Socket.IO (v5) over Engine.IO (v4) text framing, WebSocket transport only.
//!
//! Every WebSocket text frame is one Engine.IO packet: a single type digit
//! followed by its data. Engine.IO `message` packets carry one Socket.IO
//! packet: type digit, optional `/namespace,`, optional ack id, then JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Path and query the Socket.IO server listens on for WebSocket clients.
const SOCKET_IO_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

const DEFAULT_NAMESPACE: &str = "/";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Empty packet")]
    Empty,
    #[error("Unknown Engine.IO packet type {0:?}")]
    UnknownEngineType(char),
    #[error("Unknown Socket.IO packet type {0:?}")]
    UnknownSocketType(char),
    #[error("Binary Socket.IO packets are not supported")]
    BinaryUnsupported,
    #[error("Malformed open handshake: {0}")]
    BadHandshake(#[source] serde_json::Error),
    #[error("Malformed packet payload: {0}")]
    BadPayload(#[source] serde_json::Error),
    #[error("Event packet without an event name")]
    MissingEventName,
    #[error("Failed to encode event payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Unsupported endpoint scheme in {0:?}")]
    UnsupportedScheme(String),
}

/// Data of the Engine.IO `open` packet.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    /// Milliseconds between server pings.
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

impl OpenHandshake {
    /// How long the link may stay silent before it is considered lost.
    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_interval + self.ping_timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(OpenHandshake),
    Close,
    Ping,
    Pong,
    Message(SocketPacket),
    Upgrade,
    Noop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        ack_id: Option<u64>,
        name: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        ack_id: Option<u64>,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

/// Decode one WebSocket text frame.
pub fn decode(frame: &str) -> Result<EnginePacket, ProtocolError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let rest = chars.as_str();

    match kind {
        '0' => serde_json::from_str(rest)
            .map(EnginePacket::Open)
            .map_err(ProtocolError::BadHandshake),
        '1' => Ok(EnginePacket::Close),
        '2' => Ok(EnginePacket::Ping),
        '3' => Ok(EnginePacket::Pong),
        '4' => decode_socket(rest).map(EnginePacket::Message),
        '5' => Ok(EnginePacket::Upgrade),
        '6' => Ok(EnginePacket::Noop),
        other => Err(ProtocolError::UnknownEngineType(other)),
    }
}

fn decode_socket(packet: &str) -> Result<SocketPacket, ProtocolError> {
    let mut chars = packet.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let mut rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Err(ProtocolError::BinaryUnsupported);
    }

    let namespace = if rest.starts_with('/') {
        let (ns, tail) = match rest.find(',') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        rest = tail;
        ns.to_string()
    } else {
        DEFAULT_NAMESPACE.to_string()
    };

    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let ack_id = if digits > 0 {
        rest[..digits].parse().ok()
    } else {
        None
    };
    rest = &rest[digits..];

    let data = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(rest).map_err(ProtocolError::BadPayload)?)
    };

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace, data }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let mut args = match data {
                Some(Value::Array(args)) => args,
                _ => return Err(ProtocolError::MissingEventName),
            };
            if args.is_empty() {
                return Err(ProtocolError::MissingEventName);
            }
            let name = match args.remove(0) {
                Value::String(name) => name,
                _ => return Err(ProtocolError::MissingEventName),
            };
            Ok(SocketPacket::Event {
                namespace,
                ack_id,
                name,
                args,
            })
        }
        '3' => {
            let args = match data {
                Some(Value::Array(args)) => args,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            Ok(SocketPacket::Ack {
                namespace,
                ack_id,
                args,
            })
        }
        '4' => Ok(SocketPacket::ConnectError { namespace, data }),
        other => Err(ProtocolError::UnknownSocketType(other)),
    }
}

/// Socket.IO connect to the default namespace.
pub fn encode_connect() -> String {
    "40".to_string()
}

/// Socket.IO disconnect from the default namespace.
pub fn encode_disconnect() -> String {
    "41".to_string()
}

/// Engine.IO pong, answering a server ping.
pub fn encode_pong() -> String {
    "3".to_string()
}

/// Socket.IO event on the default namespace, no ack requested.
pub fn encode_event<T: Serialize>(name: &str, payload: &T) -> Result<String, ProtocolError> {
    let body = serde_json::to_string(&(name, payload)).map_err(ProtocolError::Encode)?;
    Ok(format!("42{}", body))
}

/// Turn a configured server address into the Socket.IO WebSocket URL.
///
/// `http`/`https` map to `ws`/`wss`; a bare `host:port` is treated as `ws`.
pub fn websocket_url(endpoint: &str) -> Result<String, ProtocolError> {
    let endpoint = endpoint.trim();
    let (scheme, rest) = match endpoint.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => ("ws".to_string(), endpoint),
    };

    let ws_scheme = match scheme.as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(ProtocolError::UnsupportedScheme(endpoint.to_string())),
    };

    Ok(format!(
        "{}://{}{}",
        ws_scheme,
        rest.trim_end_matches('/'),
        SOCKET_IO_PATH
    ))
}

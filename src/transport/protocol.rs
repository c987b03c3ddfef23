//! Socket.IO v4 packets carried in Engine.IO v4 text frames.
//!
//! Only the subset the server speaks to us is supported:
//!
//! | Frame                   | Packet                    |
//! |-------------------------|---------------------------|
//! | `0{...}`                | Engine.IO open            |
//! | `1`                     | Engine.IO close           |
//! | `2` / `3`               | ping / pong               |
//! | `6`                     | noop                      |
//! | `40/ns,{...}`           | namespace connected       |
//! | `41/ns,`                | namespace disconnected    |
//! | `42/ns,["name", data]`  | event                     |
//! | `44/ns,{"message": ..}` | namespace connect refused |
//!
//! The root namespace `/` is written without the `/ns,` prefix.

use serde_json::Value;
use thiserror::Error;

/// Errors raised while decoding frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Empty frame")]
    Empty,

    #[error("Unknown packet type: {0}")]
    UnknownPacket(String),

    #[error("Malformed event: {0}")]
    InvalidEvent(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

pub const ROOT_NAMESPACE: &str = "/";

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Open(Value),
    Close,
    Ping,
    Pong,
    Noop,
    Connect { namespace: String, data: Option<Value> },
    Disconnect { namespace: String },
    Event { namespace: String, name: String, data: Value },
    ConnectError { namespace: String, message: String },
}

impl Packet {
    pub fn connect(namespace: impl Into<String>) -> Self {
        Packet::Connect {
            namespace: namespace.into(),
            data: None,
        }
    }

    pub fn disconnect(namespace: impl Into<String>) -> Self {
        Packet::Disconnect {
            namespace: namespace.into(),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(data) => format!("0{}", data),
            Packet::Close => "1".to_string(),
            Packet::Ping => "2".to_string(),
            Packet::Pong => "3".to_string(),
            Packet::Noop => "6".to_string(),
            Packet::Connect { namespace, data } => {
                let data = data.as_ref().map(Value::to_string).unwrap_or_default();
                format!("40{}{}", namespace_prefix(namespace), data)
            }
            Packet::Disconnect { namespace } => format!("41{}", namespace_prefix(namespace)),
            Packet::Event { namespace, name, data } => {
                let body = Value::Array(vec![Value::String(name.clone()), data.clone()]);
                format!("42{}{}", namespace_prefix(namespace), body)
            }
            Packet::ConnectError { namespace, message } => {
                let body = serde_json::json!({ "message": message });
                format!("44{}{}", namespace_prefix(namespace), body)
            }
        }
    }

    pub fn decode(frame: &str) -> ProtocolResult<Packet> {
        let mut chars = frame.chars();
        let kind = chars.next().ok_or(ProtocolError::Empty)?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '6' => Ok(Packet::Noop),
            '4' => decode_message(rest),
            other => Err(ProtocolError::UnknownPacket(other.to_string())),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            Packet::Connect { namespace, .. }
            | Packet::Disconnect { namespace }
            | Packet::Event { namespace, .. }
            | Packet::ConnectError { namespace, .. } => Some(namespace),
            _ => None,
        }
    }
}

fn namespace_prefix(namespace: &str) -> String {
    if namespace == ROOT_NAMESPACE || namespace.is_empty() {
        String::new()
    } else {
        format!("{},", namespace)
    }
}

/// `namespace` and the remainder of a Socket.IO packet body
fn split_namespace(body: &str) -> (String, &str) {
    if !body.starts_with('/') {
        return (ROOT_NAMESPACE.to_string(), body);
    }
    match body.find(',') {
        Some(idx) => (body[..idx].to_string(), &body[idx + 1..]),
        None => (body.to_string(), ""),
    }
}

fn decode_message(body: &str) -> ProtocolResult<Packet> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(ProtocolError::Empty)?;
    let (namespace, rest) = split_namespace(chars.as_str());

    match kind {
        '0' => {
            let data = if rest.is_empty() {
                None
            } else {
                Some(serde_json::from_str(rest)?)
            };
            Ok(Packet::Connect { namespace, data })
        }
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            // Skip an ack id if the server asked for one
            let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());
            let (name, data) = decode_event(rest)?;
            Ok(Packet::Event { namespace, name, data })
        }
        '4' => {
            let value: Value = serde_json::from_str(rest)?;
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("connection refused")
                .to_string();
            Ok(Packet::ConnectError { namespace, message })
        }
        other => Err(ProtocolError::UnknownPacket(format!("4{}", other))),
    }
}

fn decode_event(body: &str) -> ProtocolResult<(String, Value)> {
    let value: Value = serde_json::from_str(body)?;
    let Value::Array(mut items) = value else {
        return Err(ProtocolError::InvalidEvent(body.to_string()));
    };
    if items.is_empty() {
        return Err(ProtocolError::InvalidEvent(body.to_string()));
    }

    let name = match items.remove(0) {
        Value::String(name) => name,
        _ => return Err(ProtocolError::InvalidEvent(body.to_string())),
    };
    let data = if items.is_empty() {
        Value::Null
    } else {
        unwrap_payload(items.remove(0))
    };
    Ok((name, data))
}

/// The server sends most payloads as JSON text inside the JSON array
fn unwrap_payload(data: Value) -> Value {
    match data {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

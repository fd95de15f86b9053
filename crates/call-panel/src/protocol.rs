//! Engine.IO v4 / Socket.IO v5 text framing.
//!
//! Engine.IO wraps every WebSocket text frame with a one-digit packet type. A `message`
//! packet (`4`) carries a Socket.IO packet, itself prefixed with a packet type, an optional
//! namespace (`/ns,`), an optional ack id and a JSON payload:
//!
//! ```text
//! 0{"sid":"..","pingInterval":25000,...}   engine open
//! 2                                        engine ping
//! 40                                       socket connect, default namespace
//! 42["callPatient",{...}]                  socket event
//! 42/admin,7["event",1]                    event in /admin with ack id 7
//! ```
//!
//! Binary attachments (Socket.IO types 5 and 6) are not used by the call server and are
//! rejected.

use crate::error::{PanelError, PanelResult};
use serde::Deserialize;
use serde_json::Value;

/// Body of the Engine.IO `open` packet.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    #[serde(default)]
    pub max_payload: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
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
    /// # Errors
    ///
    /// Returns `PanelError::Protocol` for an empty frame, an unknown type or a malformed
    /// handshake.
    pub fn decode(frame: &str) -> PanelResult<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| PanelError::Protocol("empty engine packet".into()))?;
        let body = chars.as_str();
        Ok(match kind {
            '0' => EnginePacket::Open(
                serde_json::from_str(body)
                    .map_err(|e| PanelError::Protocol(format!("bad handshake: {e}")))?,
            ),
            '1' => EnginePacket::Close,
            '2' => EnginePacket::Ping(body.to_string()),
            '3' => EnginePacket::Pong(body.to_string()),
            '4' => EnginePacket::Message(body.to_string()),
            '5' => EnginePacket::Upgrade,
            '6' => EnginePacket::Noop,
            other => {
                return Err(PanelError::Protocol(format!(
                    "unknown engine packet type {other:?}"
                )))
            }
        })
    }

    /// Frames sent by a client. `Open` never is, so it encodes as its bare type.
    pub fn encode(&self) -> String {
        match self {
            EnginePacket::Open(_) => "0".to_string(),
            EnginePacket::Close => "1".to_string(),
            EnginePacket::Ping(body) => format!("2{body}"),
            EnginePacket::Pong(body) => format!("3{body}"),
            EnginePacket::Message(body) => format!("4{body}"),
            EnginePacket::Upgrade => "5".to_string(),
            EnginePacket::Noop => "6".to_string(),
        }
    }
}

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Clone, Debug, PartialEq)]
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
        id: Option<u64>,
        data: Value,
    },
    Ack {
        namespace: String,
        id: u64,
        data: Value,
    },
    ConnectError {
        namespace: String,
        data: Option<Value>,
    },
}

impl SocketPacket {
    pub fn connect() -> Self {
        SocketPacket::Connect {
            namespace: DEFAULT_NAMESPACE.to_string(),
            data: None,
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            SocketPacket::Connect { namespace, .. }
            | SocketPacket::Disconnect { namespace }
            | SocketPacket::Event { namespace, .. }
            | SocketPacket::Ack { namespace, .. }
            | SocketPacket::ConnectError { namespace, .. } => namespace,
        }
    }

    /// Event name and arguments, for `Event` packets shaped `["name", ...args]`.
    pub fn event(&self) -> Option<(&str, &[Value])> {
        let SocketPacket::Event { data, .. } = self else {
            return None;
        };
        let (name, args) = data.as_array()?.split_first()?;
        Some((name.as_str()?, args))
    }

    /// # Errors
    ///
    /// Returns `PanelError::Protocol` for unknown or binary packet types, a missing event
    /// payload, or JSON that does not parse.
    pub fn decode(payload: &str) -> PanelResult<Self> {
        let mut chars = payload.chars();
        let kind = chars
            .next()
            .ok_or_else(|| PanelError::Protocol("empty socket packet".into()))?;
        let mut rest = chars.as_str();

        let namespace = if rest.starts_with('/') {
            let end = rest.find(',').unwrap_or(rest.len());
            let namespace = rest[..end].to_string();
            rest = rest.get(end + 1..).unwrap_or("");
            namespace
        } else {
            DEFAULT_NAMESPACE.to_string()
        };

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse()
                .map_err(|_| PanelError::Protocol("ack id out of range".into()))?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data: Option<Value> = if rest.is_empty() {
            None
        } else {
            Some(
                serde_json::from_str(rest)
                    .map_err(|e| PanelError::Protocol(format!("bad socket payload: {e}")))?,
            )
        };

        Ok(match kind {
            '0' => SocketPacket::Connect { namespace, data },
            '1' => SocketPacket::Disconnect { namespace },
            '2' => SocketPacket::Event {
                namespace,
                id,
                data: data.ok_or_else(|| PanelError::Protocol("event without payload".into()))?,
            },
            '3' => SocketPacket::Ack {
                namespace,
                id: id.ok_or_else(|| PanelError::Protocol("ack without id".into()))?,
                data: data.unwrap_or(Value::Array(Vec::new())),
            },
            '4' => SocketPacket::ConnectError { namespace, data },
            '5' | '6' => {
                return Err(PanelError::Protocol(
                    "binary socket packets are not supported".into(),
                ))
            }
            other => {
                return Err(PanelError::Protocol(format!(
                    "unknown socket packet type {other:?}"
                )))
            }
        })
    }

    /// Encodes the packet without its Engine.IO prefix.
    pub fn encode(&self) -> String {
        let (kind, id, data) = match self {
            SocketPacket::Connect { data, .. } => ('0', None, data.as_ref()),
            SocketPacket::Disconnect { .. } => ('1', None, None),
            SocketPacket::Event { id, data, .. } => ('2', *id, Some(data)),
            SocketPacket::Ack { id, data, .. } => ('3', Some(*id), Some(data)),
            SocketPacket::ConnectError { data, .. } => ('4', None, data.as_ref()),
        };

        let mut out = String::from(kind);
        let namespace = self.namespace();
        if namespace != DEFAULT_NAMESPACE {
            out.push_str(namespace);
            out.push(',');
        }
        if let Some(id) = id {
            out.push_str(&id.to_string());
        }
        if let Some(data) = data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Encodes the packet as a complete Engine.IO `message` frame.
    pub fn to_frame(&self) -> String {
        EnginePacket::Message(self.encode()).encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open_handshake() {
        let packet = EnginePacket::decode(
            r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        )
        .expect("handshake should decode");
        let EnginePacket::Open(handshake) = packet else {
            panic!("expected open packet");
        };
        assert_eq!(handshake.ping_interval, 25000);
        assert_eq!(handshake.max_payload, Some(1_000_000));
    }

    #[test]
    fn test_decode_engine_control_packets() {
        assert_eq!(
            EnginePacket::decode("2").expect("ping"),
            EnginePacket::Ping(String::new())
        );
        assert_eq!(
            EnginePacket::decode("2probe").expect("probe"),
            EnginePacket::Ping("probe".into())
        );
        assert_eq!(EnginePacket::decode("6").expect("noop"), EnginePacket::Noop);
        assert!(EnginePacket::decode("").is_err());
        assert!(EnginePacket::decode("9").is_err());
        assert!(EnginePacket::decode("0{not json").is_err());
    }

    #[test]
    fn test_client_frames() {
        assert_eq!(SocketPacket::connect().to_frame(), "40");
        assert_eq!(EnginePacket::Pong(String::new()).encode(), "3");
    }

    #[test]
    fn test_decode_call_event() {
        let packet = SocketPacket::decode(r#"2["callPatient",{"id":3,"officeNumber":4}]"#)
            .expect("event should decode");
        let (name, args) = packet.event().expect("event shape");
        assert_eq!(name, "callPatient");
        assert_eq!(args, &[json!({"id": 3, "officeNumber": 4})]);
        assert_eq!(packet.namespace(), "/");
    }

    #[test]
    fn test_decode_namespace_and_ack_id() {
        let packet = SocketPacket::decode(r#"2/admin,12["ping",1]"#).expect("should decode");
        assert_eq!(
            packet,
            SocketPacket::Event {
                namespace: "/admin".into(),
                id: Some(12),
                data: json!(["ping", 1]),
            }
        );
        assert_eq!(packet.encode(), r#"2/admin,12["ping",1]"#);
    }

    #[test]
    fn test_decode_connect_variants() {
        assert_eq!(
            SocketPacket::decode(r#"0{"sid":"abc"}"#).expect("connect"),
            SocketPacket::Connect {
                namespace: "/".into(),
                data: Some(json!({"sid": "abc"})),
            }
        );
        assert!(matches!(
            SocketPacket::decode(r#"4{"message":"Not authorized"}"#).expect("connect error"),
            SocketPacket::ConnectError { .. }
        ));
        assert_eq!(
            SocketPacket::decode("1/admin,").expect("disconnect"),
            SocketPacket::Disconnect {
                namespace: "/admin".into()
            }
        );
    }

    #[test]
    fn test_rejects_binary_and_empty_events() {
        assert!(SocketPacket::decode(r#"51-["file",{"_placeholder":true,"num":0}]"#).is_err());
        assert!(SocketPacket::decode("2").is_err());
        assert!(SocketPacket::decode("").is_err());
    }
}

//! Real-time call notifications over Socket.IO.
//!
//! [`RealtimeClient`] keeps one WebSocket connection to the call server, speaks just enough
//! Engine.IO/Socket.IO to join the default namespace and stay alive, and hands every
//! `callPatient` event to a single callback. A server that goes quiet for longer than its
//! announced ping interval plus ping timeout counts as dropped. When the connection drops it
//! waits a fixed delay and reconnects; there is no backoff and no deduplication at this layer.

use crate::error::{PanelError, PanelResult};
use crate::protocol::{EnginePacket, Handshake, SocketPacket, DEFAULT_NAMESPACE};
use clinic_core::{CallEvent, Patient, Url};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Event name emitted by the server when a doctor calls a patient.
pub const CALL_EVENT: &str = "callPatient";

/// Socket.IO client default.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Conectando...",
            ConnectionState::Connected => "Conectado",
            ConnectionState::Disconnected => "Desconectado",
        }
    }
}

/// The fields of a called attendance the panel needs. Anything else the server sends is
/// ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallPayload {
    id: i64,
    patient: Patient,
    #[serde(default)]
    office_number: Option<u32>,
}

/// `http(s)://host/...` to `ws(s)://host/socket.io/?EIO=4&transport=websocket`.
///
/// # Errors
///
/// Returns `PanelError::Url` for schemes other than http, https, ws and wss.
pub fn socket_url(base: &Url) -> PanelResult<String> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(PanelError::Url(format!("unsupported scheme {other:?}"))),
    };
    let host = base
        .host_str()
        .ok_or_else(|| PanelError::Url(format!("{base} has no host")))?;
    let port = base.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = base.path().trim_end_matches('/');
    Ok(format!(
        "{scheme}://{host}{port}{path}/socket.io/?EIO=4&transport=websocket"
    ))
}

/// Decodes the first argument of a `callPatient` event.
///
/// # Errors
///
/// Returns `PanelError::Protocol` when the argument is missing or not an attendance.
pub fn decode_call(args: &[Value], sequence: u64) -> PanelResult<CallEvent> {
    let first = args
        .first()
        .ok_or_else(|| PanelError::Protocol("callPatient without payload".into()))?;
    let payload: CallPayload = serde_json::from_value(first.clone())
        .map_err(|e| PanelError::Protocol(format!("bad callPatient payload: {e}")))?;
    Ok(CallEvent {
        sequence,
        attendance_id: payload.id,
        patient: payload.patient,
        office_number: payload.office_number,
    })
}

type CallHandler = Box<dyn FnMut(CallEvent) + Send>;

/// Handle to the background connection task.
pub struct RealtimeClient {
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RealtimeClient {
    /// Starts connecting to the call server at `base`.
    ///
    /// # Errors
    ///
    /// Returns `PanelError::Url` if `base` cannot be turned into a socket URL.
    pub fn connect<F>(base: &Url, reconnect_delay: Duration, on_call: F) -> PanelResult<Self>
    where
        F: FnMut(CallEvent) + Send + 'static,
    {
        let url = socket_url(base)?;
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(
            url,
            reconnect_delay,
            Box::new(on_call),
            state_tx,
            shutdown_rx,
        ));
        Ok(Self {
            state,
            shutdown,
            task,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// A receiver that is notified on every connection state change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Closes the connection and stops reconnecting.
    pub async fn close(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("real-time task ended abnormally: {}", e);
        }
    }
}

async fn run(
    url: String,
    reconnect_delay: Duration,
    mut on_call: CallHandler,
    state: watch::Sender<ConnectionState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sequence = 0u64;
    loop {
        state.send_replace(ConnectionState::Connecting);
        tokio::select! {
            result = session(&url, &mut on_call, &state, &mut sequence) => match result {
                Ok(()) => tracing::info!("call server closed the connection"),
                Err(e) => tracing::warn!("call server connection lost: {}", e),
            },
            _ = shutdown.changed() => break,
        }

        state.send_replace(ConnectionState::Disconnected);
        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }
    state.send_replace(ConnectionState::Disconnected);
    tracing::info!("real-time client stopped");
}

/// What one Socket.IO packet means for the connection.
#[derive(Debug)]
enum Inbound {
    Joined,
    Closed,
    Refused(Value),
    Call(CallEvent),
    Ignored,
}

/// Interprets a packet for the default namespace. Packets for any other namespace are ignored;
/// `sequence` only advances when a call decodes.
fn inbound(packet: SocketPacket, sequence: &mut u64) -> Inbound {
    if packet.namespace() != DEFAULT_NAMESPACE {
        tracing::debug!("ignoring packet for namespace {}", packet.namespace());
        return Inbound::Ignored;
    }
    match packet {
        SocketPacket::Connect { .. } => Inbound::Joined,
        SocketPacket::Disconnect { .. } => Inbound::Closed,
        SocketPacket::ConnectError { data, .. } => Inbound::Refused(data.unwrap_or(Value::Null)),
        packet => match packet.event() {
            Some((CALL_EVENT, args)) => match decode_call(args, *sequence + 1) {
                Ok(event) => {
                    *sequence = event.sequence;
                    Inbound::Call(event)
                }
                Err(e) => {
                    tracing::warn!("dropping call event: {}", e);
                    Inbound::Ignored
                }
            },
            _ => Inbound::Ignored,
        },
    }
}

/// Time without any frame after which the server is considered gone.
fn liveness_window(handshake: &Handshake) -> Duration {
    Duration::from_millis(handshake.ping_interval.saturating_add(handshake.ping_timeout))
}

async fn session(
    url: &str,
    on_call: &mut CallHandler,
    state: &watch::Sender<ConnectionState>,
    sequence: &mut u64,
) -> PanelResult<()> {
    let (socket, _) = connect_async(url).await?;
    let (mut sink, mut stream) = socket.split();
    tracing::debug!("websocket open, waiting for handshake");

    // Unbounded until the handshake announces the ping schedule.
    let mut liveness: Option<Duration> = None;
    loop {
        let frame = match liveness {
            Some(window) => tokio::time::timeout(window, stream.next())
                .await
                .map_err(|_| {
                    PanelError::Protocol(format!(
                        "no frame from server in {} ms",
                        window.as_millis()
                    ))
                })?,
            None => stream.next().await,
        };
        let Some(frame) = frame else {
            return Ok(());
        };
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => return Ok(()),
            _ => continue,
        };

        let packet = match EnginePacket::decode(&text) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::warn!("ignoring malformed engine frame: {}", e);
                continue;
            }
        };
        match packet {
            EnginePacket::Open(handshake) => {
                tracing::debug!(
                    "engine session {} opened, ping interval {} ms",
                    handshake.sid,
                    handshake.ping_interval
                );
                liveness = Some(liveness_window(&handshake));
                sink.send(Message::Text(SocketPacket::connect().to_frame()))
                    .await?;
            }
            EnginePacket::Ping(body) => {
                sink.send(Message::Text(EnginePacket::Pong(body).encode()))
                    .await?;
            }
            EnginePacket::Close => return Ok(()),
            EnginePacket::Message(payload) => {
                let packet = match SocketPacket::decode(&payload) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::warn!("ignoring malformed socket packet: {}", e);
                        continue;
                    }
                };
                match inbound(packet, sequence) {
                    Inbound::Joined => {
                        tracing::info!("connected to call server");
                        state.send_replace(ConnectionState::Connected);
                    }
                    Inbound::Closed => return Ok(()),
                    Inbound::Refused(data) => {
                        return Err(PanelError::Protocol(format!("connection refused: {data}")));
                    }
                    Inbound::Call(event) => {
                        tracing::info!(
                            "call {} received for attendance {}",
                            event.sequence,
                            event.attendance_id
                        );
                        on_call(event);
                    }
                    Inbound::Ignored => {}
                }
            }
            EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_socket_url_maps_scheme_and_path() {
        let url = Url::parse("http://localhost:5000").expect("valid url");
        assert_eq!(
            socket_url(&url).expect("should build"),
            "ws://localhost:5000/socket.io/?EIO=4&transport=websocket"
        );
        let url = Url::parse("https://clinic.example/realtime/").expect("valid url");
        assert_eq!(
            socket_url(&url).expect("should build"),
            "wss://clinic.example/realtime/socket.io/?EIO=4&transport=websocket"
        );
        let url = Url::parse("ftp://clinic.example").expect("valid url");
        assert!(socket_url(&url).is_err());
    }

    #[test]
    fn test_decode_call_tolerates_partial_attendance() {
        let args = [json!({
            "id": 3,
            "patient": {"id": 7, "fullName": "MARIA SILVA", "cpf": "52998224725", "birthDate": "1990-05-17"},
            "officeNumber": 4,
            "status": "IN_PROGRESS"
        })];
        let event = decode_call(&args, 9).expect("should decode");
        assert_eq!(event.sequence, 9);
        assert_eq!(event.attendance_id, 3);
        assert_eq!(event.office_number, Some(4));
        assert_eq!(event.announcement(), "MARIA SILVA, compareça ao consultório 4");
    }

    #[test]
    fn test_decode_call_rejects_missing_patient() {
        assert!(decode_call(&[json!({"id": 3})], 1).is_err());
        assert!(decode_call(&[], 1).is_err());
    }

    #[test]
    fn test_connection_labels() {
        assert_eq!(ConnectionState::Connected.label(), "Conectado");
        assert_eq!(ConnectionState::Connecting.label(), "Conectando...");
        assert_eq!(ConnectionState::Disconnected.label(), "Desconectado");
    }

    fn packet(payload: &str) -> SocketPacket {
        SocketPacket::decode(payload).expect("valid socket packet")
    }

    const CALL: &str = r#"2["callPatient",{"id":3,"patient":{"id":7,"fullName":"MARIA SILVA","cpf":"52998224725","birthDate":"1990-05-17"},"officeNumber":4}]"#;

    #[test]
    fn test_inbound_ignores_other_namespaces() {
        let mut sequence = 4;
        assert!(matches!(
            inbound(packet("0/admin,{\"sid\":\"x\"}"), &mut sequence),
            Inbound::Ignored
        ));
        assert!(matches!(
            inbound(packet("1/admin,"), &mut sequence),
            Inbound::Ignored
        ));
        assert!(matches!(
            inbound(packet("4/admin,{\"message\":\"no\"}"), &mut sequence),
            Inbound::Ignored
        ));
        let foreign_call = format!("2/admin,{}", &CALL[1..]);
        assert!(matches!(
            inbound(packet(&foreign_call), &mut sequence),
            Inbound::Ignored
        ));
        assert_eq!(sequence, 4);
    }

    #[test]
    fn test_inbound_default_namespace() {
        let mut sequence = 4;
        assert!(matches!(
            inbound(packet("0{\"sid\":\"x\"}"), &mut sequence),
            Inbound::Joined
        ));
        assert!(matches!(inbound(packet("1"), &mut sequence), Inbound::Closed));
        assert!(matches!(
            inbound(packet("4{\"message\":\"no\"}"), &mut sequence),
            Inbound::Refused(_)
        ));
        assert!(matches!(
            inbound(packet(r#"2["callPatient",{"id":1}]"#), &mut sequence),
            Inbound::Ignored
        ));
        assert_eq!(sequence, 4);

        match inbound(packet(CALL), &mut sequence) {
            Inbound::Call(event) => {
                assert_eq!(event.sequence, 5);
                assert_eq!(event.attendance_id, 3);
            }
            other => panic!("expected a call, got {other:?}"),
        }
        assert_eq!(sequence, 5);
    }

    #[test]
    fn test_liveness_window_adds_interval_and_timeout() {
        let handshake = Handshake {
            sid: "s".into(),
            upgrades: Vec::new(),
            ping_interval: 25_000,
            ping_timeout: 20_000,
            max_payload: None,
        };
        assert_eq!(liveness_window(&handshake), Duration::from_secs(45));
    }
}

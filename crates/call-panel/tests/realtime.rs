use call_panel::realtime::socket_url;
use call_panel::{ConnectionState, RealtimeClient};
use clinic_core::{CallEvent, Url};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::error::UrlError;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};

const OPEN: &str =
    r#"0{"sid":"test-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

const OPEN_SHORT_PING: &str =
    r#"0{"sid":"quiet-sid","upgrades":[],"pingInterval":100,"pingTimeout":100,"maxPayload":1000000}"#;

const WAIT: Duration = Duration::from_secs(5);

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("client should send a frame")
            .expect("stream should stay open")
            .expect("frame should be valid");
        if let Message::Text(text) = frame {
            return text;
        }
    }
}

async fn accept_session(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    accept_session_with(listener, OPEN).await
}

async fn accept_session_with(listener: &TcpListener, open: &str) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("client should connect")
        .expect("accept should succeed");
    let mut ws = accept_async(stream)
        .await
        .expect("websocket handshake should succeed");
    ws.send(Message::Text(open.into()))
        .await
        .expect("open should send");
    assert_eq!(next_text(&mut ws).await, "40");
    ws.send(Message::Text(r#"40{"sid":"socket-sid"}"#.into()))
        .await
        .expect("connect ack should send");
    ws
}

async fn wait_state(rx: &mut watch::Receiver<ConnectionState>, target: ConnectionState) {
    timeout(WAIT, async {
        while *rx.borrow_and_update() != target {
            rx.changed().await.expect("client should still be running");
        }
    })
    .await
    .expect("state should be reached");
}

async fn next_call(rx: &mut mpsc::UnboundedReceiver<CallEvent>) -> CallEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("call should arrive")
        .expect("channel should be open")
}

fn call_frame(attendance: i64, office: u32) -> String {
    format!(
        r#"42["callPatient",{{"id":{attendance},"patient":{{"id":7,"fullName":"MARIA SILVA","cpf":"52998224725","birthDate":"1990-05-17"}},"status":"IN_PROGRESS","createdAt":"2024-03-01T12:00:00Z","officeNumber":{office}}}]"#
    )
}

#[tokio::test]
async fn test_handshake_ping_events_and_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind ephemeral port");
    let base = Url::parse(&format!(
        "http://{}",
        listener.local_addr().expect("listener has an address")
    ))
    .expect("valid url");

    let (calls_tx, mut calls) = mpsc::unbounded_channel();
    let client = RealtimeClient::connect(&base, Duration::from_millis(50), move |event| {
        let _ = calls_tx.send(event);
    })
    .expect("client should start");
    let mut state = client.subscribe();

    let mut ws = accept_session(&listener).await;
    wait_state(&mut state, ConnectionState::Connected).await;

    ws.send(Message::Text("2".into())).await.expect("ping should send");
    assert_eq!(next_text(&mut ws).await, "3");

    ws.send(Message::Text("x".into()))
        .await
        .expect("garbage frame should send");
    ws.send(Message::Text(r#"42["callPatient",{"id":1}]"#.into()))
        .await
        .expect("bad event should send");
    ws.send(Message::Text(r#"42["somethingElse",{}]"#.into()))
        .await
        .expect("other event should send");
    ws.send(Message::Text(call_frame(3, 4)))
        .await
        .expect("event should send");

    // The garbage frame did not cost the connection.
    let first = next_call(&mut calls).await;
    assert_eq!(first.sequence, 1);
    assert_eq!(first.attendance_id, 3);
    assert_eq!(first.office_number, Some(4));

    ws.close(None).await.expect("close should send");
    drop(ws);

    let mut ws = accept_session(&listener).await;
    wait_state(&mut state, ConnectionState::Connected).await;
    ws.send(Message::Text(call_frame(3, 4)))
        .await
        .expect("event should send");

    let repeat = next_call(&mut calls).await;
    assert_eq!(repeat.sequence, 2);
    assert_eq!(repeat.attendance_id, 3);

    client.close().await;
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_silent_server_is_dropped_after_ping_window() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind ephemeral port");
    let base = Url::parse(&format!(
        "http://{}",
        listener.local_addr().expect("listener has an address")
    ))
    .expect("valid url");

    let client = RealtimeClient::connect(&base, Duration::from_millis(50), |_| {})
        .expect("client should start");
    let mut state = client.subscribe();

    // Connected, then no pings: the socket stays open but the server says nothing.
    let quiet = accept_session_with(&listener, OPEN_SHORT_PING).await;
    wait_state(&mut state, ConnectionState::Connected).await;

    let _second = accept_session(&listener).await;
    wait_state(&mut state, ConnectionState::Connected).await;

    drop(quiet);
    client.close().await;
}

#[tokio::test]
async fn test_secure_urls_attempt_tls() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind ephemeral port");
    let addr = listener.local_addr().expect("listener has an address");
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            drop(stream);
        }
    });

    let base = Url::parse(&format!("https://{addr}")).expect("valid url");
    let url = socket_url(&base).expect("should build");
    assert!(url.starts_with("wss://"));

    let err = timeout(WAIT, connect_async(url.as_str()))
        .await
        .expect("connect should finish")
        .expect_err("a plain TCP listener cannot complete a TLS handshake");
    assert!(
        !matches!(err, tungstenite::Error::Url(UrlError::TlsFeatureNotEnabled)),
        "wss should be supported, got {err:?}"
    );
}

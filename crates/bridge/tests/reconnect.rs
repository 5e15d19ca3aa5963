//! Bridge behavior against a real in-process WebSocket control plane:
//! registration, call correlation, disconnect buffering, heartbeats, and
//! reconnection.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    async_trait::async_trait,
    benchlink_bridge::{BridgeDelegate, ConnectionBridge, ConnectionState, Options},
    benchlink_events::{EventBus, EventKind, RuntimeEvent},
    benchlink_protocol::{Envelope, EnvelopeType, decode},
    futures::{SinkExt, StreamExt},
    serde_json::{Value, json},
    tokio::net::{TcpListener, TcpStream},
    tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message},
};

// ── Harness ─────────────────────────────────────────────────────────────────

struct NoopDelegate;

#[async_trait]
impl BridgeDelegate for NoopDelegate {
    async fn registration(&self) -> Value {
        json!({ "plugins": [] })
    }

    async fn handle(&self, _envelope: Envelope) -> Option<Envelope> {
        None
    }
}

struct EchoDelegate;

#[async_trait]
impl BridgeDelegate for EchoDelegate {
    async fn registration(&self) -> Value {
        json!({ "plugins": [] })
    }

    async fn handle(&self, envelope: Envelope) -> Option<Envelope> {
        Some(envelope.reply(json!({ "echoed": envelope.action })))
    }
}

fn options_for(addr: SocketAddr) -> Options {
    Options {
        url: format!("ws://{addr}"),
        // Long heartbeats so they stay out of the way unless a test
        // shortens them on purpose.
        heartbeat_interval: Duration::from_secs(60),
        heartbeat_timeout: Duration::from_secs(60),
        backoff_initial: Duration::from_millis(50),
        backoff_max: Duration::from_millis(200),
        outbound_buffer: 16,
        call_timeout: Duration::from_secs(2),
    }
}

async fn bind() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn accept_one(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_envelope(ws: &mut WebSocketStream<TcpStream>) -> Envelope {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .unwrap()
        {
            Some(Ok(Message::Text(text))) => return decode(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("connection ended unexpectedly: {other:?}"),
        }
    }
}

async fn send_envelope(ws: &mut WebSocketStream<TcpStream>, envelope: &Envelope) {
    ws.send(Message::Text(
        serde_json::to_string(envelope).unwrap().into(),
    ))
    .await
    .unwrap();
}

async fn wait_for_state(bridge: &ConnectionBridge, target: ConnectionState) {
    let mut rx = bridge.state_stream();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *rx.borrow() == target {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

fn message(action: &str) -> Envelope {
    Envelope::new(EnvelopeType::PluginMessage, "container-tool").with_action(action)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn registers_on_connect_and_correlates_calls() {
    let (listener, addr) = bind().await;
    let bridge = ConnectionBridge::spawn(
        options_for(addr),
        Arc::new(NoopDelegate),
        Arc::new(EventBus::new()),
    );

    let mut ws = accept_one(&listener).await;
    let registration = next_envelope(&mut ws).await;
    assert_eq!(registration.r#type, EnvelopeType::Registration);
    assert!(registration.payload["plugins"].is_array());

    wait_for_state(&bridge, ConnectionState::Connected).await;

    let request = message("listContainers");
    let request_id = request.id.clone();
    let caller = {
        let bridge = bridge.clone();
        tokio::spawn(async move { bridge.call(request).await })
    };

    let seen = next_envelope(&mut ws).await;
    assert_eq!(seen.id, request_id);
    send_envelope(&mut ws, &seen.reply(json!({ "containers": [] }))).await;

    let response = caller.await.unwrap().unwrap();
    assert_eq!(response.id, request_id);
    assert!(response.payload["containers"].is_array());
}

#[tokio::test]
async fn call_timeout_cancels_only_the_wait() {
    let (listener, addr) = bind().await;
    let options = Options {
        call_timeout: Duration::from_millis(150),
        ..options_for(addr)
    };
    let bridge = ConnectionBridge::spawn(options, Arc::new(NoopDelegate), Arc::new(EventBus::new()));

    let mut ws = accept_one(&listener).await;
    let _registration = next_envelope(&mut ws).await;
    wait_for_state(&bridge, ConnectionState::Connected).await;

    // The server reads the request but never answers.
    let err = bridge.call(message("slowAction")).await.unwrap_err();
    assert!(matches!(
        err,
        benchlink_bridge::Error::CallTimeout { .. }
    ));
    // The connection itself is unaffected.
    assert_eq!(bridge.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn buffers_while_down_and_flushes_in_order_exactly_once() {
    let (listener, addr) = bind().await;
    let bridge = ConnectionBridge::spawn(
        options_for(addr),
        Arc::new(NoopDelegate),
        Arc::new(EventBus::new()),
    );

    // First connection: take the registration, then hang up.
    {
        let mut ws = accept_one(&listener).await;
        let _registration = next_envelope(&mut ws).await;
        wait_for_state(&bridge, ConnectionState::Connected).await;
    }
    wait_for_state(&bridge, ConnectionState::BackoffWait).await;

    for action in ["first", "second", "third"] {
        bridge.send(message(action)).unwrap();
    }

    // Second connection: registration, then the buffer in original order.
    let mut ws = accept_one(&listener).await;
    let registration = next_envelope(&mut ws).await;
    assert_eq!(registration.r#type, EnvelopeType::Registration);

    let mut actions = Vec::new();
    for _ in 0..3 {
        actions.push(next_envelope(&mut ws).await.action);
    }
    assert_eq!(actions, vec!["first", "second", "third"]);

    // Nothing is delivered twice.
    let extra = tokio::time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(extra.is_err(), "unexpected duplicate frame: {extra:?}");
}

#[tokio::test]
async fn overflow_drops_oldest_and_reports_it() {
    let (listener, addr) = bind().await;
    let options = Options {
        outbound_buffer: 2,
        // A wide backoff window so all three sends land in the bounded
        // buffer while the bridge is waiting to reconnect.
        backoff_initial: Duration::from_millis(500),
        backoff_max: Duration::from_millis(500),
        ..options_for(addr)
    };
    let bus = Arc::new(EventBus::new());
    let dropped = Arc::new(Mutex::new(Vec::new()));
    {
        let dropped = Arc::clone(&dropped);
        bus.subscribe(EventKind::OutboundDropped, move |event| {
            if let RuntimeEvent::OutboundDropped { envelope_id } = event {
                dropped.lock().unwrap().push(envelope_id.clone());
            }
            Ok(())
        });
    }
    let bridge = ConnectionBridge::spawn(options, Arc::new(NoopDelegate), Arc::clone(&bus));

    {
        let mut ws = accept_one(&listener).await;
        let _registration = next_envelope(&mut ws).await;
        wait_for_state(&bridge, ConnectionState::Connected).await;
    }
    wait_for_state(&bridge, ConnectionState::BackoffWait).await;

    let first = message("first");
    let first_id = first.id.clone();
    bridge.send(first).unwrap();
    bridge.send(message("second")).unwrap();
    bridge.send(message("third")).unwrap();

    let mut ws = accept_one(&listener).await;
    let _registration = next_envelope(&mut ws).await;
    let mut actions = Vec::new();
    for _ in 0..2 {
        actions.push(next_envelope(&mut ws).await.action);
    }
    assert_eq!(actions, vec!["second", "third"]);
    assert_eq!(*dropped.lock().unwrap(), vec![first_id]);
}

#[tokio::test]
async fn inbound_requests_route_through_the_delegate() {
    let (listener, addr) = bind().await;
    let bridge = ConnectionBridge::spawn(
        options_for(addr),
        Arc::new(EchoDelegate),
        Arc::new(EventBus::new()),
    );

    let mut ws = accept_one(&listener).await;
    let _registration = next_envelope(&mut ws).await;
    wait_for_state(&bridge, ConnectionState::Connected).await;

    let request = message("calibrate");
    send_envelope(&mut ws, &request).await;

    let response = next_envelope(&mut ws).await;
    assert_eq!(response.id, request.id);
    assert_eq!(response.payload["echoed"], "calibrate");
}

#[tokio::test]
async fn control_plane_pings_are_echoed() {
    let (listener, addr) = bind().await;
    let _bridge = ConnectionBridge::spawn(
        options_for(addr),
        Arc::new(NoopDelegate),
        Arc::new(EventBus::new()),
    );

    let mut ws = accept_one(&listener).await;
    let _registration = next_envelope(&mut ws).await;

    let probe = Envelope::new(EnvelopeType::Ping, "");
    send_envelope(&mut ws, &probe).await;

    let ack = next_envelope(&mut ws).await;
    assert_eq!(ack.r#type, EnvelopeType::Ping);
    assert_eq!(ack.id, probe.id);
}

#[tokio::test]
async fn unacknowledged_heartbeat_forces_reconnect() {
    let (listener, addr) = bind().await;
    let options = Options {
        heartbeat_interval: Duration::from_millis(100),
        heartbeat_timeout: Duration::from_millis(80),
        ..options_for(addr)
    };
    let bridge = ConnectionBridge::spawn(options, Arc::new(NoopDelegate), Arc::new(EventBus::new()));

    // First connection never acknowledges the heartbeat ping.
    let mut ws = accept_one(&listener).await;
    let _registration = next_envelope(&mut ws).await;
    let ping = next_envelope(&mut ws).await;
    assert_eq!(ping.r#type, EnvelopeType::Ping);

    wait_for_state(&bridge, ConnectionState::BackoffWait).await;

    // The bridge comes back on its own.
    let mut ws2 = accept_one(&listener).await;
    let registration = next_envelope(&mut ws2).await;
    assert_eq!(registration.r#type, EnvelopeType::Registration);
    wait_for_state(&bridge, ConnectionState::Connected).await;
}

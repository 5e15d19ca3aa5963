//! The connection bridge: the single persistent WebSocket to the remote
//! control plane, with auto-reconnect, heartbeats, disconnect buffering,
//! and response correlation.
//!
//! Exactly one bridge exists per running process; every plugin's traffic
//! is multiplexed over it. Plugins never see transport failures — the
//! bridge absorbs them with backoff-and-retry.

pub mod backoff;
pub mod error;
pub mod outbound;
pub mod pending;

pub use error::{Error, Result};

use std::{fmt, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    benchlink_events::{EventBus, RuntimeEvent},
    benchlink_protocol::{self as protocol, Envelope, EnvelopeType},
    futures::{SinkExt, StreamExt},
    serde::Serialize,
    tokio::sync::{mpsc, watch},
    tokio_tungstenite::{connect_async, tungstenite::Message},
    tracing::{debug, info, warn},
};

use crate::{backoff::Backoff, outbound::OutboundQueue, pending::PendingCalls};

// ── Connection state ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    BackoffWait,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::BackoffWait => "backoff_wait",
        };
        f.write_str(s)
    }
}

// ── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub outbound_buffer: usize,
    pub call_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787/companion".into(),
            heartbeat_interval: Duration::from_millis(protocol::HEARTBEAT_INTERVAL_MS),
            heartbeat_timeout: Duration::from_millis(protocol::HEARTBEAT_TIMEOUT_MS),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            outbound_buffer: protocol::DEFAULT_OUTBOUND_BUFFER,
            call_timeout: Duration::from_millis(protocol::DEFAULT_CALL_TIMEOUT_MS),
        }
    }
}

// ── Delegate ────────────────────────────────────────────────────────────────

/// Inbound side of the bridge — the plugin manager, behind a trait so the
/// bridge stays transport-only.
#[async_trait]
pub trait BridgeDelegate: Send + Sync {
    /// Payload of the `registration` envelope sent on every (re)connect.
    async fn registration(&self) -> serde_json::Value;

    /// Handle one demultiplexed inbound envelope; the returned envelope
    /// (if any) is sent back out.
    async fn handle(&self, envelope: Envelope) -> Option<Envelope>;
}

// ── Bridge handle ───────────────────────────────────────────────────────────

/// Handle to the bridge task. Cheap to clone; the socket and loop behind
/// it stay singular.
#[derive(Clone)]
pub struct ConnectionBridge {
    outbound_tx: mpsc::UnboundedSender<Envelope>,
    pending: Arc<PendingCalls>,
    state_rx: watch::Receiver<ConnectionState>,
    call_timeout: Duration,
}

impl ConnectionBridge {
    /// Spawn the connection loop. Returns immediately; connection and
    /// reconnection happen in the background.
    #[must_use]
    pub fn spawn(options: Options, delegate: Arc<dyn BridgeDelegate>, bus: Arc<EventBus>) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let pending = Arc::new(PendingCalls::new());
        let call_timeout = options.call_timeout;

        tokio::spawn(connection_loop(
            options,
            delegate,
            bus,
            outbound_rx,
            outbound_tx.clone(),
            state_tx,
            Arc::clone(&pending),
        ));

        Self {
            outbound_tx,
            pending,
            state_rx,
            call_timeout,
        }
    }

    /// Queue an envelope for delivery. While disconnected it lands in the
    /// bounded disconnect buffer.
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        self.outbound_tx
            .send(envelope)
            .map_err(|_| Error::Closed)
    }

    /// Send an envelope and await the response correlated by its id.
    ///
    /// Timing out cancels only this wait; whatever work the remote side
    /// started continues and its late response is discarded.
    pub async fn call(&self, envelope: Envelope) -> Result<Envelope> {
        let id = envelope.id.clone();
        let rx = self.pending.register(id.clone()).await;

        if self.outbound_tx.send(envelope).is_err() {
            self.pending.abandon(&id).await;
            return Err(Error::Closed);
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                self.pending.abandon(&id).await;
                Err(Error::CallTimeout {
                    id,
                    timeout_ms: self.call_timeout.as_millis() as u64,
                })
            },
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch channel for state transitions.
    #[must_use]
    pub fn state_stream(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

// ── Connection loop ─────────────────────────────────────────────────────────

enum RunEnd {
    /// All bridge handles dropped; exit the loop for good.
    Shutdown,
    /// The control plane closed the connection cleanly; reconnect.
    Disconnected,
}

fn set_state(state_tx: &watch::Sender<ConnectionState>, bus: &EventBus, state: ConnectionState) {
    let changed = *state_tx.borrow() != state;
    if changed {
        let _ = state_tx.send(state);
        bus.emit(&RuntimeEvent::ConnectionStateChanged {
            state: state.to_string(),
        });
    }
}

fn buffer(queue: &mut OutboundQueue, bus: &EventBus, envelope: Envelope) {
    if let Some(dropped) = queue.push(envelope) {
        warn!(envelope_id = %dropped.id, "outbound buffer full, dropped oldest envelope");
        bus.emit(&RuntimeEvent::OutboundDropped {
            envelope_id: dropped.id,
        });
    }
}

async fn connection_loop(
    options: Options,
    delegate: Arc<dyn BridgeDelegate>,
    bus: Arc<EventBus>,
    mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
    outbound_tx: mpsc::UnboundedSender<Envelope>,
    state_tx: watch::Sender<ConnectionState>,
    pending: Arc<PendingCalls>,
) {
    let mut backoff = Backoff::new(options.backoff_initial, options.backoff_max);
    let mut queue = OutboundQueue::new(options.outbound_buffer);

    loop {
        set_state(&state_tx, &bus, ConnectionState::Connecting);
        info!(url = %options.url, "connecting to control plane");

        let run = connect_and_run(
            &options,
            &delegate,
            &bus,
            &state_tx,
            &mut outbound_rx,
            &outbound_tx,
            &mut queue,
            &pending,
            &mut backoff,
        )
        .await;

        match run {
            Ok(RunEnd::Shutdown) => {
                set_state(&state_tx, &bus, ConnectionState::Disconnected);
                info!("connection bridge shut down");
                return;
            },
            Ok(RunEnd::Disconnected) => debug!("connection closed by control plane"),
            Err(e) => warn!(error = %e, "connection error"),
        }

        set_state(&state_tx, &bus, ConnectionState::BackoffWait);
        let delay = backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");

        // Keep draining producers into the bounded disconnect buffer
        // while we wait out the backoff.
        let deadline = tokio::time::Instant::now() + delay;
        loop {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => break,
                maybe = outbound_rx.recv() => match maybe {
                    Some(envelope) => buffer(&mut queue, &bus, envelope),
                    None => {
                        set_state(&state_tx, &bus, ConnectionState::Disconnected);
                        info!("connection bridge shut down");
                        return;
                    },
                },
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn connect_and_run(
    options: &Options,
    delegate: &Arc<dyn BridgeDelegate>,
    bus: &Arc<EventBus>,
    state_tx: &watch::Sender<ConnectionState>,
    outbound_rx: &mut mpsc::UnboundedReceiver<Envelope>,
    outbound_tx: &mpsc::UnboundedSender<Envelope>,
    queue: &mut OutboundQueue,
    pending: &Arc<PendingCalls>,
    backoff: &mut Backoff,
) -> Result<RunEnd> {
    let (ws_stream, _response) = connect_async(&options.url).await?;
    let (mut ws_sink, mut ws_reader) = ws_stream.split();

    set_state(state_tx, bus, ConnectionState::Connected);
    backoff.reset();
    info!("connected to control plane");

    // Announce what this companion offers, then flush everything the
    // disconnection buffered, in original order, before new traffic.
    let registration = Envelope::new(EnvelopeType::Registration, "")
        .with_payload(delegate.registration().await);
    ws_sink
        .send(Message::Text(serde_json::to_string(&registration)?.into()))
        .await?;

    let buffered = queue.drain();
    if !buffered.is_empty() {
        info!(count = buffered.len(), "flushing buffered envelopes");
        for envelope in buffered {
            ws_sink
                .send(Message::Text(serde_json::to_string(&envelope)?.into()))
                .await?;
        }
    }

    let start = tokio::time::Instant::now();
    let mut heartbeat =
        tokio::time::interval_at(start + options.heartbeat_interval, options.heartbeat_interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut ack_check =
        tokio::time::interval_at(start + options.heartbeat_timeout, options.heartbeat_timeout);
    ack_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut outstanding_ping: Option<(String, tokio::time::Instant)> = None;

    loop {
        tokio::select! {
            // Inbound frames from the control plane.
            msg = ws_reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let envelope = match protocol::decode(&text) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                warn!(error = %e, "discarding unparseable frame");
                                continue;
                            },
                        };

                        if envelope.r#type == EnvelopeType::Ping {
                            match &outstanding_ping {
                                Some((id, _)) if *id == envelope.id => {
                                    debug!("heartbeat acknowledged");
                                    outstanding_ping = None;
                                },
                                _ => {
                                    // Control-plane liveness probe; echo it.
                                    let pong = envelope.pong();
                                    ws_sink
                                        .send(Message::Text(serde_json::to_string(&pong)?.into()))
                                        .await?;
                                },
                            }
                            continue;
                        }

                        // A response resolves its waiting caller; anything
                        // else is a fresh request for the plugin manager.
                        if let Some(request) = pending.resolve(envelope).await {
                            let delegate = Arc::clone(delegate);
                            let respond = outbound_tx.clone();
                            tokio::spawn(async move {
                                if let Some(response) = delegate.handle(request).await {
                                    let _ = respond.send(response);
                                }
                            });
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("websocket closed by control plane");
                        return Ok(RunEnd::Disconnected);
                    },
                    Some(Ok(Message::Ping(data))) => {
                        ws_sink.send(Message::Pong(data)).await?;
                    },
                    Some(Ok(_)) => {}, // binary, pong — ignore
                    Some(Err(e)) => return Err(e.into()),
                }
            },
            // Outbound envelopes from plugins and the host.
            maybe = outbound_rx.recv() => {
                match maybe {
                    Some(envelope) => {
                        ws_sink
                            .send(Message::Text(serde_json::to_string(&envelope)?.into()))
                            .await?;
                    },
                    None => {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        return Ok(RunEnd::Shutdown);
                    },
                }
            },
            // Periodic heartbeat; one ping in flight at a time.
            _ = heartbeat.tick() => {
                if outstanding_ping.is_none() {
                    let ping = Envelope::new(EnvelopeType::Ping, "");
                    outstanding_ping = Some((ping.id.clone(), tokio::time::Instant::now()));
                    ws_sink
                        .send(Message::Text(serde_json::to_string(&ping)?.into()))
                        .await?;
                }
            },
            // An unacknowledged ping past the bound forces a reconnect.
            _ = ack_check.tick() => {
                if let Some((_, sent_at)) = &outstanding_ping
                    && sent_at.elapsed() >= options.heartbeat_timeout
                {
                    return Err(Error::HeartbeatTimeout);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_track_protocol_constants() {
        let options = Options::default();
        assert_eq!(options.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(options.outbound_buffer, protocol::DEFAULT_OUTBOUND_BUFFER);
    }

    #[test]
    fn state_display_is_snake_case() {
        assert_eq!(ConnectionState::BackoffWait.to_string(), "backoff_wait");
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }
}

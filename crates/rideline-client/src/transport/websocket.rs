//! `WebSocket` transport over `tokio-tungstenite`.
//!
//! One driver task per transport owns the socket. It dials, runs the
//! session loop (outbound commands, inbound frames, heartbeat), and on a
//! drop sleeps the fixed reconnect delay before dialing again. Pending acks
//! live inside the session loop and are dropped with it, which fails every
//! outstanding request.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rideline_core::{SocketId, TransportError};
use rideline_settings::TransportSettings;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, instrument, warn};

use super::{Connector, Frame, Inbound, Transport, TransportEvent, TransportLink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens [`WsTransport`]s against one server URL.
#[derive(Clone, Debug)]
pub struct WsConnector {
    url: String,
    settings: TransportSettings,
}

impl WsConnector {
    /// Connector for `url` (`ws://` or `wss://`).
    pub fn new(url: impl Into<String>, settings: TransportSettings) -> Self {
        Self {
            url: url.into(),
            settings,
        }
    }
}

impl Connector for WsConnector {
    fn open(&self) -> Result<TransportLink, TransportError> {
        let _ = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let (event_tx, event_rx) = mpsc::channel(self.settings.event_buffer.max(1));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let state = Arc::new(LinkState::default());

        let driver = Driver {
            url: self.url.clone(),
            settings: self.settings.clone(),
            state: Arc::clone(&state),
            events: event_tx,
            cancel: cancel.clone(),
        };
        drop(tokio::spawn(driver.run(cmd_rx)));

        let transport = WsTransport {
            cmd_tx,
            state,
            ack_timeout_ms: self.settings.ack_timeout_ms,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
        };
        Ok(TransportLink {
            transport: Arc::new(transport),
            events: event_rx,
        })
    }
}

#[derive(Default)]
struct LinkState {
    connected: AtomicBool,
    socket_id: RwLock<Option<SocketId>>,
}

impl LinkState {
    fn up(&self, socket_id: SocketId) {
        *self.socket_id.write() = Some(socket_id);
        self.connected.store(true, Ordering::Release);
    }

    fn down(&self) {
        self.connected.store(false, Ordering::Release);
        *self.socket_id.write() = None;
    }
}

struct Command {
    event: String,
    data: Value,
    reply: Option<oneshot::Sender<Value>>,
}

/// Handle to a `WebSocket` transport. Dropping the last handle stops the
/// driver task.
pub struct WsTransport {
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<LinkState>,
    ack_timeout_ms: u64,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl WsTransport {
    fn submit(&self, command: Command) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.cmd_tx.send(command).map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn socket_id(&self) -> Option<SocketId> {
        self.state.socket_id.read().clone()
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    fn emit(&self, event: &str, data: Value) -> Result<(), TransportError> {
        self.submit(Command {
            event: event.to_owned(),
            data,
            reply: None,
        })
    }

    async fn request(&self, event: &str, data: Value) -> Result<Value, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.submit(Command {
            event: event.to_owned(),
            data,
            reply: Some(tx),
        })?;

        let timeout = std::time::Duration::from_millis(self.ack_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) if self.cancel.is_cancelled() => Err(TransportError::Closed),
            Ok(Err(_)) => Err(TransportError::NotConnected),
            Err(_) => Err(TransportError::Timeout {
                event: event.to_owned(),
                timeout_ms: self.ack_timeout_ms,
            }),
        }
    }

    async fn close(&self) {
        self.cancel.cancel();
        self.state.down();
    }
}

enum SessionEnd {
    Cancelled,
    Dropped(String),
}

struct Driver {
    url: String,
    settings: TransportSettings,
    state: Arc<LinkState>,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
}

impl Driver {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn run(self, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        let mut established = false;
        let mut attempt: u32 = 0;

        loop {
            let dialed = tokio::select! {
                () = self.cancel.cancelled() => break,
                dialed = connect_async(self.url.as_str()) => dialed,
            };

            match dialed {
                Ok((ws, _response)) => {
                    // Commands queued while offline are stale.
                    while cmd_rx.try_recv().is_ok() {}

                    let socket_id = SocketId::generate();
                    info!(socket_id = %socket_id, attempt, "socket connected");
                    self.state.up(socket_id);
                    let event = if established {
                        TransportEvent::Reconnected { attempt }
                    } else {
                        TransportEvent::Connected
                    };
                    established = true;
                    attempt = 0;
                    self.publish(event).await;

                    let end = self.run_session(ws, &mut cmd_rx).await;
                    self.state.down();
                    match end {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Dropped(reason) => {
                            warn!(%reason, "socket dropped");
                            self.publish(TransportEvent::Disconnected { reason }).await;
                        }
                    }
                }
                Err(e) => {
                    debug!(attempt, error = %e, "dial failed");
                    self.publish(TransportEvent::ConnectError {
                        message: e.to_string(),
                    })
                    .await;
                }
            }

            attempt = attempt.saturating_add(1);
            if let Some(max) = self.settings.max_reconnect_attempts {
                if attempt > max {
                    warn!(max, "reconnect attempts exhausted");
                    self.publish(TransportEvent::ReconnectFailed).await;
                    break;
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.reconnect_delay()) => {}
            }
        }

        self.state.down();
        debug!("transport driver stopped");
    }

    async fn publish(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            debug!("transport event dropped, no consumer");
        }
    }

    async fn run_session(
        &self,
        ws: WsStream,
        cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> SessionEnd {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let mut pending: HashMap<u64, oneshot::Sender<Value>> = HashMap::new();
        let mut next_ack: u64 = 1;
        let mut last_seen = Instant::now();
        let mut ping = tokio::time::interval_at(
            Instant::now() + self.settings.ping_interval(),
            self.settings.ping_interval(),
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return SessionEnd::Cancelled;
                }

                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { return SessionEnd::Cancelled };
                    let frame = match cmd.reply {
                        Some(reply) => {
                            let id = next_ack;
                            next_ack += 1;
                            let _ = pending.insert(id, reply);
                            Frame::request(&cmd.event, cmd.data, id)
                        }
                        None => Frame::event(&cmd.event, cmd.data),
                    };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(event = %cmd.event, error = %e, "outbound frame not encodable");
                            continue;
                        }
                    };
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                }

                msg = ws_rx.next() => {
                    let text = match msg {
                        None => return SessionEnd::Dropped("stream ended".into()),
                        Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                        Some(Ok(Message::Close(_))) => {
                            return SessionEnd::Dropped("server closed the socket".into());
                        }
                        Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                            Ok(text) => text,
                            Err(_) => {
                                debug!("ignoring non-UTF-8 binary frame");
                                continue;
                            }
                        },
                        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {
                            last_seen = Instant::now();
                            continue;
                        }
                    };
                    last_seen = Instant::now();
                    self.handle_inbound(&text, &mut pending).await;
                }

                _ = ping.tick() => {
                    if last_seen.elapsed() > self.settings.pong_timeout() {
                        return SessionEnd::Dropped("pong timeout".into());
                    }
                    if let Err(e) = ws_tx.send(Message::Ping(Vec::<u8>::new().into())).await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                }
            }
        }
    }

    async fn handle_inbound(&self, text: &str, pending: &mut HashMap<u64, oneshot::Sender<Value>>) {
        match Frame::parse_inbound(text) {
            Ok(Some(Inbound::Ack { id, data })) => match pending.remove(&id) {
                Some(reply) => {
                    let _ = reply.send(data);
                }
                None => debug!(ack = id, "ack for unknown request"),
            },
            Ok(Some(Inbound::Event { event, data })) => {
                self.publish(TransportEvent::Message { event, data }).await;
            }
            Ok(None) => debug!("ignoring frame without event or ack"),
            Err(e) => warn!(error = %e, "malformed inbound frame"),
        }
    }
}

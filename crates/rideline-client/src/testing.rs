//! In-memory fakes for exercising the client without a server.
//!
//! [`FakeConnector`] hands out [`FakeTransport`]s. Each fake records what
//! was sent, answers requests from a per-event script (default
//! `{"success": true}`), and lets the test inject transport events.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use rideline_core::{LocationError, SelfPosition, SocketId, TransportError};
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::location::LocationProvider;
use crate::transport::{Connector, Transport, TransportEvent, TransportLink};

/// One recorded outbound call.
#[derive(Clone, Debug, PartialEq)]
pub struct Sent {
    /// Event name.
    pub event: String,
    /// Payload.
    pub data: Value,
    /// Whether it was a request awaiting an ack.
    pub acked: bool,
}

/// Scriptable [`Transport`].
pub struct FakeTransport {
    connected: AtomicBool,
    closed: AtomicBool,
    socket_id: Mutex<Option<SocketId>>,
    sent: Mutex<Vec<Sent>>,
    replies: Mutex<HashMap<String, VecDeque<Result<Value, TransportError>>>>,
    events: Mutex<Option<mpsc::Sender<TransportEvent>>>,
    reconnects: AtomicU32,
}

impl FakeTransport {
    fn with_events(events: Option<mpsc::Sender<TransportEvent>>) -> Self {
        Self {
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            socket_id: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            events: Mutex::new(events),
            reconnects: AtomicU32::new(0),
        }
    }

    /// Disconnected fake without an event stream.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_events(None))
    }

    /// Same as [`new`](Self::new), typed as a trait object.
    pub fn detached() -> Arc<dyn Transport> {
        Self::new()
    }

    /// Flip the physical connection flag without emitting an event. A
    /// fresh socket id is minted when going up.
    pub fn set_connected(&self, up: bool) {
        *self.socket_id.lock() = up.then(SocketId::generate);
        self.connected.store(up, Ordering::SeqCst);
    }

    /// Queue the answer to the next `event` request.
    pub fn script_reply(&self, event: &str, reply: Result<Value, TransportError>) {
        self.replies
            .lock()
            .entry(event.to_owned())
            .or_default()
            .push_back(reply);
    }

    /// Everything sent so far.
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    /// Payloads sent under `event`.
    pub fn sent_to(&self, event: &str) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .filter(|s| s.event == event)
            .map(|s| s.data.clone())
            .collect()
    }

    /// How many times `event` was sent.
    pub fn count(&self, event: &str) -> usize {
        self.sent.lock().iter().filter(|s| s.event == event).count()
    }

    /// Whether [`Transport::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn inject(&self, event: TransportEvent) {
        let events = self.events.lock().clone();
        if let Some(events) = events {
            let _ = events.send(event).await;
        }
    }

    /// Bring the socket up and report the first connection.
    pub async fn connect(&self) {
        self.set_connected(true);
        self.inject(TransportEvent::Connected).await;
    }

    /// Fail a dial attempt.
    pub async fn fail_connect(&self, message: &str) {
        self.inject(TransportEvent::ConnectError {
            message: message.to_owned(),
        })
        .await;
    }

    /// Drop the socket.
    pub async fn drop_connection(&self, reason: &str) {
        self.set_connected(false);
        self.inject(TransportEvent::Disconnected {
            reason: reason.to_owned(),
        })
        .await;
    }

    /// Bring the socket back with a new socket id.
    pub async fn reconnect(&self) {
        self.set_connected(true);
        let attempt = self.reconnects.fetch_add(1, Ordering::SeqCst) + 1;
        self.inject(TransportEvent::Reconnected { attempt }).await;
    }

    /// Report that reconnecting was given up.
    pub async fn give_up(&self) {
        self.set_connected(false);
        self.inject(TransportEvent::ReconnectFailed).await;
    }

    /// Push a server event.
    pub async fn push(&self, event: &str, data: Value) {
        self.inject(TransportEvent::Message {
            event: event.to_owned(),
            data,
        })
        .await;
    }

    fn record(&self, event: &str, data: Value, acked: bool) {
        self.sent.lock().push(Sent {
            event: event.to_owned(),
            data,
            acked,
        });
    }

    fn check_usable(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(TransportError::Closed)
        } else if !self.is_connected() {
            Err(TransportError::NotConnected)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn socket_id(&self) -> Option<SocketId> {
        self.socket_id.lock().clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, event: &str, data: Value) -> Result<(), TransportError> {
        self.check_usable()?;
        self.record(event, data, false);
        Ok(())
    }

    async fn request(&self, event: &str, data: Value) -> Result<Value, TransportError> {
        self.check_usable()?;
        self.record(event, data, true);
        let scripted = self
            .replies
            .lock()
            .get_mut(event)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(json!({ "success": true })))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        *self.socket_id.lock() = None;
        // Ends the consumer's event stream, as a real transport does.
        let _ = self.events.lock().take();
    }
}

/// [`Connector`] producing [`FakeTransport`]s.
pub struct FakeConnector {
    auto_connect: bool,
    opened: Mutex<Vec<Arc<FakeTransport>>>,
    fail_open: AtomicBool,
}

impl FakeConnector {
    /// Transports come up as soon as they are opened.
    pub fn auto() -> Arc<Self> {
        Arc::new(Self {
            auto_connect: true,
            opened: Mutex::new(Vec::new()),
            fail_open: AtomicBool::new(false),
        })
    }

    /// Transports stay down until the test calls [`FakeTransport::connect`].
    pub fn manual() -> Arc<Self> {
        Arc::new(Self {
            auto_connect: false,
            opened: Mutex::new(Vec::new()),
            fail_open: AtomicBool::new(false),
        })
    }

    /// Make the next opens fail.
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Number of transports opened.
    pub fn opened(&self) -> usize {
        self.opened.lock().len()
    }

    /// Transport opened `index`-th, zero-based.
    pub fn transport(&self, index: usize) -> Option<Arc<FakeTransport>> {
        self.opened.lock().get(index).cloned()
    }

    /// Most recently opened transport.
    pub fn latest(&self) -> Option<Arc<FakeTransport>> {
        self.opened.lock().last().cloned()
    }

    /// Yield until `count` (at least one) transports were opened, then
    /// return the `count`-th.
    pub async fn wait_for_open(&self, count: usize) -> Arc<FakeTransport> {
        let index = count.saturating_sub(1);
        loop {
            if let Some(transport) = self.transport(index) {
                return transport;
            }
            tokio::task::yield_now().await;
        }
    }
}

impl Connector for FakeConnector {
    fn open(&self) -> Result<TransportLink, TransportError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("fake open failure".into()));
        }
        let (tx, rx) = mpsc::channel(64);
        let fake = Arc::new(FakeTransport::with_events(Some(tx.clone())));
        if self.auto_connect {
            fake.set_connected(true);
            let _ = tx.try_send(TransportEvent::Connected);
        }
        self.opened.lock().push(Arc::clone(&fake));
        Ok(TransportLink {
            transport: fake,
            events: rx,
        })
    }
}

/// Location provider answering from a script, counting reads.
pub struct ScriptedLocation {
    script: Mutex<VecDeque<Result<SelfPosition, LocationError>>>,
    fallback: Option<SelfPosition>,
    deny: bool,
    reads: AtomicUsize,
}

impl ScriptedLocation {
    /// Always report `position`, restamped at read time.
    pub fn returning(position: SelfPosition) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(position),
            deny: false,
            reads: AtomicUsize::new(0),
        })
    }

    /// Always fail with [`LocationError::PermissionDenied`].
    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            deny: true,
            reads: AtomicUsize::new(0),
        })
    }

    /// Answer the next read with `result`.
    pub fn push(&self, result: Result<SelfPosition, LocationError>) {
        self.script.lock().push_back(result);
    }

    /// Number of reads so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LocationProvider for ScriptedLocation {
    async fn current_position(&self) -> Result<SelfPosition, LocationError> {
        let _ = self.reads.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().pop_front();
        if let Some(result) = scripted {
            return result;
        }
        match &self.fallback {
            Some(position) if !self.deny => Ok(SelfPosition::now(
                position.latitude,
                position.longitude,
                position.accuracy,
            )),
            _ => Err(LocationError::PermissionDenied),
        }
    }
}

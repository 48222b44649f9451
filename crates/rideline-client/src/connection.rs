//! Connection lifecycle for one rider identity.
//!
//! Connecting opens a transport and hands its event stream to a session
//! task. The first `Connected` event resolves the self position, registers
//! presence and only then reports the connection as established. Later
//! reconnects re-register and replay the subscription without involving
//! the caller.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rideline_core::protocol::{self, Ack, PresencePayload};
use rideline_core::{
    ClientError, RemotePositionEvent, RiderId, SelfPosition, SocketId, TransportError,
};
use rideline_settings::ClientSettings;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::cache::PositionCache;
use crate::listeners::ListenerRegistry;
use crate::location::LocationProvider;
use crate::router::MessageRouter;
use crate::slot::TransportSlot;
use crate::subscription::SubscriptionController;
use crate::transport::{ActiveTransport, Connector, Transport, TransportEvent};

/// Coarse connection state. `Connected` spans transport-level reconnect
/// cycles; [`ConnectionManager::is_live`] tells whether the socket is up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session.
    Idle,
    /// Transport opened, registration pending.
    Connecting,
    /// Registered.
    Connected,
    /// Tearing down.
    Disconnecting,
}

impl ConnectionState {
    /// Whether the manager may move from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Connecting)
                | (
                    Self::Connecting,
                    Self::Connected | Self::Idle | Self::Disconnecting
                )
                | (Self::Connected, Self::Disconnecting | Self::Idle)
                | (Self::Disconnecting, Self::Idle)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// What a call to [`ConnectionManager::connect`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new connection was opened and registered.
    Established,
    /// The existing connection for the same rider was kept.
    Reused,
    /// Another connect or disconnect was already running. Nothing was done.
    InFlight,
}

/// Collaborators of a [`ConnectionManager`].
pub struct ConnectionDeps {
    /// Client configuration.
    pub settings: ClientSettings,
    /// Opens transports.
    pub connector: Arc<dyn Connector>,
    /// Device location.
    pub location: Arc<dyn LocationProvider>,
    /// Persisted last self position.
    pub cache: PositionCache,
    /// Process-wide live transport record.
    pub slot: Arc<TransportSlot>,
    /// Transport cell shared with the subscription controller.
    pub active: Arc<ActiveTransport>,
    /// Driver subscription state.
    pub subscription: Arc<SubscriptionController>,
    /// Receivers of driver positions.
    pub listeners: Arc<ListenerRegistry>,
    /// Receiver of `message` envelopes.
    pub router: Arc<dyn MessageRouter>,
}

struct Session {
    id: u64,
    rider: RiderId,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    updates: Mutex<Option<JoinHandle<()>>>,
    registered: Mutex<Option<(SocketId, Instant)>>,
}

enum Phase {
    Idle,
    Connecting(Arc<Session>),
    Connected(Arc<Session>),
    Disconnecting,
}

impl Phase {
    fn state(&self) -> ConnectionState {
        match self {
            Self::Idle => ConnectionState::Idle,
            Self::Connecting(_) => ConnectionState::Connecting,
            Self::Connected(_) => ConnectionState::Connected,
            Self::Disconnecting => ConnectionState::Disconnecting,
        }
    }

    fn session(&self) -> Option<&Arc<Session>> {
        match self {
            Self::Connecting(s) | Self::Connected(s) => Some(s),
            Self::Idle | Self::Disconnecting => None,
        }
    }
}

fn advance(phase: &mut Phase, next: Phase) -> bool {
    let (from, to) = (phase.state(), next.state());
    if from.can_transition_to(to) {
        debug!(%from, %to, "connection state changed");
        *phase = next;
        true
    } else {
        error!(%from, %to, "illegal connection state transition ignored");
        false
    }
}

enum Plan {
    InFlight,
    Reuse(Arc<Session>),
    Replace(Arc<Session>),
    Fresh,
}

struct Inner {
    settings: ClientSettings,
    connector: Arc<dyn Connector>,
    location: Arc<dyn LocationProvider>,
    cache: PositionCache,
    slot: Arc<TransportSlot>,
    active: Arc<ActiveTransport>,
    subscription: Arc<SubscriptionController>,
    listeners: Arc<ListenerRegistry>,
    router: Arc<dyn MessageRouter>,
    phase: Mutex<Phase>,
    remembered: Mutex<Option<RiderId>>,
    self_position: Mutex<Option<SelfPosition>>,
    next_session: AtomicU64,
}

/// Owns the rider's connection: at most one session at a time.
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// Manager over `deps`. Nothing is opened until [`connect`](Self::connect).
    pub fn new(deps: ConnectionDeps) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings: deps.settings,
                connector: deps.connector,
                location: deps.location,
                cache: deps.cache,
                slot: deps.slot,
                active: deps.active,
                subscription: deps.subscription,
                listeners: deps.listeners,
                router: deps.router,
                phase: Mutex::new(Phase::Idle),
                remembered: Mutex::new(None),
                self_position: Mutex::new(None),
                next_session: AtomicU64::new(1),
            }),
        }
    }

    /// Connect and register as `rider`.
    ///
    /// Idempotent for the same rider: the live connection is kept and the
    /// presence refreshed (subject to the registration cooldown). A
    /// different rider tears the current session down first. While another
    /// connect or disconnect runs this returns [`ConnectOutcome::InFlight`].
    #[instrument(skip_all, fields(rider_id = %rider))]
    pub async fn connect(&self, rider: RiderId) -> Result<ConnectOutcome, ClientError> {
        let plan = {
            let mut phase = self.inner.phase.lock();
            let plan = match &*phase {
                Phase::Connecting(_) | Phase::Disconnecting => Plan::InFlight,
                Phase::Connected(s) if s.rider == rider => Plan::Reuse(Arc::clone(s)),
                Phase::Connected(s) => Plan::Replace(Arc::clone(s)),
                Phase::Idle => Plan::Fresh,
            };
            if matches!(plan, Plan::Replace(_)) {
                let _ = advance(&mut phase, Phase::Disconnecting);
            }
            plan
        };

        match plan {
            Plan::InFlight => {
                debug!("connect already in flight");
                return Ok(ConnectOutcome::InFlight);
            }
            Plan::Reuse(session) => {
                debug!("reusing live connection");
                self.inner.reregister(&session).await;
                return Ok(ConnectOutcome::Reused);
            }
            Plan::Replace(session) => {
                info!(previous = %session.rider, "switching rider identity");
                self.inner.teardown(&session).await;
                self.inner.settle_idle();
                self.inner.reset_volatile();
            }
            Plan::Fresh => {}
        }

        self.inner.establish(rider).await
    }

    /// Close the current session. With `full_reset` the remembered identity
    /// and the cached position are forgotten too (logout).
    #[instrument(skip(self))]
    pub async fn disconnect(&self, full_reset: bool) {
        let session = {
            let mut phase = self.inner.phase.lock();
            let session = phase.session().cloned();
            if session.is_some() {
                let _ = advance(&mut phase, Phase::Disconnecting);
            }
            session
        };
        if let Some(session) = session {
            self.inner.teardown(&session).await;
            self.inner.settle_idle();
        }
        self.inner.reset_volatile();
        if full_reset {
            *self.inner.remembered.lock() = None;
            self.inner.cache.clear().await;
        }
        info!("disconnected");
    }

    /// Current coarse state.
    pub fn state(&self) -> ConnectionState {
        self.inner.phase.lock().state()
    }

    /// Whether the manager is connected and the socket is up right now.
    pub fn is_live(&self) -> bool {
        match &*self.inner.phase.lock() {
            Phase::Connected(s) => s.transport.is_connected(),
            _ => false,
        }
    }

    /// Rider identity of the current or most recent connect.
    pub fn rider_id(&self) -> Option<RiderId> {
        self.inner.remembered.lock().clone()
    }

    /// Last self position sent or used for registration.
    pub fn self_position(&self) -> Option<SelfPosition> {
        self.inner.self_position.lock().clone()
    }

    /// Read the device location now and push it to the server.
    pub async fn send_location_update(&self) -> Result<(), ClientError> {
        let session = match &*self.inner.phase.lock() {
            Phase::Connected(s) => Arc::clone(s),
            _ => return Err(TransportError::NotConnected.into()),
        };
        self.inner.push_location(&session).await
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        let session = self.inner.phase.lock().session().cloned();
        if let Some(session) = session {
            session.cancel.cancel();
        }
    }
}

impl Inner {
    async fn establish(self: &Arc<Self>, rider: RiderId) -> Result<ConnectOutcome, ClientError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        {
            let mut phase = self.phase.lock();
            if !matches!(*phase, Phase::Idle) {
                debug!("connect already in flight");
                return Ok(ConnectOutcome::InFlight);
            }
            let link = self.connector.open()?;
            let session = Arc::new(Session {
                id: self.next_session.fetch_add(1, Ordering::Relaxed),
                rider: rider.clone(),
                transport: link.transport,
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
                updates: Mutex::new(None),
                registered: Mutex::new(None),
            });
            let task = tokio::spawn(Arc::clone(self).run_session(
                Arc::clone(&session),
                link.events,
                ready_tx,
            ));
            *session.task.lock() = Some(task);
            let _ = advance(&mut phase, Phase::Connecting(session));
        }
        *self.remembered.lock() = Some(rider);
        info!("connecting");

        match ready_rx.await {
            Ok(result) => result.map(|()| ConnectOutcome::Established),
            Err(_) => Err(ClientError::Disconnected),
        }
    }

    #[instrument(skip_all, fields(rider_id = %session.rider, session = session.id))]
    async fn run_session(
        self: Arc<Self>,
        session: Arc<Session>,
        mut events: mpsc::Receiver<TransportEvent>,
        ready: oneshot::Sender<Result<(), ClientError>>,
    ) {
        let mut ready = Some(ready);
        loop {
            let event = tokio::select! {
                biased;
                () = session.cancel.cancelled() => break,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                debug!("transport event stream closed");
                self.abandon(&session).await;
                break;
            };

            let keep_running = match event {
                TransportEvent::Connected => self.on_connected(&session, &mut ready).await,
                TransportEvent::Reconnected { attempt } => {
                    info!(attempt, "transport reconnected");
                    self.recover(&session).await;
                    true
                }
                TransportEvent::Disconnected { reason } => {
                    warn!(%reason, "transport dropped, waiting for reconnect");
                    true
                }
                TransportEvent::ConnectError { message } => match ready.take() {
                    Some(ready) => {
                        warn!(error = %message, "initial connection attempt failed");
                        self.abandon(&session).await;
                        let _ = ready.send(Err(TransportError::Connect(message).into()));
                        false
                    }
                    None => {
                        debug!(error = %message, "reconnect attempt failed");
                        true
                    }
                },
                TransportEvent::ReconnectFailed => {
                    error!("transport gave up reconnecting");
                    self.abandon(&session).await;
                    false
                }
                TransportEvent::Message { event, data } => {
                    self.route_inbound(&event, data);
                    true
                }
            };
            if !keep_running {
                break;
            }
        }

        if let Some(ready) = ready.take() {
            let _ = ready.send(Err(ClientError::Disconnected));
        }
        debug!("session loop stopped");
    }

    async fn on_connected(
        self: &Arc<Self>,
        session: &Arc<Session>,
        ready: &mut Option<oneshot::Sender<Result<(), ClientError>>>,
    ) -> bool {
        let Some(ready) = ready.take() else {
            self.recover(session).await;
            return true;
        };
        self.claim_slot(session).await;

        let registered = match self.resolve_position().await {
            Ok(position) => self.register(session, &position).await,
            Err(e) => Err(e),
        };
        if let Err(e) = registered {
            warn!(error = %e, "registration failed, abandoning connection");
            self.abandon(session).await;
            let _ = ready.send(Err(e));
            return false;
        }

        self.active.set(Arc::clone(&session.transport));
        if !self.advance_if_current(session, Phase::Connected(Arc::clone(session))) {
            self.active.clear_if(&session.transport);
            let _ = ready.send(Err(ClientError::Disconnected));
            return false;
        }
        self.spawn_updates(session);
        info!("connected");
        // A target left over from a session that died in the background.
        if let Err(e) = self.subscription.replay().await {
            warn!(error = %e, "subscription replay failed");
        }
        let _ = ready.send(Ok(()));
        true
    }

    async fn recover(&self, session: &Session) {
        self.claim_slot(session).await;
        self.reregister(session).await;
        if let Err(e) = self.subscription.replay().await {
            warn!(error = %e, "subscription replay failed");
        }
    }

    async fn claim_slot(&self, session: &Session) {
        if let Some(orphan) = self.slot.claim(&session.transport) {
            warn!("closing orphaned transport of an earlier session");
            orphan.close().await;
        }
    }

    async fn reregister(&self, session: &Session) {
        let result = match self.resolve_position().await {
            Ok(position) => self.register(session, &position).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, "re-registration failed");
        }
    }

    /// Fresh cached position if there is one, else a live read which is
    /// then cached.
    async fn resolve_position(&self) -> Result<SelfPosition, ClientError> {
        if let Some(cached) = self.cache.load().await {
            if PositionCache::is_fresh(&cached, self.settings.location.max_cache_age()) {
                debug!("using cached self position");
                *self.self_position.lock() = Some(cached.clone());
                return Ok(cached);
            }
            debug!("cached self position is stale");
        }
        let position = self.location.current_position().await?;
        self.cache.save(&position).await;
        *self.self_position.lock() = Some(position.clone());
        Ok(position)
    }

    /// Send `register` and wait for the ack. Suppressed when the same
    /// socket registered successfully within the cooldown.
    async fn register(&self, session: &Session, position: &SelfPosition) -> Result<(), ClientError> {
        let socket_id = session
            .transport
            .socket_id()
            .ok_or(TransportError::NotConnected)?;
        let cooldown = self.settings.registration.cooldown();
        let suppressed = session
            .registered
            .lock()
            .as_ref()
            .is_some_and(|(socket, at)| *socket == socket_id && at.elapsed() < cooldown);
        if suppressed {
            debug!("registration suppressed by cooldown");
            return Ok(());
        }

        let payload = PresencePayload::new(socket_id.clone(), session.rider.clone(), position);
        let data = serde_json::to_value(&payload).map_err(TransportError::from)?;
        let reply = session.transport.request(protocol::REGISTER, data).await?;
        Ack::from_value(protocol::REGISTER, reply)?.into_result(protocol::REGISTER)?;

        *session.registered.lock() = Some((socket_id.clone(), Instant::now()));
        info!(socket_id = %socket_id, "presence registered");
        Ok(())
    }

    async fn push_location(&self, session: &Session) -> Result<(), ClientError> {
        let socket_id = session
            .transport
            .socket_id()
            .ok_or(TransportError::NotConnected)?;
        let registered = session
            .registered
            .lock()
            .as_ref()
            .is_some_and(|(socket, _)| *socket == socket_id);
        if !registered {
            debug!("socket not registered yet, location update skipped");
            return Ok(());
        }

        let position = self.location.current_position().await?;
        self.cache.save(&position).await;
        *self.self_position.lock() = Some(position.clone());

        let payload = PresencePayload::new(socket_id, session.rider.clone(), &position);
        let data = serde_json::to_value(&payload).map_err(TransportError::from)?;
        session.transport.emit(protocol::UPDATE_LOCATION, data)?;
        trace!("location update sent");
        Ok(())
    }

    fn spawn_updates(self: &Arc<Self>, session: &Arc<Session>) {
        let inner = Arc::clone(self);
        let target = Arc::clone(session);
        let cancel = session.cancel.child_token();
        let period = self.settings.location.update_interval();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = inner.push_location(&target).await {
                            debug!(error = %e, "periodic location update failed");
                        }
                    }
                }
            }
        });
        *session.updates.lock() = Some(task);
    }

    fn route_inbound(&self, event: &str, data: Value) {
        match event {
            protocol::DRIVER_LOCATION_UPDATE => {
                match serde_json::from_value::<RemotePositionEvent>(data) {
                    Ok(update) if self.subscription.is_tracking() => {
                        let _ = self.listeners.dispatch(&update);
                    }
                    Ok(_) => debug!("driver update without a subscription dropped"),
                    Err(e) => warn!(error = %e, "malformed driver location update"),
                }
            }
            protocol::MESSAGE => self.router.route(data),
            other => debug!(event = other, "unhandled inbound event"),
        }
    }

    fn advance_if_current(&self, session: &Session, next: Phase) -> bool {
        let mut phase = self.phase.lock();
        if phase.session().is_some_and(|s| s.id == session.id) {
            advance(&mut phase, next)
        } else {
            false
        }
    }

    /// Give up a session from inside its own task.
    async fn abandon(&self, session: &Session) {
        session.cancel.cancel();
        self.active.clear_if(&session.transport);
        let _ = self.slot.release(&session.transport);
        session.transport.close().await;
        let _ = self.advance_if_current(session, Phase::Idle);
    }

    /// Stop a session from outside its task and wait for the task to end.
    async fn teardown(&self, session: &Session) {
        session.cancel.cancel();
        self.active.clear_if(&session.transport);
        let _ = self.slot.release(&session.transport);
        session.transport.close().await;

        let updates = session.updates.lock().take();
        if let Some(updates) = updates {
            updates.abort();
        }
        let task = session.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!("session task panicked");
                }
            }
        }
    }

    fn settle_idle(&self) {
        let mut phase = self.phase.lock();
        if matches!(*phase, Phase::Disconnecting) {
            let _ = advance(&mut phase, Phase::Idle);
        }
    }

    fn reset_volatile(&self) {
        self.subscription.reset();
        self.listeners.clear_last_event();
        *self.self_position.lock() = None;
    }
}

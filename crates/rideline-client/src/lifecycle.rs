//! App-event façade over the connection manager and the subscription.

use std::sync::Arc;

use rideline_core::{ClientError, DriverId, RemotePositionEvent, RiderId};
use rideline_settings::{ClientSettings, SettingsError};
use tracing::{debug, info};

use crate::auth::AuthSession;
use crate::cache::PositionCache;
use crate::connection::{ConnectOutcome, ConnectionDeps, ConnectionManager};
use crate::listeners::{ListenerRegistry, PositionListener};
use crate::location::LocationProvider;
use crate::router::{LogRouter, MessageRouter};
use crate::slot::TransportSlot;
use crate::store::{FileStore, KeyValueStore, MemoryStore};
use crate::subscription::SubscriptionController;
use crate::transport::{ActiveTransport, Connector, WsConnector};

/// Maps login, foreground, tracking-screen focus/blur and logout onto
/// connection and subscription calls.
pub struct Lifecycle {
    connection: ConnectionManager,
    subscription: Arc<SubscriptionController>,
    listeners: Arc<ListenerRegistry>,
    auth: Option<Arc<dyn AuthSession>>,
}

impl Lifecycle {
    /// Start building a client from `settings` and a location source.
    pub fn builder(settings: ClientSettings, location: Arc<dyn LocationProvider>) -> LifecycleBuilder {
        LifecycleBuilder {
            settings,
            location,
            connector: None,
            store: None,
            auth: None,
            router: None,
            slot: None,
        }
    }

    /// The user logged in.
    pub async fn on_login(&self, rider: RiderId) -> Result<ConnectOutcome, ClientError> {
        info!(rider_id = %rider, "login");
        self.connection.connect(rider).await
    }

    /// The app returned to the foreground. Reconnects as the logged-in
    /// user, falling back to the remembered identity. `None` when nobody
    /// is logged in.
    pub async fn on_foreground(&self) -> Result<Option<ConnectOutcome>, ClientError> {
        let rider = match &self.auth {
            Some(auth) if !auth.is_logged_in() => None,
            Some(auth) => auth.current_user_id().or_else(|| self.connection.rider_id()),
            None => self.connection.rider_id(),
        };
        let Some(rider) = rider else {
            debug!("foreground while logged out, nothing to do");
            return Ok(None);
        };
        self.connection.connect(rider).await.map(Some)
    }

    /// The driver-tracking screen gained focus.
    pub async fn on_tracking_focus(&self, driver: DriverId) -> Result<(), ClientError> {
        self.subscription.subscribe_to(driver).await
    }

    /// The driver-tracking screen lost focus.
    pub async fn on_tracking_blur(&self) -> Result<(), ClientError> {
        self.subscription.unsubscribe().await
    }

    /// The user logged out. Forgets the identity and the cached position.
    pub async fn on_logout(&self) {
        info!("logout");
        self.connection.disconnect(true).await;
    }

    /// Register a position listener.
    pub fn add_listener(&self, listener: Arc<dyn PositionListener>) -> bool {
        self.listeners.add_listener(listener)
    }

    /// Unregister a position listener.
    pub fn remove_listener(&self, listener: &Arc<dyn PositionListener>) -> bool {
        self.listeners.remove_listener(listener)
    }

    /// Latest driver position delivered to listeners.
    pub fn last_event(&self) -> Option<RemotePositionEvent> {
        self.listeners.last_event()
    }

    /// Whether the UI should show a "searching" indicator: a target is
    /// desired but the socket is not up.
    pub fn is_searching(&self) -> bool {
        self.subscription.is_tracking() && !self.connection.is_live()
    }

    /// Connection manager.
    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    /// Subscription controller.
    pub fn subscription(&self) -> &SubscriptionController {
        &self.subscription
    }

    /// Listener registry.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }
}

/// Builder for [`Lifecycle`]. Unset collaborators get defaults: a
/// `WebSocket` connector to `server.url`, a file store under
/// `location.cacheDir` (memory store when unset), the log-only message
/// router, and a slot private to this client.
pub struct LifecycleBuilder {
    settings: ClientSettings,
    location: Arc<dyn LocationProvider>,
    connector: Option<Arc<dyn Connector>>,
    store: Option<Arc<dyn KeyValueStore>>,
    auth: Option<Arc<dyn AuthSession>>,
    router: Option<Arc<dyn MessageRouter>>,
    slot: Option<Arc<TransportSlot>>,
}

impl LifecycleBuilder {
    /// Use `connector` instead of the `WebSocket` default.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Persist the position cache in `store`.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Consult `auth` on foreground.
    #[must_use]
    pub fn auth(mut self, auth: Arc<dyn AuthSession>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Route `message` envelopes to `router`.
    #[must_use]
    pub fn router(mut self, router: Arc<dyn MessageRouter>) -> Self {
        self.router = Some(router);
        self
    }

    /// Share `slot` with the other clients of this process.
    #[must_use]
    pub fn slot(mut self, slot: Arc<TransportSlot>) -> Self {
        self.slot = Some(slot);
        self
    }

    /// Validate the settings and assemble the client.
    pub fn build(self) -> Result<Lifecycle, SettingsError> {
        self.settings.validate()?;

        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(WsConnector::new(
                self.settings.server.url.clone(),
                self.settings.transport.clone(),
            )),
        };
        let store: Arc<dyn KeyValueStore> = match (self.store, &self.settings.location.cache_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileStore::new(dir)),
            (None, None) => Arc::new(MemoryStore::new()),
        };
        let cache = PositionCache::new(store, self.settings.location.cache_key.clone());

        let active = Arc::new(ActiveTransport::new());
        let subscription = Arc::new(SubscriptionController::new(
            Arc::clone(&active),
            self.settings.subscription.clone(),
        ));
        let listeners = Arc::new(ListenerRegistry::new());

        let connection = ConnectionManager::new(ConnectionDeps {
            settings: self.settings,
            connector,
            location: self.location,
            cache,
            slot: self.slot.unwrap_or_default(),
            active,
            subscription: Arc::clone(&subscription),
            listeners: Arc::clone(&listeners),
            router: self.router.unwrap_or_else(|| Arc::new(LogRouter)),
        });

        Ok(Lifecycle {
            connection,
            subscription,
            listeners,
            auth: self.auth,
        })
    }
}

//! Which driver the rider is tracking, and keeping the server in step.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rideline_core::protocol::{self, Ack, DriverTarget};
use rideline_core::{ClientError, DriverId, TransportError};
use rideline_settings::SubscriptionSettings;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::transport::{ActiveTransport, Transport};

#[derive(Debug, Default)]
struct State {
    target: Option<DriverId>,
    last_subscribe_at: Option<Instant>,
    last_unsubscribe_at: Option<Instant>,
}

fn within(last: Option<Instant>, now: Instant, window: Duration) -> bool {
    last.is_some_and(|at| now.duration_since(at) < window)
}

/// Debounced subscribe/unsubscribe against the active transport.
///
/// The desired target is the single source of truth: it is set before a
/// subscribe goes out, rolled back when the server refuses, cleared before
/// an unsubscribe goes out, and replayed after a reconnect.
pub struct SubscriptionController {
    active: Arc<ActiveTransport>,
    settings: SubscriptionSettings,
    state: Mutex<State>,
}

impl SubscriptionController {
    /// Controller working through `active`.
    pub fn new(active: Arc<ActiveTransport>, settings: SubscriptionSettings) -> Self {
        Self {
            active,
            settings,
            state: Mutex::new(State::default()),
        }
    }

    /// Start tracking `driver`.
    ///
    /// A call within `subscribeDebounceMs` of the previous subscribe is
    /// dropped and returns `Ok(())`, as is a call without a live transport.
    pub async fn subscribe_to(&self, driver: DriverId) -> Result<(), ClientError> {
        let transport = {
            let mut state = self.state.lock();
            let now = Instant::now();
            if within(state.last_subscribe_at, now, self.settings.subscribe_debounce()) {
                debug!(driver_id = %driver, "subscribe debounced");
                return Ok(());
            }
            let Some(transport) = self.active.live() else {
                info!(driver_id = %driver, "no live connection, subscribe skipped");
                return Ok(());
            };
            state.last_subscribe_at = Some(now);
            state.target = Some(driver.clone());
            transport
        };
        self.request_subscription(transport.as_ref(), &driver).await
    }

    /// Stop tracking the current target.
    ///
    /// The target is cleared before the request goes out and stays cleared
    /// when the request fails.
    pub async fn unsubscribe(&self) -> Result<(), ClientError> {
        let (transport, driver) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            if within(state.last_unsubscribe_at, now, self.settings.unsubscribe_debounce()) {
                debug!("unsubscribe debounced");
                return Ok(());
            }
            let Some(driver) = state.target.clone() else {
                debug!("nothing subscribed, unsubscribe skipped");
                return Ok(());
            };
            let Some(transport) = self.active.live() else {
                state.target = None;
                info!(driver_id = %driver, "no live connection, target dropped locally");
                return Ok(());
            };
            state.last_unsubscribe_at = Some(now);
            state.target = None;
            (transport, driver)
        };

        let result = send_and_confirm(
            transport.as_ref(),
            protocol::UNSUBSCRIBE_FROM_DRIVER,
            &driver,
        )
        .await;
        match &result {
            Ok(()) => info!(driver_id = %driver, "unsubscribed from driver"),
            Err(e) => warn!(driver_id = %driver, error = %e, "unsubscribe failed"),
        }
        result
    }

    /// Re-send the desired subscription after a reconnect. Returns whether
    /// anything was sent.
    pub async fn replay(&self) -> Result<bool, ClientError> {
        let (transport, driver) = {
            let mut state = self.state.lock();
            let Some(driver) = state.target.clone() else {
                return Ok(false);
            };
            let Some(transport) = self.active.live() else {
                debug!(driver_id = %driver, "replay skipped, transport not live");
                return Ok(false);
            };
            state.last_subscribe_at = Some(Instant::now());
            (transport, driver)
        };
        info!(driver_id = %driver, "replaying subscription");
        self.request_subscription(transport.as_ref(), &driver)
            .await
            .map(|()| true)
    }

    /// Driver currently desired, if any.
    pub fn target(&self) -> Option<DriverId> {
        self.state.lock().target.clone()
    }

    /// Whether a driver is desired.
    pub fn is_tracking(&self) -> bool {
        self.state.lock().target.is_some()
    }

    /// Forget the target and the debounce history.
    pub fn reset(&self) {
        *self.state.lock() = State::default();
    }

    async fn request_subscription(
        &self,
        transport: &dyn Transport,
        driver: &DriverId,
    ) -> Result<(), ClientError> {
        let result = send_and_confirm(transport, protocol::SUBSCRIBE_TO_DRIVER, driver).await;
        match &result {
            Ok(()) => info!(driver_id = %driver, "subscribed to driver"),
            Err(e) => {
                let mut state = self.state.lock();
                if state.target.as_ref() == Some(driver) {
                    state.target = None;
                }
                warn!(driver_id = %driver, error = %e, "subscription failed, target cleared");
            }
        }
        result
    }
}

async fn send_and_confirm(
    transport: &dyn Transport,
    operation: &'static str,
    driver: &DriverId,
) -> Result<(), ClientError> {
    let payload = serde_json::to_value(DriverTarget {
        driver_id: driver.clone(),
    })
    .map_err(TransportError::from)?;
    let reply = transport.request(operation, payload).await?;
    Ack::from_value(operation, reply)?.into_result(operation)
}

//! End-to-end behaviour of the client against the in-memory transport.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use parking_lot::Mutex;
use rideline_client::auth::StaticAuth;
use rideline_client::router::MessageRouter;
use rideline_client::store::{KeyValueStore, MemoryStore};
use rideline_client::testing::{FakeConnector, ScriptedLocation};
use rideline_client::transport::Transport;
use rideline_client::{
    ConnectOutcome, ConnectionState, Lifecycle, PositionListener, TransportSlot,
};
use rideline_core::protocol::{
    DRIVER_LOCATION_UPDATE, MESSAGE, REGISTER, SUBSCRIBE_TO_DRIVER, UNSUBSCRIBE_FROM_DRIVER,
    UPDATE_LOCATION,
};
use rideline_core::{
    AccuracyClass, ClientError, DriverId, RemotePositionEvent, RiderId, SelfPosition,
    TransportError,
};
use rideline_settings::ClientSettings;
use serde_json::{Value, json};

const CACHE_KEY: &str = "rideline.lastPosition";

struct Harness {
    lifecycle: Arc<Lifecycle>,
    connector: Arc<FakeConnector>,
    location: Arc<ScriptedLocation>,
    store: Arc<MemoryStore>,
    received: Arc<Mutex<Vec<RemotePositionEvent>>>,
}

fn device_position() -> SelfPosition {
    SelfPosition::now(12.97, 77.59, AccuracyClass::High)
}

fn harness_with(connector: Arc<FakeConnector>, location: Arc<ScriptedLocation>) -> Harness {
    harness_with_settings(ClientSettings::default(), connector, location)
}

fn harness_with_settings(
    settings: ClientSettings,
    connector: Arc<FakeConnector>,
    location: Arc<ScriptedLocation>,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let lifecycle = Lifecycle::builder(settings, location.clone())
        .connector(connector.clone())
        .store(store.clone())
        .build()
        .unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let _ = lifecycle.add_listener(Arc::new(move |e: &RemotePositionEvent| sink.lock().push(*e)));
    Harness {
        lifecycle: Arc::new(lifecycle),
        connector,
        location,
        store,
        received,
    }
}

fn harness() -> Harness {
    harness_with(
        FakeConnector::auto(),
        ScriptedLocation::returning(device_position()),
    )
}

fn rider(id: &str) -> RiderId {
    RiderId::from(id)
}

fn driver(id: &str) -> DriverId {
    DriverId::from(id)
}

fn update(lat: f64, lng: f64, heading: f64) -> Value {
    json!({ "latitude": lat, "longitude": lng, "heading_deg": heading })
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn tracked_driver_updates_reach_listeners_until_blur() {
    let h = harness();
    let outcome = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Established);
    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Connected);

    let transport = h.connector.latest().unwrap();
    let register = transport.sent_to(REGISTER);
    assert_eq!(register.len(), 1);
    assert_eq!(register[0]["role"], "rider");
    assert_eq!(register[0]["id"], "rider-1");
    assert_eq!(register[0]["lat"], 12.97);
    assert_eq!(register[0]["lng"], 77.59);
    assert!(register[0]["last_updated_at"].is_string());
    assert_eq!(
        register[0]["socketId"].as_str(),
        transport.socket_id().as_ref().map(|s| s.as_str())
    );

    h.lifecycle.on_tracking_focus(driver("driver-9")).await.unwrap();
    assert_eq!(
        transport.sent_to(SUBSCRIBE_TO_DRIVER),
        vec![json!({ "driverId": "driver-9" })]
    );

    transport.push(DRIVER_LOCATION_UPDATE, update(1.0, 2.0, 90.0)).await;
    settle().await;
    let expected = RemotePositionEvent {
        latitude: 1.0,
        longitude: 2.0,
        heading_deg: 90.0,
    };
    assert_eq!(*h.received.lock(), vec![expected]);
    assert_eq!(h.lifecycle.last_event(), Some(expected));

    h.lifecycle.on_tracking_blur().await.unwrap();
    assert_eq!(
        transport.sent_to(UNSUBSCRIBE_FROM_DRIVER),
        vec![json!({ "driverId": "driver-9" })]
    );

    transport.push(DRIVER_LOCATION_UPDATE, update(3.0, 4.0, 180.0)).await;
    settle().await;
    assert_eq!(h.received.lock().len(), 1);
}

#[tokio::test]
async fn updates_without_subscription_are_dropped() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    let transport = h.connector.latest().unwrap();
    transport.push(DRIVER_LOCATION_UPDATE, update(1.0, 1.0, 0.0)).await;
    transport.push(DRIVER_LOCATION_UPDATE, json!({ "latitude": "bad" })).await;
    settle().await;
    assert!(h.received.lock().is_empty());
    assert!(h.lifecycle.last_event().is_none());
}

#[tokio::test]
async fn connect_is_idempotent_for_the_same_rider() {
    let h = harness();
    assert_eq!(
        h.lifecycle.on_login(rider("rider-1")).await.unwrap(),
        ConnectOutcome::Established
    );
    assert_eq!(
        h.lifecycle.on_login(rider("rider-1")).await.unwrap(),
        ConnectOutcome::Reused
    );
    assert_eq!(
        h.lifecycle.on_foreground().await.unwrap(),
        Some(ConnectOutcome::Reused)
    );
    assert_eq!(h.connector.opened(), 1);
    assert_eq!(h.connector.latest().unwrap().count(REGISTER), 1);
}

#[tokio::test(start_paused = true)]
async fn reused_connect_registers_again_after_the_cooldown() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    let transport = h.connector.latest().unwrap();
    assert_eq!(transport.count(REGISTER), 1);

    tokio::time::advance(Duration::from_millis(3_100)).await;
    assert_eq!(
        h.lifecycle.on_login(rider("rider-1")).await.unwrap(),
        ConnectOutcome::Reused
    );
    assert_eq!(transport.count(REGISTER), 2);
    assert_eq!(h.connector.opened(), 1);
}

#[tokio::test]
async fn zero_cooldown_never_suppresses_registration() {
    let mut settings = ClientSettings::default();
    settings.registration.cooldown_ms = 0;
    let h = harness_with_settings(
        settings,
        FakeConnector::auto(),
        ScriptedLocation::returning(device_position()),
    );
    for _ in 0..3 {
        let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    }
    assert_eq!(h.connector.latest().unwrap().count(REGISTER), 3);
}

#[tokio::test]
async fn concurrent_connect_is_single_flight() {
    let h = harness_with(
        FakeConnector::manual(),
        ScriptedLocation::returning(device_position()),
    );
    let first = {
        let lifecycle = Arc::clone(&h.lifecycle);
        tokio::spawn(async move { lifecycle.on_login(rider("rider-1")).await })
    };
    let transport = h.connector.wait_for_open(1).await;
    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Connecting);

    assert_eq!(
        h.lifecycle.on_login(rider("rider-1")).await.unwrap(),
        ConnectOutcome::InFlight
    );

    transport.connect().await;
    assert_eq!(first.await.unwrap().unwrap(), ConnectOutcome::Established);
    assert_eq!(h.connector.opened(), 1);
    assert_eq!(transport.count(REGISTER), 1);
}

#[tokio::test]
async fn switching_rider_replaces_the_connection() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-a")).await.unwrap();
    h.lifecycle.on_tracking_focus(driver("d-1")).await.unwrap();
    let old = h.connector.latest().unwrap();

    assert_eq!(
        h.lifecycle.on_login(rider("rider-b")).await.unwrap(),
        ConnectOutcome::Established
    );
    assert_eq!(h.connector.opened(), 2);
    assert!(old.is_closed());
    assert!(h.lifecycle.subscription().target().is_none());
    assert_eq!(h.lifecycle.connection().rider_id(), Some(rider("rider-b")));

    let new = h.connector.latest().unwrap();
    assert_eq!(new.sent_to(REGISTER)[0]["id"], "rider-b");

    old.push(DRIVER_LOCATION_UPDATE, update(9.0, 9.0, 9.0)).await;
    settle().await;
    assert!(h.received.lock().is_empty());

    h.lifecycle.on_tracking_focus(driver("d-2")).await.unwrap();
    new.push(DRIVER_LOCATION_UPDATE, update(5.0, 6.0, 7.0)).await;
    settle().await;
    assert_eq!(h.received.lock().len(), 1);
}

#[tokio::test]
async fn reconnect_replays_registration_then_subscription() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    h.lifecycle.on_tracking_focus(driver("driver-9")).await.unwrap();
    let transport = h.connector.latest().unwrap();
    let first_socket = transport.socket_id().unwrap();

    transport.drop_connection("network lost").await;
    settle().await;
    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Connected);
    assert!(!h.lifecycle.connection().is_live());
    assert!(h.lifecycle.is_searching());

    transport.reconnect().await;
    settle().await;
    assert!(h.lifecycle.connection().is_live());
    assert!(!h.lifecycle.is_searching());

    let events: Vec<String> = transport.sent().into_iter().map(|s| s.event).collect();
    assert_eq!(
        events,
        vec![REGISTER, SUBSCRIBE_TO_DRIVER, REGISTER, SUBSCRIBE_TO_DRIVER]
    );
    let registers = transport.sent_to(REGISTER);
    assert_ne!(registers[1]["socketId"].as_str(), Some(first_socket.as_str()));
    assert_eq!(h.lifecycle.subscription().target(), Some(driver("driver-9")));
}

#[tokio::test]
async fn reconnect_without_target_only_registers() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    let transport = h.connector.latest().unwrap();
    transport.drop_connection("blip").await;
    transport.reconnect().await;
    settle().await;
    assert_eq!(transport.count(REGISTER), 2);
    assert_eq!(transport.count(SUBSCRIBE_TO_DRIVER), 0);
}

#[tokio::test]
async fn rejected_replay_leaves_rider_untracked() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    h.lifecycle.on_tracking_focus(driver("driver-9")).await.unwrap();
    let transport = h.connector.latest().unwrap();
    transport.script_reply(
        SUBSCRIBE_TO_DRIVER,
        Ok(json!({ "success": false, "message": "ride finished" })),
    );

    transport.drop_connection("blip").await;
    transport.reconnect().await;
    settle().await;
    assert!(!h.lifecycle.subscription().is_tracking());
    assert_eq!(transport.count(SUBSCRIBE_TO_DRIVER), 2);
}

#[tokio::test]
async fn reconnect_give_up_returns_to_idle_keeping_identity() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    let transport = h.connector.latest().unwrap();
    transport.drop_connection("gone").await;
    transport.give_up().await;
    settle().await;

    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Idle);
    assert!(transport.is_closed());
    assert_eq!(h.lifecycle.connection().rider_id(), Some(rider("rider-1")));

    assert_eq!(
        h.lifecycle.on_foreground().await.unwrap(),
        Some(ConnectOutcome::Established)
    );
    assert_eq!(h.connector.opened(), 2);
}

#[tokio::test]
async fn target_survives_a_given_up_session_and_is_resubscribed() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    h.lifecycle.on_tracking_focus(driver("driver-9")).await.unwrap();
    let first = h.connector.latest().unwrap();
    first.drop_connection("gone").await;
    first.give_up().await;
    settle().await;

    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Idle);
    assert!(h.lifecycle.is_searching());

    assert_eq!(
        h.lifecycle.on_foreground().await.unwrap(),
        Some(ConnectOutcome::Established)
    );
    let second = h.connector.latest().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(
        second.sent_to(SUBSCRIBE_TO_DRIVER),
        vec![json!({ "driverId": "driver-9" })]
    );
    let order: Vec<_> = second.sent().into_iter().map(|s| s.event).collect();
    assert_eq!(order, vec![REGISTER, SUBSCRIBE_TO_DRIVER]);
    assert!(!h.lifecycle.is_searching());

    second.push(DRIVER_LOCATION_UPDATE, update(7.0, 8.0, 10.0)).await;
    settle().await;
    assert_eq!(h.received.lock().len(), 1);
}

#[tokio::test]
async fn fresh_cache_skips_the_location_read() {
    let h = harness();
    let cached = SelfPosition::now(5.0, 6.0, AccuracyClass::Balanced);
    h.store
        .set(CACHE_KEY, serde_json::to_string(&cached).unwrap())
        .await
        .unwrap();

    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    assert_eq!(h.location.reads(), 0);
    let register = h.connector.latest().unwrap().sent_to(REGISTER);
    assert_eq!(register[0]["lat"], 5.0);
    assert_eq!(h.lifecycle.connection().self_position(), Some(cached));
}

#[tokio::test]
async fn stale_cache_is_replaced_by_a_live_read() {
    let h = harness();
    let mut stale = SelfPosition::now(1.0, 1.0, AccuracyClass::Low);
    stale.captured_at = chrono::Utc::now() - chrono::Duration::minutes(10);
    h.store
        .set(CACHE_KEY, serde_json::to_string(&stale).unwrap())
        .await
        .unwrap();

    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    assert_eq!(h.location.reads(), 1);
    let register = h.connector.latest().unwrap().sent_to(REGISTER);
    assert_eq!(register[0]["lat"], 12.97);

    let cached: SelfPosition =
        serde_json::from_str(&h.store.get(CACHE_KEY).await.unwrap().unwrap()).unwrap();
    assert_eq!(cached.latitude, 12.97);
}

#[tokio::test]
async fn corrupt_cache_falls_back_to_a_live_read() {
    let h = harness();
    h.store.set(CACHE_KEY, "{oops".into()).await.unwrap();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    assert_eq!(h.location.reads(), 1);
}

#[tokio::test]
async fn location_permission_denial_fails_connect() {
    let h = harness_with(FakeConnector::auto(), ScriptedLocation::denied());
    let err = h.lifecycle.on_login(rider("rider-1")).await.unwrap_err();
    assert_matches!(err, ClientError::PermissionDenied);
    assert!(err.is_fatal());

    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Idle);
    let transport = h.connector.latest().unwrap();
    assert!(transport.is_closed());
    assert_eq!(transport.count(REGISTER), 0);
}

#[tokio::test]
async fn first_dial_failure_surfaces_a_transport_error() {
    let h = harness_with(
        FakeConnector::manual(),
        ScriptedLocation::returning(device_position()),
    );
    let pending = {
        let lifecycle = Arc::clone(&h.lifecycle);
        tokio::spawn(async move { lifecycle.on_login(rider("rider-1")).await })
    };
    let transport = h.connector.wait_for_open(1).await;
    transport.fail_connect("connection refused").await;

    let err = pending.await.unwrap().unwrap_err();
    assert!(!err.is_fatal());
    assert_matches!(err, ClientError::Transport(TransportError::Connect(m)) => {
        assert_eq!(m, "connection refused");
    });
    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Idle);
    assert!(transport.is_closed());
}

#[tokio::test]
async fn open_failure_surfaces_a_transport_error() {
    let h = harness();
    h.connector.fail_open(true);
    let err = h.lifecycle.on_login(rider("rider-1")).await.unwrap_err();
    assert_matches!(err, ClientError::Transport(TransportError::Connect(_)));
    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Idle);

    h.connector.fail_open(false);
    assert_eq!(
        h.lifecycle.on_login(rider("rider-1")).await.unwrap(),
        ConnectOutcome::Established
    );
}

#[tokio::test]
async fn rejected_registration_fails_connect() {
    let h = harness_with(
        FakeConnector::manual(),
        ScriptedLocation::returning(device_position()),
    );
    let pending = {
        let lifecycle = Arc::clone(&h.lifecycle);
        tokio::spawn(async move { lifecycle.on_login(rider("rider-1")).await })
    };
    let transport = h.connector.wait_for_open(1).await;
    transport.script_reply(
        REGISTER,
        Ok(json!({ "success": false, "message": "unknown rider" })),
    );
    transport.connect().await;

    let err = pending.await.unwrap().unwrap_err();
    assert_matches!(err, ClientError::Rejected { operation: "register", .. });
    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Idle);
}

#[tokio::test]
async fn logout_forgets_identity_and_cache() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    h.lifecycle.on_tracking_focus(driver("driver-9")).await.unwrap();
    assert!(h.store.get(CACHE_KEY).await.unwrap().is_some());
    let transport = h.connector.latest().unwrap();

    h.lifecycle.on_logout().await;
    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Idle);
    assert!(transport.is_closed());
    assert!(h.lifecycle.connection().rider_id().is_none());
    assert!(h.lifecycle.connection().self_position().is_none());
    assert!(h.lifecycle.subscription().target().is_none());
    assert!(h.store.get(CACHE_KEY).await.unwrap().is_none());

    assert_eq!(h.lifecycle.on_foreground().await.unwrap(), None);
    assert_eq!(h.connector.opened(), 1);
}

#[tokio::test]
async fn foreground_reconnects_with_remembered_identity() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    h.lifecycle.connection().disconnect(false).await;
    assert_eq!(h.lifecycle.connection().state(), ConnectionState::Idle);

    assert_eq!(
        h.lifecycle.on_foreground().await.unwrap(),
        Some(ConnectOutcome::Established)
    );
    let register = h.connector.latest().unwrap().sent_to(REGISTER);
    assert_eq!(register[0]["id"], "rider-1");
}

#[tokio::test]
async fn foreground_respects_the_auth_session() {
    let connector = FakeConnector::auto();
    let auth = Arc::new(StaticAuth::default());
    let lifecycle = Lifecycle::builder(
        ClientSettings::default(),
        ScriptedLocation::returning(device_position()),
    )
    .connector(connector.clone())
    .auth(auth.clone())
    .build()
    .unwrap();

    assert_eq!(lifecycle.on_foreground().await.unwrap(), None);
    assert_eq!(connector.opened(), 0);

    auth.set(rider("rider-7"));
    assert_eq!(
        lifecycle.on_foreground().await.unwrap(),
        Some(ConnectOutcome::Established)
    );
    assert_eq!(lifecycle.connection().rider_id(), Some(rider("rider-7")));
}

#[tokio::test(start_paused = true)]
async fn focus_churn_is_absorbed_by_the_debounce() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    let transport = h.connector.latest().unwrap();

    h.lifecycle.on_tracking_focus(driver("driver-9")).await.unwrap();
    h.lifecycle.on_tracking_blur().await.unwrap();
    h.lifecycle.on_tracking_focus(driver("driver-9")).await.unwrap();
    assert_eq!(transport.count(SUBSCRIBE_TO_DRIVER), 1);
    assert_eq!(transport.count(UNSUBSCRIBE_FROM_DRIVER), 1);
    assert!(h.lifecycle.subscription().target().is_none());

    tokio::time::advance(Duration::from_millis(1_100)).await;
    h.lifecycle.on_tracking_focus(driver("driver-9")).await.unwrap();
    assert_eq!(transport.count(SUBSCRIBE_TO_DRIVER), 2);
    assert_eq!(h.lifecycle.subscription().target(), Some(driver("driver-9")));
}

#[tokio::test(start_paused = true)]
async fn periodic_location_updates_follow_registration() {
    let h = harness();
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    let transport = h.connector.latest().unwrap();
    assert_eq!(transport.count(UPDATE_LOCATION), 0);

    tokio::time::advance(Duration::from_secs(10)).await;
    settle().await;
    let updates = transport.sent_to(UPDATE_LOCATION);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["role"], "rider");
    assert_eq!(updates[0]["id"], "rider-1");
    assert!(transport.sent().iter().all(|s| s.event != UPDATE_LOCATION || !s.acked));

    h.lifecycle.on_logout().await;
    tokio::time::advance(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(transport.count(UPDATE_LOCATION), 1);
}

#[tokio::test]
async fn manual_location_update_requires_a_connection() {
    let h = harness();
    assert_matches!(
        h.lifecycle.connection().send_location_update().await,
        Err(ClientError::Transport(TransportError::NotConnected))
    );
    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    h.lifecycle.connection().send_location_update().await.unwrap();
    assert_eq!(h.connector.latest().unwrap().count(UPDATE_LOCATION), 1);
}

#[tokio::test]
async fn panicking_listener_does_not_silence_others() {
    let h = harness();
    fn explode(_: &RemotePositionEvent) {
        panic!("listener bug");
    }
    let bad: Arc<dyn PositionListener> = Arc::new(explode);
    assert!(h.lifecycle.add_listener(Arc::clone(&bad)));

    let _ = h.lifecycle.on_login(rider("rider-1")).await.unwrap();
    h.lifecycle.on_tracking_focus(driver("driver-9")).await.unwrap();
    let transport = h.connector.latest().unwrap();
    transport.push(DRIVER_LOCATION_UPDATE, update(1.0, 1.0, 1.0)).await;
    transport.push(DRIVER_LOCATION_UPDATE, update(2.0, 2.0, 2.0)).await;
    settle().await;
    assert_eq!(h.received.lock().len(), 2);

    assert!(h.lifecycle.remove_listener(&bad));
    assert_eq!(h.lifecycle.listeners().len(), 1);
}

struct RecordingRouter(Mutex<Vec<Value>>);

impl MessageRouter for RecordingRouter {
    fn route(&self, envelope: Value) {
        self.0.lock().push(envelope);
    }
}

#[tokio::test]
async fn message_envelopes_go_to_the_router() {
    let connector = FakeConnector::auto();
    let router = Arc::new(RecordingRouter(Mutex::new(Vec::new())));
    let lifecycle = Lifecycle::builder(
        ClientSettings::default(),
        ScriptedLocation::returning(device_position()),
    )
    .connector(connector.clone())
    .router(router.clone())
    .build()
    .unwrap();

    let _ = lifecycle.on_login(rider("rider-1")).await.unwrap();
    connector
        .latest()
        .unwrap()
        .push(MESSAGE, json!({ "type": "ride:accepted" }))
        .await;
    settle().await;
    assert_eq!(*router.0.lock(), vec![json!({ "type": "ride:accepted" })]);
}

#[tokio::test]
async fn second_client_closes_the_orphaned_transport() {
    let slot = Arc::new(TransportSlot::new());
    let build = |connector: Arc<FakeConnector>| {
        Lifecycle::builder(
            ClientSettings::default(),
            ScriptedLocation::returning(device_position()),
        )
        .connector(connector)
        .slot(Arc::clone(&slot))
        .build()
        .unwrap()
    };
    let first_connector = FakeConnector::auto();
    let second_connector = FakeConnector::auto();
    let first = build(first_connector.clone());
    let second = build(second_connector.clone());

    let _ = first.on_login(rider("rider-1")).await.unwrap();
    let _ = second.on_login(rider("rider-1")).await.unwrap();
    settle().await;

    assert!(first_connector.latest().unwrap().is_closed());
    assert!(!second_connector.latest().unwrap().is_closed());
    assert_eq!(first.connection().state(), ConnectionState::Idle);
    assert_eq!(second.connection().state(), ConnectionState::Connected);
}

#[tokio::test]
async fn invalid_settings_are_rejected_at_build() {
    let mut settings = ClientSettings::default();
    settings.transport.ack_timeout_ms = 0;
    let result = Lifecycle::builder(settings, ScriptedLocation::returning(device_position()))
        .connector(FakeConnector::auto())
        .build();
    assert!(result.is_err());
}

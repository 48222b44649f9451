//! # rideline-client
//!
//! Real-time driver-location streaming client for the rider app.
//!
//! - [`cache::PositionCache`]: last known self-position with freshness checks
//! - [`connection::ConnectionManager`]: single-flight connect, registration,
//!   reconnect recovery, periodic location pushes
//! - [`subscription::SubscriptionController`]: debounced subscribe/unsubscribe
//!   with ack correlation and replay after reconnect
//! - [`listeners::ListenerRegistry`]: isolated fan-out of driver positions
//! - [`lifecycle::Lifecycle`]: façade mapping app events (login, foreground,
//!   screen focus/blur, logout) onto the components above
//! - [`transport`]: the `Transport`/`Connector` seam and the `WebSocket`
//!   implementation with automatic fixed-backoff reconnect

#![deny(unsafe_code)]

pub mod auth;
pub mod cache;
pub mod connection;
pub mod lifecycle;
pub mod listeners;
pub mod location;
pub mod router;
pub mod slot;
pub mod store;
pub mod subscription;
pub mod testing;
pub mod transport;

pub use connection::{ConnectOutcome, ConnectionManager, ConnectionState};
pub use lifecycle::{Lifecycle, LifecycleBuilder};
pub use listeners::{ListenerRegistry, PositionListener};
pub use slot::TransportSlot;
pub use subscription::SubscriptionController;

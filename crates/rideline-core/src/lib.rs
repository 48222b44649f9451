//! # rideline-core
//!
//! Foundation types shared by every rideline crate:
//!
//! - **Branded IDs**: `RiderId`, `DriverId`, `SocketId` as newtypes for type safety
//! - **Positions**: [`SelfPosition`] (the rider device) and [`RemotePositionEvent`] (the driver)
//! - **Protocol**: event names and payloads exchanged with the location server
//! - **Errors**: `ClientError` hierarchy via `thiserror`, classified by [`ErrorKind`]
//! - **Logging**: `tracing` subscriber initialisation

#![deny(unsafe_code)]

pub mod errors;
pub mod ids;
pub mod logging;
pub mod position;
pub mod protocol;

pub use errors::{ClientError, ErrorKind, LocationError, StoreError, TransportError};
pub use ids::{DriverId, RiderId, SocketId};
pub use position::{AccuracyClass, RemotePositionEvent, SelfPosition};

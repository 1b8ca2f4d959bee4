//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the realtime core to external systems:
//! - `auth` - Session validators (JWT, mock)
//! - `bus` - Broadcast bus and its pub/sub transports (Redis, in-memory)
//! - `http` - Router assembly and operational endpoints
//! - `memory` - In-memory change feed and dashboard resolver
//! - `postgres` - LISTEN/NOTIFY change feed and dashboard resolver
//! - `websocket` - Connection registry and the client socket handler

pub mod auth;
pub mod bus;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod websocket;

pub use bus::{BroadcastBus, Delivery};
pub use websocket::ConnectionRegistry;

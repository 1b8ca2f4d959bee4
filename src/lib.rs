//! Dashboard Realtime - live change notifications for dashboards.
//!
//! Watches upstream data collections for changes, resolves which dashboards
//! reference them, and pushes normalized events to every WebSocket client
//! subscribed to those dashboards, across all server instances.
//!
//! ```text
//! change feed ─► ChangeWatcher ─► BroadcastBus ─► ConnectionRegistry ─► clients
//!                                     ▲
//!                       EventCoordinator (lifecycle, heartbeat, triggers)
//! ```

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the realtime core and the outside world. Adapters implement these ports.
//!
//! ## Change Source Ports
//!
//! - `ChangeFeed` - Live feed of data collection changes
//! - `DashboardResolver` - Data collection id → referencing dashboards
//! - `ChangeListener` - Receives resolved changes from the watcher
//!
//! ## Delivery Ports
//!
//! - `PubSubTransport` - Cross-instance publish/subscribe medium
//! - `ClientSink` - Send half of a single client connection
//!
//! ## Auth Ports
//!
//! - `SessionValidator` - Bearer token validation

mod change_feed;
mod change_listener;
mod client_sink;
mod dashboard_resolver;
mod pubsub_transport;
mod session_validator;

pub use change_feed::{ChangeFeed, ChangeFeedError, ChangeRecord, ChangeStream, OperationType};
pub use change_listener::ChangeListener;
pub use client_sink::{ClientSink, SendError};
pub use dashboard_resolver::{DashboardResolver, ResolveError};
pub use pubsub_transport::{BusError, BusMessage, BusMessageStream, PubSubTransport};
pub use session_validator::SessionValidator;

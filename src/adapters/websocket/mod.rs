//! WebSocket adapter for real-time dashboard events.
//!
//! Holds the per-process connection registry and the axum endpoint clients
//! connect to.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   publish   ┌──────────────┐  psubscribe  ┌──────────────┐
//! │  Coordinator │ ──────────► │ BroadcastBus │ ───────────► │   Registry   │
//! └──────────────┘             └──────────────┘  (every       └──────┬───────┘
//!                                                 instance)          │ scoped copy
//!                                                             ┌──────▼───────┐
//!                                                             │ WebSocketSink│
//!                                                             └──────┬───────┘
//!                                                                    │
//!                                                             ┌──────▼───────┐
//!                                                             │   Browser    │
//!                                                             └──────────────┘
//! ```

mod handler;
mod recording_sink;
mod registry;
mod sink;

pub use handler::{websocket_router, ws_handler, ConnectParams, WebSocketState};
pub use recording_sink::RecordingSink;
pub use registry::{Accepted, ConnectionInfo, ConnectionRegistry, RegistryError};
pub use sink::WebSocketSink;

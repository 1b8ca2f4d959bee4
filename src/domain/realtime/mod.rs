//! Realtime notification vocabulary: the [`Event`], its payload shapes and
//! the client protocol that carries it.

mod event;
pub mod payload;
pub mod protocol;

pub use event::{Event, EventKind, EventScope, EventSource, Payload};
pub use payload::{
    DataCollectionChangePayload, ErrorPayload, HeartbeatPayload, IntoPayload, ManualTriggerPayload,
};
pub use protocol::{ClientMessage, ControlMessage, ServerMessage};

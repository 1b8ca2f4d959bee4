//! ClientSink port - the send half of one client connection.
//!
//! The connection registry never touches a socket directly; each accepted
//! connection hands it a sink. The WebSocket adapter backs this with a
//! bounded queue drained by a writer task, so `send` never waits on a slow
//! client.

use async_trait::async_trait;

use crate::domain::realtime::ServerMessage;

/// Errors that can occur when handing a message to a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The connection's writer has gone away.
    #[error("Connection closed")]
    Closed,

    /// The client is not draining its queue fast enough.
    #[error("Outbound queue full")]
    QueueFull,

    /// The message could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for delivering server messages to a single client.
///
/// Any error is treated by the registry as a dead connection.
#[async_trait]
pub trait ClientSink: Send + Sync {
    /// Hand one message to the client.
    async fn send(&self, message: &ServerMessage) -> Result<(), SendError>;
}

//! PubSubTransport port - the shared medium behind the broadcast bus.
//!
//! In a multi-server deployment every instance publishes to and
//! pattern-subscribes on the same broker, so an event published on
//! Server A reaches the connections held by Server B.
//!
//! ## Use Case
//!
//! 1. A change resolves to dashboard `d1` on Server A
//! 2. Server A publishes the event on channel `dashboard_events:d1`
//! 3. Every instance (A included) receives it through its pattern subscription
//! 4. Each instance delivers it to its own local subscribers of `d1`

use async_trait::async_trait;
use futures::stream::BoxStream;

/// A message received from a pattern subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Concrete channel the message was published on.
    pub channel: String,

    /// Serialized event.
    pub payload: String,
}

/// Stream of received messages. It ends when the subscription is lost.
pub type BusMessageStream = BoxStream<'static, Result<BusMessage, BusError>>;

/// Errors that can occur on the pub/sub transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// Broker communication error
    #[error("Transport error: {0}")]
    Transport(String),

    /// The subscriber fell behind and messages were dropped
    #[error("Subscriber lagged, {0} messages dropped")]
    Lagged(u64),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Port for publishing to and pattern-subscribing on named channels.
///
/// Delivery is best effort: no acknowledgement, no replay.
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Publish a payload on a channel. Returns once the broker accepted it.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;

    /// Subscribe to every channel matching a glob pattern (`prefix*`).
    async fn psubscribe(&self, pattern: &str) -> Result<BusMessageStream, BusError>;

    /// Transport name for logging and status reporting.
    fn name(&self) -> &'static str;
}

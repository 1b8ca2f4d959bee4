//! In-memory pub/sub transport for testing and single-process runs.
//!
//! Cloning the transport shares the underlying channel, so several buses
//! built on clones behave like instances attached to the same broker.
//!
//! # Example
//!
//! ```ignore
//! let transport = InMemoryTransport::new();
//! let bus_a = BroadcastBus::new(Some(Arc::new(transport.clone())), registry_a, prefix);
//! let bus_b = BroadcastBus::new(Some(Arc::new(transport.clone())), registry_b, prefix);
//!
//! // Publish on A, both A and B listeners receive it
//! bus_a.publish(&dashboard_id, &event).await;
//! assert_eq!(transport.published().len(), 1);
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::broadcast;

use crate::ports::{BusError, BusMessage, BusMessageStream, PubSubTransport};

#[derive(Clone)]
pub struct InMemoryTransport {
    sender: broadcast::Sender<BusMessage>,
    published: Arc<Mutex<Vec<BusMessage>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: Arc::new(Mutex::new(Vec::new())),
            unavailable: Arc::new(Mutex::new(false)),
        }
    }

    // === Test Helpers ===

    /// Every message published so far, in order.
    pub fn published(&self) -> Vec<BusMessage> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Makes publish and psubscribe fail, simulating a broker outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self
            .unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = unavailable;
    }

    /// Number of active pattern subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn check_available(&self) -> Result<(), BusError> {
        if *self
            .unavailable
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            return Err(BusError::Transport("broker unavailable".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Glob match supporting a single trailing `*`, which is all the bus uses.
fn matches_pattern(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}

#[async_trait]
impl PubSubTransport for InMemoryTransport {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        self.check_available()?;

        let message = BusMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());

        // No subscribers is not an error
        let _ = self.sender.send(message);
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<BusMessageStream, BusError> {
        self.check_available()?;

        let receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let messages = stream::unfold((receiver, pattern), |(mut receiver, pattern)| async move {
            loop {
                match receiver.recv().await {
                    Ok(message) if matches_pattern(&pattern, &message.channel) => {
                        return Some((Ok(message), (receiver, pattern)));
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        return Some((Err(BusError::Lagged(n)), (receiver, pattern)));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(messages))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

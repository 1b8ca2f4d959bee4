//! BroadcastBus - cross-instance relay for dashboard events.
//!
//! Every instance publishes events on a per-dashboard channel and listens
//! on the matching pattern, so a change resolved on one instance reaches
//! clients connected to any of them:
//!
//! ```text
//! Instance A                     Redis                      Instance B
//! publish(d1, event) ──► dashboard_events:d1 ──┬──► listener ──► registry B
//!                                              └──► listener ──► registry A
//! ```
//!
//! The publisher receives its own message through its listener, which is
//! how its local clients are served. Without a transport (not configured,
//! or unreachable at startup) the bus runs in local-only mode and hands
//! events straight to the local registry.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;

use crate::adapters::websocket::ConnectionRegistry;
use crate::config::RedisConfig;
use crate::domain::foundation::DashboardId;
use crate::domain::realtime::Event;
use crate::ports::{BusError, BusMessage, PubSubTransport};

use super::RedisTransport;

/// Mode name reported when no transport is attached.
pub const LOCAL_MODE: &str = "local";

/// How a published event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the transport; listeners deliver it.
    Published,

    /// Delivered directly to this instance's subscribers.
    Local { delivered: usize },
}

pub struct BroadcastBus {
    transport: Option<Arc<dyn PubSubTransport>>,
    registry: Arc<ConnectionRegistry>,
    channel_prefix: String,
}

impl BroadcastBus {
    pub fn new(
        transport: Option<Arc<dyn PubSubTransport>>,
        registry: Arc<ConnectionRegistry>,
        channel_prefix: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            registry,
            channel_prefix: channel_prefix.into(),
        }
    }

    /// A bus without transport that only serves this instance.
    pub fn local(registry: Arc<ConnectionRegistry>, channel_prefix: impl Into<String>) -> Self {
        Self::new(None, registry, channel_prefix)
    }

    /// Connects to Redis when configured.
    ///
    /// Never fails: an unconfigured or unreachable Redis yields a local-only
    /// bus and a warning.
    pub async fn connect(
        config: &RedisConfig,
        channel_prefix: impl Into<String>,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        if !config.is_configured() {
            tracing::info!("Redis not configured, broadcast bus running in local mode");
            return Self::local(registry, channel_prefix);
        }

        match RedisTransport::connect(&config.url, config.timeout()).await {
            Ok(transport) => {
                tracing::info!("Broadcast bus connected to Redis");
                Self::new(Some(Arc::new(transport)), registry, channel_prefix)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Redis unavailable, broadcast bus falling back to local delivery"
                );
                Self::local(registry, channel_prefix)
            }
        }
    }

    /// Transport name, or `"local"`.
    pub fn mode(&self) -> &'static str {
        self.transport
            .as_ref()
            .map(|t| t.name())
            .unwrap_or(LOCAL_MODE)
    }

    /// True when events travel through a shared transport.
    pub fn is_distributed(&self) -> bool {
        self.transport.is_some()
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    // === Channel naming ===

    /// `<prefix><dashboard_id>`
    pub fn channel_for(&self, dashboard_id: &DashboardId) -> String {
        format!("{}{}", self.channel_prefix, dashboard_id)
    }

    /// `<prefix>*`
    pub fn listen_pattern(&self) -> String {
        format!("{}*", self.channel_prefix)
    }

    /// Recovers the dashboard id from a channel name.
    pub fn dashboard_from_channel(&self, channel: &str) -> Option<DashboardId> {
        channel
            .strip_prefix(&self.channel_prefix)
            .and_then(|id| DashboardId::new(id).ok())
    }

    // === Publishing ===

    /// Publishes `event` for `dashboard_id`.
    ///
    /// Falls back to local delivery when there is no transport or the
    /// publish fails.
    pub async fn publish(&self, dashboard_id: &DashboardId, event: &Event) -> Delivery {
        let Some(transport) = &self.transport else {
            return self.deliver_locally(dashboard_id, event).await;
        };

        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(dashboard_id = %dashboard_id, error = %e, "Failed to serialize event");
                return self.deliver_locally(dashboard_id, event).await;
            }
        };

        let channel = self.channel_for(dashboard_id);
        match transport.publish(&channel, &payload).await {
            Ok(()) => {
                tracing::debug!(channel = %channel, event_type = ?event.kind(), "Event published");
                Delivery::Published
            }
            Err(e) => {
                tracing::warn!(
                    channel = %channel,
                    error = %e,
                    "Publish failed, delivering locally"
                );
                self.deliver_locally(dashboard_id, event).await
            }
        }
    }

    async fn deliver_locally(&self, dashboard_id: &DashboardId, event: &Event) -> Delivery {
        let delivered = self.registry.send_to_dashboard(dashboard_id, event).await;
        Delivery::Local { delivered }
    }

    // === Listening ===

    /// Relays messages from the transport to local subscribers until
    /// shutdown is signalled or the subscription is lost.
    ///
    /// Returns immediately in local mode. A lost subscription is not
    /// re-established.
    pub async fn listen(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), BusError> {
        let Some(transport) = &self.transport else {
            tracing::debug!("Local mode, no bus listener needed");
            return Ok(());
        };

        let pattern = self.listen_pattern();
        let mut messages = transport.psubscribe(&pattern).await.map_err(|e| {
            tracing::error!(pattern = %pattern, error = %e, "Pattern subscribe failed");
            e
        })?;
        tracing::info!(pattern = %pattern, transport = transport.name(), "Bus listener started");

        if *shutdown.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Bus listener stopping");
                        return Ok(());
                    }
                }

                next = messages.next() => match next {
                    Some(Ok(message)) => {
                        self.relay(message).await;
                    }
                    Some(Err(BusError::Lagged(n))) => {
                        tracing::warn!(dropped = n, "Bus listener lagged");
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Bus subscription failed, listener exiting");
                        return Err(e);
                    }
                    None => {
                        tracing::error!("Bus subscription closed, listener exiting");
                        return Err(BusError::Transport("subscription closed".to_string()));
                    }
                },
            }
        }
    }

    /// Delivers one received message. Returns the number of local
    /// deliveries, or `None` if the message was unusable.
    pub async fn relay(&self, message: BusMessage) -> Option<usize> {
        let Some(dashboard_id) = self.dashboard_from_channel(&message.channel) else {
            tracing::warn!(channel = %message.channel, "Message on unexpected channel");
            return None;
        };

        let event: Event = match serde_json::from_str(&message.payload) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(channel = %message.channel, error = %e, "Undecodable bus message");
                return None;
            }
        };

        Some(self.registry.send_to_dashboard(&dashboard_id, &event).await)
    }
}

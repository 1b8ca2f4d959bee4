//! Connection registry for dashboard-scoped message routing.
//!
//! Tracks every live client connection of this process and which dashboard
//! each one is subscribed to.
//!
//! # Architecture
//!
//! ```text
//! Dashboard: d1        Dashboard: d2
//! ├── client-a         └── client-c
//! └── client-b
//! ```
//!
//! An event for d1 reaches clients a and b only. A client holds at most one
//! subscription; subscribing again moves it.
//!
//! # Invariant
//!
//! A client id is in the subscriber set of dashboard D exactly when that
//! connection's `dashboard_id` is D, and no empty subscriber set is kept.
//! Both maps live behind one lock so this holds after every operation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{watch, RwLock};

use crate::domain::foundation::{ClientId, DashboardId, Timestamp, UserId};
use crate::domain::realtime::{ControlMessage, Event, ServerMessage};
use crate::ports::{ClientSink, SendError};

/// Errors returned by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    /// The `connection_established` message could not be delivered.
    #[error("Handshake with client {client_id} failed: {source}")]
    HandshakeFailed {
        client_id: ClientId,
        #[source]
        source: SendError,
    },
}

/// Result of a successful [`ConnectionRegistry::accept`].
#[derive(Debug)]
pub struct Accepted {
    pub client_id: ClientId,

    /// Flips to `true` once the registry disconnects this client. The
    /// connection's read loop watches it to stop.
    pub closed: watch::Receiver<bool>,
}

/// Snapshot of a connection's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub client_id: ClientId,
    pub user_id: Option<UserId>,
    pub dashboard_id: Option<DashboardId>,
    pub connected_at: Timestamp,
}

struct Connection {
    info: ConnectionInfo,
    sink: Arc<dyn ClientSink>,
    closed: watch::Sender<bool>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ClientId, Connection>,
    subscribers: HashMap<DashboardId, HashSet<ClientId>>,
}

impl RegistryState {
    fn remove_subscriber(&mut self, dashboard_id: &DashboardId, client_id: &ClientId) {
        if let Some(set) = self.subscribers.get_mut(dashboard_id) {
            set.remove(client_id);
            if set.is_empty() {
                self.subscribers.remove(dashboard_id);
            }
        }
    }

    fn subscribe(
        &mut self,
        client_id: ClientId,
        dashboard_id: DashboardId,
    ) -> Result<(), RegistryError> {
        let connection = self
            .connections
            .get_mut(&client_id)
            .ok_or(RegistryError::UnknownClient(client_id))?;

        let previous = connection.info.dashboard_id.replace(dashboard_id.clone());
        if let Some(previous) = previous.filter(|p| p != &dashboard_id) {
            self.remove_subscriber(&previous, &client_id);
        }

        self.subscribers
            .entry(dashboard_id)
            .or_default()
            .insert(client_id);
        Ok(())
    }
}

/// Live connections of this process and the dashboard → subscribers index.
///
/// # Thread Safety
///
/// Uses a single `RwLock` over both maps. Fan-out takes a read lock only
/// long enough to snapshot the subscriber sinks; sends happen after it is
/// released, so a slow client never holds up subscribe/disconnect.
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Registers a new connection and sends it `connection_established`.
    ///
    /// When `dashboard_id` is given the client is subscribed before the
    /// handshake, so the handshake lists it. If the handshake cannot be
    /// delivered the connection is removed again.
    pub async fn accept(
        &self,
        sink: Arc<dyn ClientSink>,
        dashboard_id: Option<DashboardId>,
        user_id: Option<UserId>,
    ) -> Result<Accepted, RegistryError> {
        let client_id = ClientId::new();
        let (closed_tx, closed_rx) = watch::channel(false);

        {
            let mut state = self.state.write().await;
            state.connections.insert(
                client_id,
                Connection {
                    info: ConnectionInfo {
                        client_id,
                        user_id,
                        dashboard_id: None,
                        connected_at: Timestamp::now(),
                    },
                    sink: sink.clone(),
                    closed: closed_tx,
                },
            );
            if let Some(dashboard_id) = dashboard_id.clone() {
                state.subscribe(client_id, dashboard_id)?;
            }
        }

        let handshake = ServerMessage::from(ControlMessage::ConnectionEstablished {
            client_id,
            subscriptions: dashboard_id.iter().cloned().collect(),
        });

        if let Err(source) = sink.send(&handshake).await {
            self.disconnect(&client_id).await;
            return Err(RegistryError::HandshakeFailed { client_id, source });
        }

        tracing::info!(
            client_id = %client_id,
            dashboard_id = dashboard_id.as_ref().map(|d| d.as_str()),
            "Client connected"
        );

        Ok(Accepted {
            client_id,
            closed: closed_rx,
        })
    }

    /// Removes a connection from every subscriber set and signals its
    /// reader to stop.
    ///
    /// Returns `false` if the client was already gone.
    pub async fn disconnect(&self, client_id: &ClientId) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            let Some(connection) = state.connections.remove(client_id) else {
                return false;
            };
            if let Some(dashboard_id) = &connection.info.dashboard_id {
                state.remove_subscriber(dashboard_id, client_id);
            }
            connection
        };

        // Receivers may already be dropped
        let _ = removed.closed.send(true);

        tracing::info!(client_id = %client_id, "Client disconnected");
        true
    }

    /// Subscribes the client to `dashboard_id`, replacing any previous subscription.
    pub async fn subscribe(
        &self,
        client_id: &ClientId,
        dashboard_id: DashboardId,
    ) -> Result<(), RegistryError> {
        self.state
            .write()
            .await
            .subscribe(*client_id, dashboard_id.clone())?;

        tracing::debug!(client_id = %client_id, dashboard_id = %dashboard_id, "Subscribed");
        Ok(())
    }

    /// Removes the client's subscription to `dashboard_id`.
    ///
    /// Does nothing if the client is subscribed elsewhere or not at all.
    pub async fn unsubscribe(
        &self,
        client_id: &ClientId,
        dashboard_id: &DashboardId,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.write().await;
        let connection = state
            .connections
            .get_mut(client_id)
            .ok_or(RegistryError::UnknownClient(*client_id))?;

        if connection.info.dashboard_id.as_ref() == Some(dashboard_id) {
            connection.info.dashboard_id = None;
            state.remove_subscriber(dashboard_id, client_id);
            tracing::debug!(client_id = %client_id, dashboard_id = %dashboard_id, "Unsubscribed");
        }
        Ok(())
    }

    /// Delivers `event` to every local subscriber of `dashboard_id`.
    ///
    /// Each subscriber receives a copy scoped to the dashboard. Clients whose
    /// send fails are disconnected once the fan-out is done. Returns the
    /// number of successful deliveries.
    pub async fn send_to_dashboard(&self, dashboard_id: &DashboardId, event: &Event) -> usize {
        let targets: Vec<(ClientId, Arc<dyn ClientSink>)> = {
            let state = self.state.read().await;
            let Some(client_ids) = state.subscribers.get(dashboard_id) else {
                return 0;
            };
            client_ids
                .iter()
                .filter_map(|id| {
                    state
                        .connections
                        .get(id)
                        .map(|conn| (*id, conn.sink.clone()))
                })
                .collect()
        };

        let message = ServerMessage::from(event.scoped_to(dashboard_id));
        let results = join_all(targets.iter().map(|(client_id, sink)| {
            let message = &message;
            async move { (*client_id, sink.send(message).await) }
        }))
        .await;

        let mut delivered = 0;
        for (client_id, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        client_id = %client_id,
                        dashboard_id = %dashboard_id,
                        error = %e,
                        "Send failed, dropping connection"
                    );
                    self.disconnect(&client_id).await;
                }
            }
        }

        tracing::debug!(
            dashboard_id = %dashboard_id,
            event_type = ?event.kind(),
            delivered,
            "Event delivered to local subscribers"
        );
        delivered
    }

    /// Sends a heartbeat event to one client.
    ///
    /// A failed heartbeat is logged and otherwise ignored; the next event
    /// send will surface a dead connection.
    pub async fn heartbeat(&self, client_id: &ClientId) -> bool {
        let sink = {
            let state = self.state.read().await;
            match state.connections.get(client_id) {
                Some(conn) => conn.sink.clone(),
                None => return false,
            }
        };

        match sink.send(&ServerMessage::from(Event::heartbeat())).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(client_id = %client_id, error = %e, "Heartbeat send failed");
                false
            }
        }
    }

    // === Introspection ===

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Number of local clients subscribed to `dashboard_id`.
    pub async fn subscriber_count(&self, dashboard_id: &DashboardId) -> usize {
        self.state
            .read()
            .await
            .subscribers
            .get(dashboard_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    /// Client ids subscribed to `dashboard_id`.
    pub async fn subscribers(&self, dashboard_id: &DashboardId) -> Vec<ClientId> {
        self.state
            .read()
            .await
            .subscribers
            .get(dashboard_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Dashboards with at least one local subscriber, sorted.
    pub async fn subscribed_dashboards(&self) -> Vec<DashboardId> {
        let mut dashboards: Vec<DashboardId> =
            self.state.read().await.subscribers.keys().cloned().collect();
        dashboards.sort();
        dashboards
    }

    pub async fn client_ids(&self) -> Vec<ClientId> {
        self.state.read().await.connections.keys().copied().collect()
    }

    pub async fn connection(&self, client_id: &ClientId) -> Option<ConnectionInfo> {
        self.state
            .read()
            .await
            .connections
            .get(client_id)
            .map(|conn| conn.info.clone())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::websocket::RecordingSink;
    use crate::domain::realtime::{EventKind, EventSource};

    fn dashboard(id: &str) -> DashboardId {
        DashboardId::new(id).unwrap()
    }

    fn change_event() -> Event {
        Event::new(EventKind::DataCollectionUpdated, EventSource::ChangeFeed)
    }

    async fn connect(
        registry: &ConnectionRegistry,
        dashboard_id: Option<&str>,
    ) -> (Accepted, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let accepted = registry
            .accept(sink.clone(), dashboard_id.map(dashboard), None)
            .await
            .unwrap();
        (accepted, sink)
    }

    #[tokio::test]
    async fn accept_sends_connection_established_first() {
        let registry = ConnectionRegistry::new();
        let (accepted, sink) = connect(&registry, Some("d1")).await;

        let messages = sink.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            ServerMessage::from(ControlMessage::ConnectionEstablished {
                client_id: accepted.client_id,
                subscriptions: vec![dashboard("d1")],
            })
        );
        assert_eq!(registry.connection_count().await, 1);
        assert_eq!(registry.subscriber_count(&dashboard("d1")).await, 1);
    }

    #[tokio::test]
    async fn accept_without_dashboard_has_no_subscription() {
        let registry = ConnectionRegistry::new();
        let (accepted, _sink) = connect(&registry, None).await;

        let info = registry.connection(&accepted.client_id).await.unwrap();
        assert_eq!(info.dashboard_id, None);
        assert!(registry.subscribed_dashboards().await.is_empty());
    }

    #[tokio::test]
    async fn failed_handshake_removes_connection() {
        let registry = ConnectionRegistry::new();
        let sink = Arc::new(RecordingSink::failing());

        let result = registry.accept(sink, Some(dashboard("d1")), None).await;

        assert!(matches!(result, Err(RegistryError::HandshakeFailed { .. })));
        assert_eq!(registry.connection_count().await, 0);
        assert!(registry.subscribed_dashboards().await.is_empty());
    }

    #[tokio::test]
    async fn send_to_dashboard_reaches_only_its_subscribers() {
        let registry = ConnectionRegistry::new();
        let (_a, sink_a) = connect(&registry, Some("d1")).await;
        let (_b, sink_b) = connect(&registry, Some("d1")).await;
        let (_c, sink_c) = connect(&registry, Some("d2")).await;

        let delivered = registry
            .send_to_dashboard(&dashboard("d1"), &change_event())
            .await;

        assert_eq!(delivered, 2);
        assert_eq!(sink_a.events().len(), 1);
        assert_eq!(sink_b.events().len(), 1);
        assert!(sink_c.events().is_empty());
        assert_eq!(sink_a.events()[0].dashboard_id(), Some(&dashboard("d1")));
    }

    #[tokio::test]
    async fn send_to_dashboard_without_subscribers_is_noop() {
        let registry = ConnectionRegistry::new();
        let delivered = registry
            .send_to_dashboard(&dashboard("nobody"), &change_event())
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn failing_sink_is_removed_after_fanout() {
        let registry = ConnectionRegistry::new();
        let (good, good_sink) = connect(&registry, Some("d1")).await;
        let (bad, bad_sink) = connect(&registry, Some("d1")).await;
        bad_sink.fail_sends();

        let delivered = registry
            .send_to_dashboard(&dashboard("d1"), &change_event())
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(good_sink.events().len(), 1);
        assert!(registry.connection(&bad.client_id).await.is_none());
        assert!(registry.connection(&good.client_id).await.is_some());
        assert_eq!(registry.subscribers(&dashboard("d1")).await, vec![good.client_id]);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_signals_closed() {
        let registry = ConnectionRegistry::new();
        let (accepted, _sink) = connect(&registry, Some("d1")).await;
        let closed = accepted.closed.clone();

        assert!(registry.disconnect(&accepted.client_id).await);
        assert!(!registry.disconnect(&accepted.client_id).await);

        assert!(*closed.borrow());
        assert_eq!(registry.connection_count().await, 0);
        assert_eq!(registry.subscriber_count(&dashboard("d1")).await, 0);
        assert!(registry.subscribed_dashboards().await.is_empty());
    }

    #[tokio::test]
    async fn subscribe_moves_existing_subscription() {
        let registry = ConnectionRegistry::new();
        let (accepted, _sink) = connect(&registry, Some("d1")).await;

        registry
            .subscribe(&accepted.client_id, dashboard("d2"))
            .await
            .unwrap();

        assert_eq!(registry.subscribed_dashboards().await, vec![dashboard("d2")]);
        assert_eq!(
            registry.connection(&accepted.client_id).await.unwrap().dashboard_id,
            Some(dashboard("d2"))
        );
    }

    #[tokio::test]
    async fn subscribe_then_unsubscribe_leaves_no_empty_key() {
        let registry = ConnectionRegistry::new();
        let (accepted, _sink) = connect(&registry, None).await;

        registry
            .subscribe(&accepted.client_id, dashboard("d1"))
            .await
            .unwrap();
        registry
            .unsubscribe(&accepted.client_id, &dashboard("d1"))
            .await
            .unwrap();

        assert!(registry.subscribed_dashboards().await.is_empty());
        assert_eq!(
            registry.connection(&accepted.client_id).await.unwrap().dashboard_id,
            None
        );
    }

    #[tokio::test]
    async fn unsubscribe_from_other_dashboard_keeps_subscription() {
        let registry = ConnectionRegistry::new();
        let (accepted, _sink) = connect(&registry, Some("d1")).await;

        registry
            .unsubscribe(&accepted.client_id, &dashboard("d2"))
            .await
            .unwrap();

        assert_eq!(registry.subscriber_count(&dashboard("d1")).await, 1);
    }

    #[tokio::test]
    async fn unknown_client_operations_fail() {
        let registry = ConnectionRegistry::new();
        let ghost = ClientId::new();

        assert_eq!(
            registry.subscribe(&ghost, dashboard("d1")).await,
            Err(RegistryError::UnknownClient(ghost))
        );
        assert_eq!(
            registry.unsubscribe(&ghost, &dashboard("d1")).await,
            Err(RegistryError::UnknownClient(ghost))
        );
        assert!(registry.subscribed_dashboards().await.is_empty());
    }

    #[tokio::test]
    async fn heartbeat_failure_does_not_disconnect() {
        let registry = ConnectionRegistry::new();
        let (accepted, sink) = connect(&registry, None).await;
        sink.fail_sends();

        assert!(!registry.heartbeat(&accepted.client_id).await);
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn heartbeat_carries_server_time() {
        let registry = ConnectionRegistry::new();
        let (accepted, sink) = connect(&registry, None).await;

        assert!(registry.heartbeat(&accepted.client_id).await);
        assert!(!registry.heartbeat(&ClientId::new()).await);

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::Heartbeat);
        assert!(events[0].payload().contains_key("server_time"));
    }
}

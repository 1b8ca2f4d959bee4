//! EventCoordinator - owns the realtime subsystem's background tasks.
//!
//! ## Tasks
//!
//! | Task | Runs when | Stops on |
//! |------|-----------|----------|
//! | bus listener | bus has a transport | shutdown or lost subscription |
//! | change watcher | change feed enabled and configured | shutdown |
//! | heartbeat loop | always (when enabled) | shutdown |
//!
//! Start order is listener, watcher, heartbeat. `stop` tears down in reverse
//! so nothing keeps publishing into a registry that is going away.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::adapters::bus::{BroadcastBus, Delivery};
use crate::adapters::websocket::ConnectionRegistry;
use crate::config::EventsConfig;
use crate::domain::foundation::{DashboardId, DataCollectionId};
use crate::domain::realtime::{Event, EventKind, EventSource, ManualTriggerPayload};
use crate::ports::{ChangeFeed, ChangeListener, DashboardResolver};

use super::change_watcher::ChangeWatcher;

// ════════════════════════════════════════════════════════════════════════════════
// Supervised tasks
// ════════════════════════════════════════════════════════════════════════════════

/// A named background task with its own shutdown signal.
pub struct SupervisedTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SupervisedTask {
    /// Spawns `task`, handing it the shutdown receiver.
    pub fn spawn<F, Fut>(name: &'static str, task: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(task(shutdown_rx));
        tracing::debug!(task = name, "Background task started");
        Self {
            name,
            shutdown,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signals shutdown and waits for the task. A panic is logged, not
    /// propagated.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        match self.handle.await {
            Ok(()) => tracing::debug!(task = self.name, "Background task stopped"),
            Err(e) if e.is_panic() => {
                tracing::error!(task = self.name, error = %e, "Background task panicked")
            }
            Err(e) => tracing::warn!(task = self.name, error = %e, "Background task cancelled"),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Change fan-out
// ════════════════════════════════════════════════════════════════════════════════

/// Publishes each resolved change once per affected dashboard.
pub struct DashboardFanout {
    bus: Arc<BroadcastBus>,
}

impl DashboardFanout {
    pub fn new(bus: Arc<BroadcastBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl ChangeListener for DashboardFanout {
    async fn on_change(&self, event: Event, dashboard_ids: Vec<DashboardId>) {
        for dashboard_id in &dashboard_ids {
            self.bus
                .publish(dashboard_id, &event.scoped_to(dashboard_id))
                .await;
        }
    }

    fn name(&self) -> &'static str {
        "dashboard_fanout"
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Coordinator
// ════════════════════════════════════════════════════════════════════════════════

/// Where the watcher reads changes from.
#[derive(Clone)]
pub struct ChangeSource {
    pub feed: Arc<dyn ChangeFeed>,
    pub resolver: Arc<dyn DashboardResolver>,
}

/// Snapshot returned by [`EventCoordinator::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorStatus {
    pub enabled: bool,
    pub change_feed_enabled: bool,
    pub watcher_running: bool,
    pub bus_mode: &'static str,
    pub listener_running: bool,
    pub connection_count: usize,
    pub dashboard_count: usize,
    pub subscribed_dashboards: Vec<DashboardId>,
}

#[derive(Default)]
struct Tasks {
    listener: Option<SupervisedTask>,
    watcher: Option<SupervisedTask>,
    heartbeat: Option<SupervisedTask>,
}

impl Tasks {
    fn is_started(&self) -> bool {
        self.listener.is_some() || self.watcher.is_some() || self.heartbeat.is_some()
    }
}

pub struct EventCoordinator {
    config: EventsConfig,
    registry: Arc<ConnectionRegistry>,
    bus: Arc<BroadcastBus>,
    change_source: Option<ChangeSource>,
    tasks: Mutex<Tasks>,
}

impl EventCoordinator {
    pub fn new(
        config: EventsConfig,
        registry: Arc<ConnectionRegistry>,
        bus: Arc<BroadcastBus>,
    ) -> Self {
        Self {
            config,
            registry,
            bus,
            change_source: None,
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Attaches the change feed the watcher will tail.
    pub fn with_change_source(mut self, change_source: ChangeSource) -> Self {
        self.change_source = Some(change_source);
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<BroadcastBus> {
        &self.bus
    }

    // === Lifecycle ===

    /// Starts the background tasks. Does nothing when disabled or already started.
    pub async fn start(&self) {
        if !self.config.enabled {
            tracing::info!("Realtime events disabled, coordinator not started");
            return;
        }

        let mut tasks = self.tasks.lock().await;
        if tasks.is_started() {
            return;
        }

        if self.bus.is_distributed() {
            let bus = self.bus.clone();
            tasks.listener = Some(SupervisedTask::spawn("bus_listener", move |shutdown| {
                async move {
                    // Errors are logged by the listener itself
                    let _ = bus.listen(shutdown).await;
                }
            }));
        }

        match (&self.change_source, self.config.change_feed_enabled) {
            (Some(source), true) => {
                let watcher = ChangeWatcher::new(
                    source.feed.clone(),
                    source.resolver.clone(),
                    Arc::new(DashboardFanout::new(self.bus.clone())),
                )
                .with_retry_delay(self.config.watcher_retry_delay());
                tasks.watcher = Some(SupervisedTask::spawn("change_watcher", move |shutdown| {
                    async move { watcher.run(shutdown).await }
                }));
            }
            (None, true) => {
                tracing::warn!("Change feed enabled but no change source configured, watcher not started");
            }
            (_, false) => {
                tracing::info!("Change feed disabled, watcher not started");
            }
        }

        let registry = self.registry.clone();
        let interval = self.config.heartbeat_interval();
        tasks.heartbeat = Some(SupervisedTask::spawn("heartbeat", move |shutdown| {
            heartbeat_loop(registry, interval, shutdown)
        }));

        tracing::info!(bus_mode = self.bus.mode(), "Event coordinator started");
    }

    /// Stops heartbeat, watcher and listener, in that order. Idempotent.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_started() {
            return;
        }

        for task in [
            tasks.heartbeat.take(),
            tasks.watcher.take(),
            tasks.listener.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.stop().await;
        }

        tracing::info!("Event coordinator stopped");
    }

    // === Producers ===

    /// Publishes `event` for one dashboard through the bus.
    pub async fn notify_dashboard(&self, dashboard_id: &DashboardId, event: Event) -> Delivery {
        self.bus
            .publish(dashboard_id, &event.scoped_to(dashboard_id))
            .await
    }

    /// Injects a synthetic `data_collection_updated` event for every
    /// dashboard that has a local subscriber. Returns those dashboards.
    pub async fn trigger_subscribed_dashboards(
        &self,
        triggered_by: Option<String>,
        data_collection_id: Option<DataCollectionId>,
    ) -> Vec<DashboardId> {
        let dashboard_ids = self.registry.subscribed_dashboards().await;
        if dashboard_ids.is_empty() {
            return dashboard_ids;
        }

        let mut event = Event::new(EventKind::DataCollectionUpdated, EventSource::ExternalHook)
            .with_payload(ManualTriggerPayload::new(triggered_by, dashboard_ids.clone()));
        if let Some(data_collection_id) = data_collection_id {
            event = event.with_data_collection(data_collection_id);
        }

        for dashboard_id in &dashboard_ids {
            self.notify_dashboard(dashboard_id, event.clone()).await;
        }

        tracing::info!(dashboards = dashboard_ids.len(), "Manual trigger published");
        dashboard_ids
    }

    /// Runs one heartbeat pass over every known client.
    pub async fn heartbeat_tick(&self) -> usize {
        heartbeat_all(&self.registry).await
    }

    // === Introspection ===

    pub async fn status(&self) -> CoordinatorStatus {
        let (watcher_running, listener_running) = {
            let tasks = self.tasks.lock().await;
            (
                tasks.watcher.as_ref().is_some_and(SupervisedTask::is_running),
                tasks.listener.as_ref().is_some_and(SupervisedTask::is_running),
            )
        };
        let subscribed_dashboards = self.registry.subscribed_dashboards().await;

        CoordinatorStatus {
            enabled: self.config.enabled,
            change_feed_enabled: self.config.change_feed_enabled,
            watcher_running,
            bus_mode: self.bus.mode(),
            listener_running,
            connection_count: self.registry.connection_count().await,
            dashboard_count: subscribed_dashboards.len(),
            subscribed_dashboards,
        }
    }
}

async fn heartbeat_all(registry: &ConnectionRegistry) -> usize {
    let mut sent = 0;
    for client_id in registry.client_ids().await {
        if registry.heartbeat(&client_id).await {
            sent += 1;
        }
    }
    sent
}

async fn heartbeat_loop(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
            _ = ticker.tick() => {
                let sent = heartbeat_all(&registry).await;
                tracing::trace!(sent, "Heartbeat tick");
            }
        }
    }
}

//! ChangeWatcher - turns data collection changes into dashboard events.
//!
//! ## Flow
//!
//! 1. Open the change feed
//! 2. For each insert/update/replace, resolve the dashboards referencing
//!    the changed data collection
//! 3. Hand one event plus the dashboard list to the change listener
//!
//! ## Failure Handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Feed cannot be opened or read | Logged, feed reopened after `retry_delay` |
//! | Malformed change record | Logged, record skipped |
//! | Resolver error | Logged, record skipped |
//!
//! The loop retries indefinitely until shutdown is signalled.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;

use crate::domain::foundation::{DashboardId, DataCollectionId};
use crate::domain::realtime::{DataCollectionChangePayload, Event, EventKind, EventSource};
use crate::ports::{
    ChangeFeed, ChangeFeedError, ChangeListener, ChangeRecord, DashboardResolver, OperationType,
    ResolveError,
};

/// Default pause before reopening a failed feed.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct ChangeWatcher {
    feed: Arc<dyn ChangeFeed>,
    resolver: Arc<dyn DashboardResolver>,
    listener: Arc<dyn ChangeListener>,
    retry_delay: Duration,
}

impl ChangeWatcher {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        resolver: Arc<dyn DashboardResolver>,
        listener: Arc<dyn ChangeListener>,
    ) -> Self {
        Self {
            feed,
            resolver,
            listener,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Watches the feed until shutdown, reopening it after failures.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(listener = self.listener.name(), "Change watcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.watch_feed(&mut shutdown).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        retry_in = ?self.retry_delay,
                        "Change feed failed"
                    );
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.retry_delay) => {}
            }
        }

        tracing::info!("Change watcher stopped");
    }

    /// Consumes one feed until it fails or shutdown is signalled.
    ///
    /// Returns `Ok(())` only on shutdown.
    async fn watch_feed(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), ChangeFeedError> {
        let mut changes = self.feed.open().await?;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }

                next = changes.next() => match next {
                    Some(Ok(record)) => {
                        let data_collection_id = record.data_collection_id.clone();
                        if let Err(e) = self.handle_change(record).await {
                            tracing::error!(
                                data_collection_id = %data_collection_id,
                                error = %e,
                                "Dashboard resolution failed, change skipped"
                            );
                        }
                    }
                    Some(Err(ChangeFeedError::Decode(reason))) => {
                        tracing::warn!(reason = %reason, "Skipping malformed change record");
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(ChangeFeedError::Read("change feed ended".to_string()));
                    }
                },
            }
        }
    }

    /// Processes one change record.
    ///
    /// Returns the dashboards notified; empty when the operation is not
    /// watched or nothing references the data collection.
    pub async fn handle_change(&self, record: ChangeRecord) -> Result<Vec<DashboardId>, ResolveError> {
        if !record.operation.is_watched() {
            tracing::trace!(operation = %record.operation, "Ignoring unwatched operation");
            return Ok(Vec::new());
        }

        let dashboard_ids = self
            .resolve_affected_dashboards(&record.data_collection_id)
            .await?;

        if dashboard_ids.is_empty() {
            tracing::debug!(
                data_collection_id = %record.data_collection_id,
                "No dashboards reference changed data collection"
            );
            return Ok(dashboard_ids);
        }

        let event = change_event(&record, &dashboard_ids);
        tracing::info!(
            data_collection_id = %record.data_collection_id,
            operation = %record.operation,
            dashboards = dashboard_ids.len(),
            "Data collection change resolved"
        );

        self.listener.on_change(event, dashboard_ids.clone()).await;
        Ok(dashboard_ids)
    }

    /// Dashboards whose stored metadata references `data_collection_id`.
    pub async fn resolve_affected_dashboards(
        &self,
        data_collection_id: &DataCollectionId,
    ) -> Result<Vec<DashboardId>, ResolveError> {
        self.resolver
            .resolve_affected_dashboards(data_collection_id)
            .await
    }
}

/// Builds the unscoped event for a resolved change.
fn change_event(record: &ChangeRecord, dashboard_ids: &[DashboardId]) -> Event {
    let kind = match record.operation {
        OperationType::Insert => EventKind::DataCollectionCreated,
        _ => EventKind::DataCollectionUpdated,
    };

    let mut event = Event::new(kind, EventSource::ChangeFeed)
        .with_data_collection(record.data_collection_id.clone())
        .with_payload(DataCollectionChangePayload {
            operation_type: record.operation.as_str().to_string(),
            data_collection_tag: record.data_collection_tag.clone(),
            dashboard_ids: dashboard_ids.to_vec(),
        });

    if let Some(project_id) = &record.project_id {
        event = event.with_project(project_id.clone());
    }
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryChangeFeed, InMemoryDashboardResolver};
    use crate::domain::foundation::ProjectId;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Captures every change handed to the listener
    #[derive(Default)]
    struct CapturingListener {
        changes: Mutex<Vec<(Event, Vec<DashboardId>)>>,
    }

    impl CapturingListener {
        fn changes(&self) -> Vec<(Event, Vec<DashboardId>)> {
            self.changes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChangeListener for CapturingListener {
        async fn on_change(&self, event: Event, dashboard_ids: Vec<DashboardId>) {
            self.changes.lock().unwrap().push((event, dashboard_ids));
        }

        fn name(&self) -> &'static str {
            "capturing"
        }
    }

    fn dashboard(id: &str) -> DashboardId {
        DashboardId::new(id).unwrap()
    }

    fn record(operation: OperationType, id: &str) -> ChangeRecord {
        ChangeRecord {
            operation,
            data_collection_id: DataCollectionId::new(id).unwrap(),
            data_collection_tag: Some("penguins".to_string()),
            project_id: Some(ProjectId::new("p1").unwrap()),
        }
    }

    async fn setup() -> (
        ChangeWatcher,
        Arc<InMemoryChangeFeed>,
        Arc<InMemoryDashboardResolver>,
        Arc<CapturingListener>,
    ) {
        let feed = Arc::new(InMemoryChangeFeed::new());
        let resolver = Arc::new(InMemoryDashboardResolver::new());
        resolver
            .insert_dashboard(dashboard("d1"), vec![json!({"dc_id": "dc-7"})])
            .await;
        resolver
            .insert_dashboard(dashboard("d2"), vec![json!({"dc_id": {"$oid": "dc-7"}})])
            .await;
        let listener = Arc::new(CapturingListener::default());
        let watcher = ChangeWatcher::new(feed.clone(), resolver.clone(), listener.clone())
            .with_retry_delay(Duration::from_millis(20));
        (watcher, feed, resolver, listener)
    }

    #[tokio::test]
    async fn insert_becomes_created_event() {
        let (watcher, _, _, listener) = setup().await;

        let notified = watcher
            .handle_change(record(OperationType::Insert, "dc-7"))
            .await
            .unwrap();

        assert_eq!(notified, vec![dashboard("d1"), dashboard("d2")]);
        let changes = listener.changes();
        assert_eq!(changes.len(), 1);
        let (event, ids) = &changes[0];
        assert_eq!(event.kind(), EventKind::DataCollectionCreated);
        assert_eq!(event.source(), EventSource::ChangeFeed);
        assert_eq!(event.dashboard_id(), None);
        assert_eq!(event.scope().data_collection_id.as_ref().unwrap().as_str(), "dc-7");
        assert_eq!(event.scope().project_id.as_ref().unwrap().as_str(), "p1");
        assert_eq!(event.payload()["operation_type"], "insert");
        assert_eq!(event.payload()["data_collection_tag"], "penguins");
        assert_eq!(event.payload()["dashboard_ids"], json!(["d1", "d2"]));
        assert_eq!(ids.len(), 2);
    }

    #[tokio::test]
    async fn update_and_replace_become_updated_events() {
        let (watcher, _, _, listener) = setup().await;

        watcher.handle_change(record(OperationType::Update, "dc-7")).await.unwrap();
        watcher.handle_change(record(OperationType::Replace, "dc-7")).await.unwrap();

        let kinds: Vec<_> = listener.changes().iter().map(|(e, _)| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![EventKind::DataCollectionUpdated, EventKind::DataCollectionUpdated]
        );
    }

    #[tokio::test]
    async fn unreferenced_change_is_dropped() {
        let (watcher, _, _, listener) = setup().await;

        let notified = watcher
            .handle_change(record(OperationType::Insert, "dc-42"))
            .await
            .unwrap();

        assert!(notified.is_empty());
        assert!(listener.changes().is_empty());
    }

    #[tokio::test]
    async fn delete_is_ignored() {
        let (watcher, _, _, listener) = setup().await;

        let notified = watcher
            .handle_change(record(OperationType::Delete, "dc-7"))
            .await
            .unwrap();

        assert!(notified.is_empty());
        assert!(listener.changes().is_empty());
    }

    #[tokio::test]
    async fn resolver_error_surfaces_from_handle_change() {
        let (watcher, _, resolver, listener) = setup().await;
        resolver
            .set_error(Some(ResolveError::Database("down".to_string())))
            .await;

        assert!(watcher
            .handle_change(record(OperationType::Update, "dc-7"))
            .await
            .is_err());
        assert!(listener.changes().is_empty());
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn run_processes_feed_and_stops_on_shutdown() {
        let (watcher, feed, _, listener) = setup().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move { watcher.run(shutdown_rx).await });
        wait_for(|| feed.open_streams() > 0).await;

        feed.push(record(OperationType::Update, "dc-7"));
        wait_for(|| listener.changes().len() == 1).await;

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(feed.open_streams(), 0);
    }

    #[tokio::test]
    async fn run_reopens_feed_after_failure() {
        let (watcher, feed, _, listener) = setup().await;
        feed.fail_next_opens(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move { watcher.run(shutdown_rx).await });
        wait_for(|| feed.open_streams() > 0).await;
        assert_eq!(feed.open_count(), 2);

        // A read failure closes the stream and forces another reopen
        feed.fail_read(ChangeFeedError::Read("connection reset".to_string()));
        wait_for(|| feed.open_count() == 3 && feed.open_streams() > 0).await;

        feed.push(record(OperationType::Insert, "dc-7"));
        wait_for(|| listener.changes().len() == 1).await;

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_records_do_not_restart_feed() {
        let (watcher, feed, _, listener) = setup().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move { watcher.run(shutdown_rx).await });
        wait_for(|| feed.open_streams() > 0).await;

        feed.fail_read(ChangeFeedError::Decode("bad payload".to_string()));
        feed.push(record(OperationType::Update, "dc-7"));
        wait_for(|| listener.changes().len() == 1).await;
        assert_eq!(feed.open_count(), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}

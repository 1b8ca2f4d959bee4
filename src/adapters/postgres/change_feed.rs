//! PostgreSQL change feed over LISTEN/NOTIFY.
//!
//! A trigger on `data_collections` (see `migrations/`) emits one
//! notification per row change with a JSON payload:
//!
//! ```json
//! {
//!   "operation_type": "update",
//!   "document_key": "646b0f3c1e4a2d7f5c8e9a01",
//!   "data_collection_tag": "penguins",
//!   "project_id": "p1"
//! }
//! ```
//!
//! Deletes are notified too; they are dropped here before reaching the
//! watcher.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use sqlx::postgres::PgListener;
use sqlx::PgPool;

use crate::domain::foundation::{DataCollectionId, ProjectId};
use crate::ports::{ChangeFeed, ChangeFeedError, ChangeRecord, ChangeStream, OperationType};

/// Channel the `data_collections` trigger notifies on.
pub const NOTIFY_CHANNEL: &str = "data_collections_changes";

/// Notification payload written by the trigger.
#[derive(Debug, Deserialize)]
struct ChangeNotification {
    operation_type: String,
    document_key: String,
    #[serde(default)]
    data_collection_tag: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
}

/// Decodes one notification payload.
///
/// Returns `Ok(None)` for operations the watcher does not react to.
pub(crate) fn decode_notification(payload: &str) -> Result<Option<ChangeRecord>, ChangeFeedError> {
    let notification: ChangeNotification =
        serde_json::from_str(payload).map_err(|e| ChangeFeedError::Decode(e.to_string()))?;

    let operation = OperationType::parse(&notification.operation_type).ok_or_else(|| {
        ChangeFeedError::Decode(format!(
            "unknown operation_type '{}'",
            notification.operation_type
        ))
    })?;
    if !operation.is_watched() {
        return Ok(None);
    }

    let data_collection_id = DataCollectionId::new(notification.document_key)
        .map_err(|e| ChangeFeedError::Decode(e.to_string()))?;

    Ok(Some(ChangeRecord {
        operation,
        data_collection_id,
        data_collection_tag: notification.data_collection_tag.filter(|t| !t.is_empty()),
        project_id: notification.project_id.and_then(|p| ProjectId::new(p).ok()),
    }))
}

/// PostgreSQL implementation of ChangeFeed.
#[derive(Clone)]
pub struct PostgresChangeFeed {
    pool: PgPool,
}

impl PostgresChangeFeed {
    /// Creates a feed listening on [`NOTIFY_CHANNEL`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeFeed for PostgresChangeFeed {
    async fn open(&self) -> Result<ChangeStream, ChangeFeedError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| ChangeFeedError::Unavailable(e.to_string()))?;

        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .map_err(|e| ChangeFeedError::Unavailable(e.to_string()))?;

        tracing::info!(channel = NOTIFY_CHANNEL, "Listening for data collection changes");

        let stream = listener.into_stream().filter_map(|item| async move {
            match item {
                Ok(notification) => decode_notification(notification.payload()).transpose(),
                Err(e) => Some(Err(ChangeFeedError::Read(e.to_string()))),
            }
        });

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_trigger_notifies_on_listened_channel() {
        let migration = include_str!("../../../migrations/0001_realtime_change_feed.sql");
        let notify = migration.find("pg_notify(").unwrap();
        let channel = migration[notify..].find(&format!("'{}'", NOTIFY_CHANNEL)).unwrap();
        // The channel is the first argument
        assert!(!migration[notify..notify + channel].contains(','));
    }

    #[test]
    fn decodes_update_notification() {
        let record = decode_notification(
            r#"{"operation_type":"update","document_key":"dc-42","data_collection_tag":"penguins","project_id":"p1"}"#,
        )
        .unwrap()
        .unwrap();

        assert_eq!(record.operation, OperationType::Update);
        assert_eq!(record.data_collection_id.as_str(), "dc-42");
        assert_eq!(record.data_collection_tag.as_deref(), Some("penguins"));
        assert_eq!(record.project_id.unwrap().as_str(), "p1");
    }

    #[test]
    fn operation_type_is_case_insensitive() {
        let record = decode_notification(r#"{"operation_type":"INSERT","document_key":"dc-1"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(record.operation, OperationType::Insert);
        assert_eq!(record.data_collection_tag, None);
        assert_eq!(record.project_id, None);
    }

    #[test]
    fn delete_notifications_are_dropped() {
        let record =
            decode_notification(r#"{"operation_type":"delete","document_key":"dc-1"}"#).unwrap();
        assert_eq!(record, None);
    }

    #[test]
    fn malformed_notifications_fail_to_decode() {
        assert!(matches!(
            decode_notification("not json"),
            Err(ChangeFeedError::Decode(_))
        ));
        assert!(matches!(
            decode_notification(r#"{"operation_type":"truncate","document_key":"dc-1"}"#),
            Err(ChangeFeedError::Decode(_))
        ));
        assert!(matches!(
            decode_notification(r#"{"operation_type":"update","document_key":""}"#),
            Err(ChangeFeedError::Decode(_))
        ));
    }

    #[test]
    fn empty_tag_and_blank_project_are_absent() {
        let record = decode_notification(
            r#"{"operation_type":"replace","document_key":"dc-1","data_collection_tag":"","project_id":" "}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.data_collection_tag, None);
        assert_eq!(record.project_id, None);
    }
}

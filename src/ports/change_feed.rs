//! ChangeFeed port - a live feed of changes to the watched data collections.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

use crate::domain::foundation::{DataCollectionId, ProjectId};

/// Upstream write operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Insert,
    Update,
    Replace,
    Delete,
}

impl OperationType {
    /// Operations the watcher reacts to.
    pub const WATCHED: [OperationType; 3] = [
        OperationType::Insert,
        OperationType::Update,
        OperationType::Replace,
    ];

    /// Parses an operation name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Some(OperationType::Insert),
            "update" => Some(OperationType::Update),
            "replace" => Some(OperationType::Replace),
            "delete" => Some(OperationType::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Insert => "insert",
            OperationType::Update => "update",
            OperationType::Replace => "replace",
            OperationType::Delete => "delete",
        }
    }

    /// Returns true for insert, update and replace.
    pub fn is_watched(&self) -> bool {
        Self::WATCHED.contains(self)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change observed on the watched collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub operation: OperationType,

    /// Id of the changed data collection.
    pub data_collection_id: DataCollectionId,

    /// Identifying tag read from the changed document, if present.
    pub data_collection_tag: Option<String>,

    /// Owning project read from the changed document, if present.
    pub project_id: Option<ProjectId>,
}

/// Errors produced while opening or reading the feed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChangeFeedError {
    /// The feed could not be opened (store down, no replication, ...)
    #[error("Change feed unavailable: {0}")]
    Unavailable(String),

    /// Reading the next change failed
    #[error("Change feed read failed: {0}")]
    Read(String),

    /// A change notification could not be decoded
    #[error("Malformed change record: {0}")]
    Decode(String),
}

/// Live stream of change records. The stream ending means the feed was lost.
pub type ChangeStream = BoxStream<'static, Result<ChangeRecord, ChangeFeedError>>;

/// Port for opening a change feed on the data collections store.
///
/// Implementations should only yield the [`OperationType::WATCHED`]
/// operations; the watcher filters again regardless.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a new live feed. Each call starts a fresh subscription.
    async fn open(&self) -> Result<ChangeStream, ChangeFeedError>;
}

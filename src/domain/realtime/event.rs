//! The normalized notification unit relayed from producers to subscribers.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "event_type": "data_collection_updated",
//!   "source_type": "change_feed",
//!   "timestamp": "2025-01-10T08:30:00.000Z",
//!   "project_id": "p1",
//!   "dashboard_id": "d1",
//!   "data_collection_id": "dc-42",
//!   "payload": { "operation_type": "update", "dashboard_ids": ["d1"] },
//!   "message_id": "optional"
//! }
//! ```
//!
//! Scope fields are flattened to the top level and omitted when absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::foundation::{DashboardId, DataCollectionId, ProjectId, Timestamp};

use super::payload::{HeartbeatPayload, IntoPayload};

/// Open key/value bag carried by every event.
pub type Payload = Map<String, JsonValue>;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    DataCollectionCreated,
    DataCollectionUpdated,
    DataCollectionDeleted,
    ConnectionEstablished,
    Heartbeat,
    Error,
}

/// Which producer emitted the event.
///
/// Only `ChangeFeed` and `Server` are produced today; the others are
/// reserved so clients can already switch on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    ChangeFeed,
    FileWatch,
    TaskCompletion,
    ExternalHook,
    /// Emitted by this server itself (heartbeats, handshake, errors).
    Server,
}

/// Optional identifiers locating the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventScope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_id: Option<DashboardId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_collection_id: Option<DataCollectionId>,
}

/// A single notification.
///
/// Events are built once and then only read. Fan-out to several dashboards
/// goes through [`Event::scoped_to`], which returns a copy and leaves the
/// original untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "event_type")]
    kind: EventKind,

    #[serde(rename = "source_type")]
    source: EventSource,

    #[serde(rename = "timestamp")]
    occurred_at: Timestamp,

    #[serde(flatten)]
    scope: EventScope,

    #[serde(default)]
    payload: Payload,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
}

impl Event {
    /// Creates an event stamped with the current time and an empty scope.
    pub fn new(kind: EventKind, source: EventSource) -> Self {
        Self {
            kind,
            source,
            occurred_at: Timestamp::now(),
            scope: EventScope::default(),
            payload: Payload::new(),
            message_id: None,
        }
    }

    /// A keep-alive event carrying the current server time.
    pub fn heartbeat() -> Self {
        let now = Timestamp::now();
        Self::new(EventKind::Heartbeat, EventSource::Server)
            .at(now)
            .with_payload(HeartbeatPayload { server_time: now })
    }

    // === Construction ===

    /// Overrides the producer-assigned time.
    pub fn at(mut self, occurred_at: Timestamp) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    pub fn with_project(mut self, project_id: ProjectId) -> Self {
        self.scope.project_id = Some(project_id);
        self
    }

    pub fn with_dashboard(mut self, dashboard_id: DashboardId) -> Self {
        self.scope.dashboard_id = Some(dashboard_id);
        self
    }

    pub fn with_data_collection(mut self, data_collection_id: DataCollectionId) -> Self {
        self.scope.data_collection_id = Some(data_collection_id);
        self
    }

    /// Replaces the payload with one of the recognized payload shapes.
    pub fn with_payload(mut self, payload: impl IntoPayload) -> Self {
        self.payload = payload.into_payload();
        self
    }

    /// Replaces the payload with an arbitrary map.
    pub fn with_raw_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Returns a copy of this event addressed to `dashboard_id`.
    ///
    /// Only `scope.dashboard_id` differs from the original.
    pub fn scoped_to(&self, dashboard_id: &DashboardId) -> Event {
        let mut scoped = self.clone();
        scoped.scope.dashboard_id = Some(dashboard_id.clone());
        scoped
    }

    // === Accessors ===

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn source(&self) -> EventSource {
        self.source
    }

    pub fn occurred_at(&self) -> Timestamp {
        self.occurred_at
    }

    pub fn scope(&self) -> &EventScope {
        &self.scope
    }

    pub fn dashboard_id(&self) -> Option<&DashboardId> {
        self.scope.dashboard_id.as_ref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }
}

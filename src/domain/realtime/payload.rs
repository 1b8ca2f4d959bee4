//! Recognized payload shapes.
//!
//! The payload on the wire is an open JSON object, but producers and
//! consumers agree on one shape per event kind:
//!
//! | Kind | Shape |
//! |------|-------|
//! | `data_collection_*` (change feed) | [`DataCollectionChangePayload`] |
//! | `data_collection_updated` (manual trigger) | [`ManualTriggerPayload`] |
//! | `heartbeat` | [`HeartbeatPayload`] |
//! | `error` | [`ErrorPayload`] |
//!
//! New fields may be added to a shape without a migration; consumers must
//! ignore keys they do not know.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::foundation::{DashboardId, Timestamp};

use super::event::Payload;

/// Conversion into the open payload map.
pub trait IntoPayload {
    fn into_payload(self) -> Payload;
}

impl IntoPayload for Payload {
    fn into_payload(self) -> Payload {
        self
    }
}

/// Serializes a shape into a map; non-object values land under `"value"`.
fn to_map<T: Serialize>(shape: &T) -> Payload {
    match serde_json::to_value(shape) {
        Ok(JsonValue::Object(map)) => map,
        Ok(other) => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
        Err(_) => Payload::new(),
    }
}

macro_rules! impl_into_payload {
    ($($shape:ty),* $(,)?) => {
        $(
            impl IntoPayload for $shape {
                fn into_payload(self) -> Payload {
                    to_map(&self)
                }
            }
        )*
    };
}

/// A watched data collection was inserted, updated or replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCollectionChangePayload {
    /// Upstream operation name (`insert`, `update`, `replace`).
    pub operation_type: String,

    /// Human-readable tag of the data collection, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_collection_tag: Option<String>,

    /// Every dashboard the change was resolved to.
    pub dashboard_ids: Vec<DashboardId>,
}

/// Synthetic update injected through the operational trigger endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualTriggerPayload {
    /// Always `"manual_trigger"`.
    pub operation_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,

    pub dashboard_ids: Vec<DashboardId>,
}

impl ManualTriggerPayload {
    pub const OPERATION: &'static str = "manual_trigger";

    pub fn new(triggered_by: Option<String>, dashboard_ids: Vec<DashboardId>) -> Self {
        Self {
            operation_type: Self::OPERATION.to_string(),
            triggered_by,
            dashboard_ids,
        }
    }
}

/// Keep-alive carrying the server clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatPayload {
    pub server_time: Timestamp,
}

/// Error report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl_into_payload!(
    DataCollectionChangePayload,
    ManualTriggerPayload,
    HeartbeatPayload,
    ErrorPayload,
);

//! HTTP DTOs for operational endpoints.

use serde::{Deserialize, Serialize};

use crate::adapters::bus::Delivery;
use crate::domain::foundation::DashboardId;
use crate::domain::realtime::Payload;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /trigger`. Every field is optional, as is the body itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub data_collection_id: Option<String>,
    #[serde(default)]
    pub triggered_by: Option<String>,
}

/// Body of `POST /dashboards/:dashboard_id/notify`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyRequest {
    #[serde(default)]
    pub payload: Option<Payload>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    pub triggered: bool,
    pub dashboard_count: usize,
    pub dashboard_ids: Vec<DashboardId>,
}

impl TriggerResponse {
    pub fn new(dashboard_ids: Vec<DashboardId>) -> Self {
        Self {
            triggered: true,
            dashboard_count: dashboard_ids.len(),
            dashboard_ids,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyResponse {
    pub accepted: bool,
    pub dashboard_id: DashboardId,
    /// `"published"` or `"local"`.
    pub delivery: &'static str,
}

impl NotifyResponse {
    pub fn new(dashboard_id: DashboardId, delivery: Delivery) -> Self {
        let delivery = match delivery {
            Delivery::Published => "published",
            Delivery::Local { .. } => "local",
        };
        Self {
            accepted: true,
            dashboard_id,
            delivery,
        }
    }
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            code: "BAD_REQUEST".to_string(),
            message: message.into(),
        }
    }
}

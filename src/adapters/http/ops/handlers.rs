//! HTTP handlers for operational endpoints.

use std::sync::Arc;

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::{CoordinatorStatus, EventCoordinator};
use crate::domain::foundation::{DashboardId, DataCollectionId};
use crate::domain::realtime::{Event, EventKind, EventSource};

use super::dto::{ErrorResponse, NotifyRequest, NotifyResponse, TriggerRequest, TriggerResponse};

// ════════════════════════════════════════════════════════════════════════════════
// Error Type
// ════════════════════════════════════════════════════════════════════════════════

pub enum OpsApiError {
    BadRequest(String),
}

impl IntoResponse for OpsApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            OpsApiError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::bad_request(msg))
            }
        };
        (status, Json(error)).into_response()
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct OpsAppState {
    pub coordinator: Arc<EventCoordinator>,
}

impl OpsAppState {
    pub fn new(coordinator: Arc<EventCoordinator>) -> Self {
        Self { coordinator }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/v1/events/status
pub async fn get_status(State(state): State<OpsAppState>) -> Json<CoordinatorStatus> {
    Json(state.coordinator.status().await)
}

/// POST /api/v1/events/trigger
pub async fn trigger_dashboards(
    State(state): State<OpsAppState>,
    body: Option<Json<TriggerRequest>>,
) -> Result<Json<TriggerResponse>, OpsApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let data_collection_id = request
        .data_collection_id
        .map(DataCollectionId::new)
        .transpose()
        .map_err(|e| OpsApiError::BadRequest(e.to_string()))?;

    let dashboard_ids = state
        .coordinator
        .trigger_subscribed_dashboards(request.triggered_by, data_collection_id)
        .await;

    Ok(Json(TriggerResponse::new(dashboard_ids)))
}

/// POST /api/v1/events/dashboards/:dashboard_id/notify
pub async fn notify_dashboard(
    State(state): State<OpsAppState>,
    Path(dashboard_id): Path<String>,
    body: Option<Json<NotifyRequest>>,
) -> Result<(StatusCode, Json<NotifyResponse>), OpsApiError> {
    let dashboard_id =
        DashboardId::new(dashboard_id).map_err(|e| OpsApiError::BadRequest(e.to_string()))?;
    let request = body.map(|Json(request)| request).unwrap_or_default();

    let event = Event::new(EventKind::DataCollectionUpdated, EventSource::ExternalHook)
        .with_raw_payload(request.payload.unwrap_or_default());
    let delivery = state.coordinator.notify_dashboard(&dashboard_id, event).await;

    tracing::info!(dashboard_id = %dashboard_id, ?delivery, "Dashboard notified");
    Ok((StatusCode::ACCEPTED, Json(NotifyResponse::new(dashboard_id, delivery))))
}

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

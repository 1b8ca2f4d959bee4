//! HTTP routes for operational endpoints.

use axum::routing::{get, post};
use axum::Router;

use super::handlers::{get_status, notify_dashboard, trigger_dashboards, OpsAppState};

/// Routes mounted under `/api/v1/events`.
pub fn ops_router() -> Router<OpsAppState> {
    Router::new()
        .route("/status", get(get_status))
        .route("/trigger", post(trigger_dashboards))
        .route("/dashboards/:dashboard_id/notify", post(notify_dashboard))
}

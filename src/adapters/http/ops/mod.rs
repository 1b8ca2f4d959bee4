//! Operational HTTP endpoints for the realtime subsystem.

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, NotifyRequest, NotifyResponse, TriggerRequest, TriggerResponse};
pub use handlers::{get_status, health, notify_dashboard, trigger_dashboards, OpsApiError, OpsAppState};
pub use routes::ops_router;

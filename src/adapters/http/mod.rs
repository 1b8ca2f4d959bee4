//! HTTP adapters - router assembly for the realtime server.
//!
//! ```text
//! /health                                  GET   liveness
//! /api/v1/events/ws                        GET   WebSocket upgrade
//! /api/v1/events/status                    GET   coordinator status
//! /api/v1/events/trigger                   POST  manual trigger
//! /api/v1/events/dashboards/:id/notify     POST  direct injection
//! ```

pub mod ops;

use axum::routing::get;
use axum::Router;
use http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::adapters::websocket::{websocket_router, WebSocketState};

pub use ops::{ops_router, OpsAppState};

/// Prefix under which the WebSocket and operational routes are mounted.
pub const API_PREFIX: &str = "/api/v1/events";

/// Builds the full application router.
pub fn app_router(ws_state: WebSocketState, ops_state: OpsAppState, cors_origins: &[String]) -> Router {
    let api = Router::new()
        .merge(websocket_router().with_state(ws_state))
        .merge(ops_router().with_state(ops_state));

    Router::new()
        .route("/health", get(ops::health))
        .nest(API_PREFIX, api)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
}

/// Any origin when none are configured; otherwise exactly the listed ones.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(allowed)
    }
}

//! WebSocket upgrade handler for real-time dashboard connections.
//!
//! Handles the HTTP → WebSocket upgrade and manages the connection lifecycle:
//! 1. Upgrade to WebSocket
//! 2. Authenticate the token (close with 1008 on failure)
//! 3. Register with the connection registry, optionally subscribed
//! 4. Process subscribe/unsubscribe/ping until disconnect
//! 5. Remove the connection from the registry

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{close_code, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};
use futures::StreamExt;
use serde::Deserialize;

use crate::domain::foundation::{AuthError, AuthenticatedUser, ClientId, DashboardId};
use crate::domain::realtime::{ClientMessage, ControlMessage, ServerMessage};
use crate::ports::{ClientSink, SessionValidator};

use super::{ConnectionRegistry, WebSocketSink};

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub registry: Arc<ConnectionRegistry>,
    pub validator: Arc<dyn SessionValidator>,

    /// Reject connections without a valid token.
    pub require_auth: bool,

    /// Upper bound on one wait for an inbound frame.
    pub read_timeout: Duration,

    /// Outbound queue size per connection.
    pub queue_capacity: usize,
}

impl WebSocketState {
    pub fn new(registry: Arc<ConnectionRegistry>, validator: Arc<dyn SessionValidator>) -> Self {
        Self {
            registry,
            validator,
            require_auth: true,
            read_timeout: Duration::from_secs(1),
            queue_capacity: 64,
        }
    }

    pub fn with_require_auth(mut self, require_auth: bool) -> Self {
        self.require_auth = require_auth;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Resolves the caller identity.
    ///
    /// Without `require_auth` a missing or bad token degrades to an
    /// anonymous connection.
    async fn authenticate(
        &self,
        token: Option<&str>,
    ) -> Result<Option<AuthenticatedUser>, AuthError> {
        match token {
            Some(token) => match self.validator.validate(token).await {
                Ok(user) => Ok(Some(user)),
                Err(e) if self.require_auth => Err(e),
                Err(e) => {
                    tracing::debug!(error = %e, "Ignoring invalid token, auth not required");
                    Ok(None)
                }
            },
            None if self.require_auth => Err(AuthError::MissingToken),
            None => Ok(None),
        }
    }
}

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
    pub dashboard_id: Option<String>,
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /api/v1/events/ws?token=<jwt>&dashboard_id=<id>`
///
/// The token may also come from an `Authorization: Bearer` header. A blank
/// or missing `dashboard_id` connects without a subscription.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    headers: HeaderMap,
    State(state): State<WebSocketState>,
) -> Response {
    let token = params.token.or_else(|| bearer_token(&headers));
    let dashboard_id = params
        .dashboard_id
        .and_then(|id| DashboardId::new(id).ok());

    ws.on_upgrade(move |socket| handle_socket(socket, token, dashboard_id, state))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Handle an established WebSocket connection.
async fn handle_socket(
    socket: WebSocket,
    token: Option<String>,
    dashboard_id: Option<DashboardId>,
    state: WebSocketState,
) {
    let (sender, mut receiver) = socket.split();
    let (sink, writer) = WebSocketSink::spawn(sender, state.queue_capacity);

    let user = match state.authenticate(token.as_deref()).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting WebSocket connection");
            sink.close(close_code::POLICY, "authentication required").await;
            drop(sink);
            let _ = writer.await;
            return;
        }
    };

    let accepted = match state
        .registry
        .accept(
            Arc::new(sink.clone()),
            dashboard_id,
            user.map(|user| user.id),
        )
        .await
    {
        Ok(accepted) => accepted,
        Err(e) => {
            tracing::debug!(error = %e, "Client went away during handshake");
            return;
        }
    };

    let client_id = accepted.client_id;
    let closed = accepted.closed;

    loop {
        if *closed.borrow() {
            tracing::debug!(client_id = %client_id, "Connection closed by registry");
            break;
        }

        let frame = match tokio::time::timeout(state.read_timeout, receiver.next()).await {
            // Nothing arrived; loop to re-check cancellation
            Err(_) => continue,
            Ok(frame) => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                handle_text_message(&state, client_id, &sink, &text).await;
            }
            Some(Ok(Message::Close(_))) => {
                tracing::debug!(client_id = %client_id, "Client sent close frame");
                break;
            }
            Some(Ok(_)) => {
                // Binary and protocol-level ping/pong frames are ignored
            }
            Some(Err(e)) => {
                tracing::debug!(client_id = %client_id, error = %e, "Receive error");
                break;
            }
            None => break,
        }
    }

    state.registry.disconnect(&client_id).await;
    drop(sink);
    let _ = writer.await;
}

/// Applies one client control message. Malformed input is ignored.
async fn handle_text_message(
    state: &WebSocketState,
    client_id: ClientId,
    sink: &WebSocketSink,
    text: &str,
) {
    let Some(message) = ClientMessage::parse(text) else {
        tracing::trace!(client_id = %client_id, "Ignoring malformed client message");
        return;
    };

    let reply = match message {
        ClientMessage::Subscribe { dashboard_id } => {
            match state.registry.subscribe(&client_id, dashboard_id.clone()).await {
                Ok(()) => ControlMessage::Subscribed { dashboard_id },
                Err(e) => {
                    tracing::debug!(client_id = %client_id, error = %e, "Subscribe failed");
                    return;
                }
            }
        }
        ClientMessage::Unsubscribe { dashboard_id } => {
            match state.registry.unsubscribe(&client_id, &dashboard_id).await {
                Ok(()) => ControlMessage::Unsubscribed { dashboard_id },
                Err(e) => {
                    tracing::debug!(client_id = %client_id, error = %e, "Unsubscribe failed");
                    return;
                }
            }
        }
        ClientMessage::Ping => ControlMessage::Pong,
    };

    if let Err(e) = sink.send(&ServerMessage::from(reply)).await {
        tracing::debug!(client_id = %client_id, error = %e, "Failed to send reply");
    }
}

/// Create axum router for the WebSocket endpoint.
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .nest("/api/v1/events", websocket_router().with_state(ws_state));
/// ```
pub fn websocket_router() -> Router<WebSocketState> {
    Router::new().route("/ws", get(ws_handler))
}

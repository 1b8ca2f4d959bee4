//! Client-facing message protocol.
//!
//! Defines what travels over a client connection:
//! - Server → Client: handshake, subscription acks, events, pongs
//! - Client → Server: subscribe, unsubscribe, ping

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ClientId, DashboardId};

use super::Event;

// ============================================
// Server → Client Messages
// ============================================

/// Everything the server may send to a client.
///
/// Control messages carry a `type` tag; events are sent as bare
/// [`Event`] objects (keyed by `event_type` instead).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Control(ControlMessage),
    Event(Event),
}

/// Tagged control messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Sent once, right after accept.
    ConnectionEstablished {
        client_id: ClientId,
        subscriptions: Vec<DashboardId>,
    },

    /// Acknowledges a subscribe request.
    Subscribed { dashboard_id: DashboardId },

    /// Acknowledges an unsubscribe request.
    Unsubscribed { dashboard_id: DashboardId },

    /// Reply to a client ping.
    Pong,
}

impl From<ControlMessage> for ServerMessage {
    fn from(msg: ControlMessage) -> Self {
        ServerMessage::Control(msg)
    }
}

impl From<Event> for ServerMessage {
    fn from(event: Event) -> Self {
        ServerMessage::Event(event)
    }
}

// ============================================
// Client → Server Messages
// ============================================

/// Control messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe { dashboard_id: DashboardId },
    Unsubscribe { dashboard_id: DashboardId },
    Ping,
}

impl ClientMessage {
    /// Parses a text frame. Malformed or unknown messages yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::realtime::EventKind;

    #[test]
    fn connection_established_serializes_with_type_tag() {
        let client_id = ClientId::new();
        let msg = ServerMessage::from(ControlMessage::ConnectionEstablished {
            client_id,
            subscriptions: vec![DashboardId::new("d1").unwrap()],
        });

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "connection_established");
        assert_eq!(json["client_id"], client_id.to_string());
        assert_eq!(json["subscriptions"], serde_json::json!(["d1"]));
    }

    #[test]
    fn acks_and_pong_serialize_correctly() {
        let ack = ServerMessage::from(ControlMessage::Subscribed {
            dashboard_id: DashboardId::new("d1").unwrap(),
        });
        assert_eq!(
            serde_json::to_string(&ack).unwrap(),
            r#"{"type":"subscribed","dashboard_id":"d1"}"#
        );

        let pong = ServerMessage::from(ControlMessage::Pong);
        assert_eq!(serde_json::to_string(&pong).unwrap(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn events_serialize_without_type_tag() {
        let json = serde_json::to_value(ServerMessage::from(Event::heartbeat())).unwrap();
        assert!(json.get("type").is_none());
        assert_eq!(json["event_type"], "heartbeat");
    }

    #[test]
    fn server_message_deserializes_both_variants() {
        let control: ServerMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert_eq!(control, ServerMessage::Control(ControlMessage::Pong));

        let text = serde_json::to_string(&ServerMessage::from(Event::heartbeat())).unwrap();
        match serde_json::from_str::<ServerMessage>(&text).unwrap() {
            ServerMessage::Event(event) => assert_eq!(event.kind(), EventKind::Heartbeat),
            other => panic!("expected event, got {:?}", other),
        }
    }

    #[test]
    fn client_message_parses_subscribe_and_ping() {
        assert_eq!(
            ClientMessage::parse(r#"{"type": "subscribe", "dashboard_id": "d1"}"#),
            Some(ClientMessage::Subscribe {
                dashboard_id: DashboardId::new("d1").unwrap()
            })
        );
        assert_eq!(
            ClientMessage::parse(r#"{"type": "unsubscribe", "dashboard_id": "d1"}"#),
            Some(ClientMessage::Unsubscribe {
                dashboard_id: DashboardId::new("d1").unwrap()
            })
        );
        assert_eq!(ClientMessage::parse(r#"{"type": "ping"}"#), Some(ClientMessage::Ping));
    }

    #[test]
    fn malformed_client_messages_are_ignored() {
        assert_eq!(ClientMessage::parse("not json"), None);
        assert_eq!(ClientMessage::parse(r#"{"type": "request.state"}"#), None);
        assert_eq!(ClientMessage::parse(r#"{"type": "subscribe"}"#), None);
        assert_eq!(
            ClientMessage::parse(r#"{"type": "subscribe", "dashboard_id": ""}"#),
            None
        );
    }
}

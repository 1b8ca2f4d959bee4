//! In-memory client sink for tests.
//!
//! Records every message handed to it instead of writing to a socket.
//! Sends can be made to fail to exercise the registry's dead-connection
//! handling.
//!
//! # Example
//!
//! ```ignore
//! let sink = Arc::new(RecordingSink::new());
//! let accepted = registry.accept(sink.clone(), Some(dashboard_id), None).await?;
//! registry.send_to_dashboard(&dashboard_id, &event).await;
//! assert_eq!(sink.events().len(), 1);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::domain::realtime::{ControlMessage, Event, ServerMessage};
use crate::ports::{ClientSink, SendError};

#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<ServerMessage>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every send fails with [`SendError::Closed`].
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail_sends();
        sink
    }

    /// Makes all subsequent sends fail.
    pub fn fail_sends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Everything received so far, in order.
    pub fn messages(&self) -> Vec<ServerMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Only the events received so far.
    pub fn events(&self) -> Vec<Event> {
        self.messages()
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::Event(event) => Some(event),
                ServerMessage::Control(_) => None,
            })
            .collect()
    }

    /// Only the control messages received so far.
    pub fn control_messages(&self) -> Vec<ControlMessage> {
        self.messages()
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::Control(control) => Some(control),
                ServerMessage::Event(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl ClientSink for RecordingSink {
    async fn send(&self, message: &ServerMessage) -> Result<(), SendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SendError::Closed);
        }
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }
}

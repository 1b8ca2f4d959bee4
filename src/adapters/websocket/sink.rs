//! WebSocket-backed client sink.
//!
//! Each connection gets a bounded queue. `send` only enqueues; a writer task
//! owns the socket's send half and drains the queue, so fan-out never waits
//! on a slow network peer. A full queue counts as a failed send.

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::realtime::ServerMessage;
use crate::ports::{ClientSink, SendError};

/// Frames queued for the writer task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close(CloseFrame<'static>),
}

/// Send half of one WebSocket connection.
#[derive(Debug, Clone)]
pub struct WebSocketSink {
    tx: mpsc::Sender<Outbound>,
}

impl WebSocketSink {
    /// Spawns the writer task for `sender` and returns the sink plus the
    /// task handle. The task ends when every sink clone is dropped, a close
    /// frame is written, or the socket errors.
    pub fn spawn(
        mut sender: SplitSink<WebSocket, Message>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Outbound>(capacity.max(1));

        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                match frame {
                    Outbound::Text(text) => {
                        if let Err(e) = sender.send(Message::Text(text)).await {
                            tracing::debug!(error = %e, "WebSocket write failed");
                            break;
                        }
                    }
                    Outbound::Close(frame) => {
                        let _ = sender.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
            let _ = sender.close().await;
        });

        (Self { tx }, writer)
    }

    /// Queues a close frame. Messages queued before it are still written.
    pub async fn close(&self, code: u16, reason: &'static str) {
        let _ = self
            .tx
            .send(Outbound::Close(CloseFrame {
                code,
                reason: reason.into(),
            }))
            .await;
    }
}

#[async_trait]
impl ClientSink for WebSocketSink {
    async fn send(&self, message: &ServerMessage) -> Result<(), SendError> {
        let text =
            serde_json::to_string(message).map_err(|e| SendError::Serialization(e.to_string()))?;

        self.tx.try_send(Outbound::Text(text)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

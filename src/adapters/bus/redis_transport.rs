//! Redis pub/sub transport for multi-server deployments.
//!
//! Publishing goes through one multiplexed connection shared by all
//! callers. Each pattern subscription opens its own dedicated pub/sub
//! connection, as Redis requires.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::ports::{BusError, BusMessage, BusMessageStream, PubSubTransport};

/// Redis-backed [`PubSubTransport`].
#[derive(Clone)]
pub struct RedisTransport {
    client: redis::Client,
    conn: MultiplexedConnection,
    timeout: Duration,
}

impl RedisTransport {
    /// Opens the publishing connection, failing if Redis is unreachable
    /// within `timeout`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(transport_error)?;

        let conn = tokio::time::timeout(timeout, client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| BusError::Transport(format!("connection timed out after {:?}", timeout)))?
            .map_err(transport_error)?;

        Ok(Self {
            client,
            conn,
            timeout,
        })
    }
}

fn transport_error(e: redis::RedisError) -> BusError {
    BusError::Transport(e.to_string())
}

#[async_trait]
impl PubSubTransport for RedisTransport {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let mut conn = self.conn.clone();
        let _receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(transport_error)?;
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<BusMessageStream, BusError> {
        let conn = tokio::time::timeout(self.timeout, self.client.get_async_connection())
            .await
            .map_err(|_| BusError::Transport("pub/sub connection timed out".to_string()))?
            .map_err(transport_error)?;
        let mut pubsub = conn.into_pubsub();

        pubsub.psubscribe(pattern).await.map_err(transport_error)?;

        let stream = pubsub
            .into_on_message()
            .map(|msg| -> Result<BusMessage, BusError> {
                let payload: String = msg
                    .get_payload()
                    .map_err(|e| BusError::Serialization(e.to_string()))?;
                Ok(BusMessage {
                    channel: msg.get_channel_name().to_string(),
                    payload,
                })
            });

        Ok(stream.boxed())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

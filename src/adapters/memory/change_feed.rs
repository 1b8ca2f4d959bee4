//! In-memory change feed for testing.
//!
//! Records and failures pushed into the feed are delivered to every stream
//! currently open on it. Opens can be made to fail to exercise the
//! watcher's retry loop.
//!
//! # Example
//!
//! ```ignore
//! let feed = InMemoryChangeFeed::new();
//! // ... start a watcher on it, wait for feed.open_streams() > 0 ...
//! feed.push(ChangeRecord { ... });
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::broadcast;

use crate::ports::{ChangeFeed, ChangeFeedError, ChangeRecord, ChangeStream};

type FeedItem = Result<ChangeRecord, ChangeFeedError>;

pub struct InMemoryChangeFeed {
    sender: broadcast::Sender<FeedItem>,
    opens: AtomicUsize,
    failing_opens: AtomicUsize,
}

impl InMemoryChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self {
            sender,
            opens: AtomicUsize::new(0),
            failing_opens: AtomicUsize::new(0),
        }
    }

    // === Test Helpers ===

    /// Delivers a change to every open stream. Returns how many received it.
    pub fn push(&self, record: ChangeRecord) -> usize {
        self.sender.send(Ok(record)).unwrap_or(0)
    }

    /// Delivers a read error to every open stream.
    pub fn fail_read(&self, error: ChangeFeedError) -> usize {
        self.sender.send(Err(error)).unwrap_or(0)
    }

    /// Makes the next `n` calls to `open` fail.
    pub fn fail_next_opens(&self, n: usize) {
        self.failing_opens.store(n, Ordering::SeqCst);
    }

    /// Total successful and failed `open` calls.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Streams currently open.
    pub fn open_streams(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for InMemoryChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeed for InMemoryChangeFeed {
    async fn open(&self) -> Result<ChangeStream, ChangeFeedError> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(ChangeFeedError::Unavailable("feed offline".to_string()));
        }

        let receiver = self.sender.subscribe();
        let records = stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(item) => Some((item, receiver)),
                Err(broadcast::error::RecvError::Lagged(n)) => Some((
                    Err(ChangeFeedError::Read(format!("{} changes dropped", n))),
                    receiver,
                )),
                Err(broadcast::error::RecvError::Closed) => None,
            }
        });

        Ok(Box::pin(records))
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;

use pixel_types::events::ChangeEvent;

/// Room for a full reset burst plus headroom before receivers start lagging.
const FEED_CAPACITY: usize = 1024;

/// Fans row changes out to every changefeed session.
#[derive(Clone)]
pub struct ChangeFeed {
    inner: Arc<ChangeFeedInner>,
}

struct ChangeFeedInner {
    /// Broadcast channel for row changes; every session receives every change
    broadcast_tx: broadcast::Sender<ChangeEvent>,

    /// Sessions that completed the Subscribe handshake
    active_sessions: AtomicUsize,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(ChangeFeedInner {
                broadcast_tx,
                active_sessions: AtomicUsize::new(0),
            }),
        }
    }

    /// Subscribe to row changes. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish one change to all sessions. Nobody listening is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = ChangeEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn session_opened(&self) -> usize {
        self.inner.active_sessions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn session_closed(&self) -> usize {
        self.inner.active_sessions.fetch_sub(1, Ordering::Relaxed).saturating_sub(1)
    }

    pub fn active_sessions(&self) -> usize {
        self.inner.active_sessions.load(Ordering::Relaxed)
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

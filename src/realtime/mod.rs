//! Live event fan-out to connected WebSocket clients

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

use crate::analytics::RecentVisit;
use crate::models::JournalSession;

pub const DEFAULT_CAPACITY: usize = 256;

/// Server-to-client event, serialized as `{"event": ..., "data": ...}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum LiveEvent {
    NewSession(JournalSession),
    SessionUpdated(JournalSession),
    SessionDeleted { id: i64 },
    VisitRecorded(RecentVisit),
    UserTyping(Value),
    UserStoppedTyping(Value),
    Ping,
}

/// Client-to-server message. Anything else is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    UserTyping(Value),
    UserStoppedTyping(Value),
    Pong,
}

pub type ConnectionId = u64;

/// An event together with the connection that caused it, if any.
/// Receivers skip events that originated from themselves.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub origin: Option<ConnectionId>,
    pub event: LiveEvent,
}

impl Broadcast {
    pub fn is_from(&self, id: ConnectionId) -> bool {
        self.origin == Some(id)
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    sender: broadcast::Sender<Broadcast>,
    next_connection: Arc<AtomicU64>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            next_connection: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Allocate an id for a new connection
    pub fn register(&self) -> ConnectionId {
        self.next_connection.fetch_add(1, Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Broadcast> {
        self.sender.subscribe()
    }

    /// Publish to every subscriber
    pub fn publish(&self, event: LiveEvent) {
        self.send(Broadcast {
            origin: None,
            event,
        });
    }

    /// Publish to every subscriber except `origin`
    pub fn publish_from(&self, origin: ConnectionId, event: LiveEvent) {
        self.send(Broadcast {
            origin: Some(origin),
            event,
        });
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    fn send(&self, message: Broadcast) {
        // Sending only fails when nobody is listening
        if self.sender.send(message).is_err() {
            trace!("No live subscribers, event dropped");
        }
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

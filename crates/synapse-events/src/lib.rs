//! Typed event broadcaster — pub/sub with a history ring buffer.
//!
//! Every subsystem announces lifecycle transitions here. The broadcaster
//! is explicitly constructed and passed by reference (`Arc`); nothing in
//! the system assumes a process-wide instance.

use std::collections::VecDeque;
use std::sync::Arc;
use synapse_types::event::{EventKind, SynapseEvent};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

/// Maximum events retained in the history ring buffer.
const HISTORY_SIZE: usize = 1000;

/// Broadcast channel capacity. Slow subscribers observe `Lagged` rather
/// than blocking publishers.
const CHANNEL_CAPACITY: usize = 1024;

/// The event broadcaster.
pub struct EventBroadcaster {
    sender: broadcast::Sender<SynapseEvent>,
    history: Arc<RwLock<VecDeque<SynapseEvent>>>,
}

impl EventBroadcaster {
    /// Create a new broadcaster.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            history: Arc::new(RwLock::new(VecDeque::with_capacity(HISTORY_SIZE))),
        }
    }

    /// Publish an event kind, stamping id and timestamp.
    pub async fn emit(&self, kind: EventKind) -> SynapseEvent {
        let event = SynapseEvent::new(kind);
        self.publish(event.clone()).await;
        event
    }

    /// Publish a fully formed event.
    pub async fn publish(&self, event: SynapseEvent) {
        debug!(event_id = %event.id, "Publishing event");

        {
            let mut history = self.history.write().await;
            if history.len() >= HISTORY_SIZE {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        // No subscribers is fine; history still records the event.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<SynapseEvent> {
        self.sender.subscribe()
    }

    /// Get the most recent events, newest first.
    pub async fn history(&self, limit: usize) -> Vec<SynapseEvent> {
        let history = self.history.read().await;
        history.iter().rev().take(limit).cloned().collect()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

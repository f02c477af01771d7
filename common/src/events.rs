//! In-process publish/subscribe event bus (C11).
//!
//! Topics are fixed (`node_added`, `edges_added`, `index_run_completed`);
//! delivery is best-effort and ordered per subscriber. A subscriber that
//! falls behind the bounded channel capacity misses events and, on its
//! next poll, receives a synthetic `Dropped` marker instead of silently
//! skipping ahead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default per-subscriber buffer depth before the oldest event is evicted.
pub const DEFAULT_BUFFER: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeAdded {
        namespace: String,
        node_id: String,
        label: String,
        at: DateTime<Utc>,
    },
    EdgesAdded {
        namespace: String,
        edge_ids: Vec<String>,
        at: DateTime<Utc>,
    },
    IndexRunCompleted {
        namespace: String,
        run_id: String,
        status: String,
        at: DateTime<Utc>,
    },
    /// Synthetic marker emitted to a lagging subscriber in place of the
    /// events it missed.
    Dropped {
        count: u64,
        at: DateTime<Utc>,
    },
}

impl GraphEvent {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            GraphEvent::NodeAdded { namespace, .. } | GraphEvent::EdgesAdded { namespace, .. } => {
                Some(namespace)
            }
            GraphEvent::IndexRunCompleted { namespace, .. } => Some(namespace),
            GraphEvent::Dropped { .. } => None,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            GraphEvent::NodeAdded { .. } => "node_added",
            GraphEvent::EdgesAdded { .. } => "edges_added",
            GraphEvent::IndexRunCompleted { .. } => "index_run_completed",
            GraphEvent::Dropped { .. } => "dropped",
        }
    }
}

/// A single-process, single-broker event bus shared via `Arc` across the
/// API and worker binaries. Never reach for this from a pure function;
/// thread it through explicitly (context/config value), per the
/// "no global mutable state" design rule.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GraphEvent>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: GraphEvent) {
        // No receivers is not an error; the bus is fire-and-forget.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

pub struct EventSubscriber {
    receiver: broadcast::Receiver<GraphEvent>,
}

impl EventSubscriber {
    /// Awaits the next event, translating a lagged subscriber into a
    /// `Dropped` marker rather than surfacing the channel error.
    pub async fn recv(&mut self) -> Option<GraphEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(GraphEvent::Dropped {
                        count: skipped,
                        at: Utc::now(),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(8);
        let mut sub = bus.subscribe();
        bus.publish(GraphEvent::NodeAdded {
            namespace: "public".into(),
            node_id: "public:openai".into(),
            label: "Entity".into(),
            at: Utc::now(),
        });
        let event = sub.recv().await.expect("event");
        assert_eq!(event.event_type(), "node_added");
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_dropped_marker() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();
        for i in 0..10 {
            bus.publish(GraphEvent::IndexRunCompleted {
                namespace: "public".into(),
                run_id: format!("run-{i}"),
                status: "SUCCESS".into(),
                at: Utc::now(),
            });
        }
        let event = sub.recv().await.expect("event");
        assert_eq!(event.event_type(), "dropped");
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrudOperation {
    Create,
    Update,
    Delete,
}

/// Lifecycle notification published after a successful write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrudEvent {
    pub operation: CrudOperation,
    pub collection: String,
    pub record: Value,
}

/// Event channel injected into the service at construction. Subscription
/// lifecycle belongs to the hosting process, not to a module-level
/// singleton.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: CrudEvent);
}

/// Fan-out sink backed by a tokio broadcast channel. Publishing never
/// blocks; events are dropped when no subscriber is attached.
pub struct BroadcastSink {
    sender: broadcast::Sender<CrudEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrudEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn publish(&self, event: CrudEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!("crud event dropped: no subscribers");
        }
    }
}

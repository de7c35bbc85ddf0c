//! Broadcast bus carrying `WorkflowEvent`s from the run worker to subscribers.
//!
//! Every subscriber sees events in the order they were published. A
//! subscriber that falls more than `capacity` events behind receives
//! `RecvError::Lagged` with the number it missed, then resumes.

use flowbox_types::event::WorkflowEvent;
use tokio::sync::broadcast;

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Multi-consumer status channel.
///
/// Cloning the bus clones the sender; all clones feed the same subscribers.
pub struct EventBus {
    sender: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    /// Create a bus holding up to `capacity` undelivered events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// A receiver for all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.sender.subscribe()
    }

    /// Publish to all current subscribers. Dropped if there are none.
    pub fn publish(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

use tokio::sync::broadcast;
use tracing::trace;

use crate::config::EngineConfig;
use crate::types::WorkflowEvent;

/// Fan-out channel for workflow progress.
///
/// Every subscriber sees every event. A subscriber that falls more than
/// `capacity` events behind misses the oldest ones instead of holding up
/// the run.
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.event_capacity)
    }

    /// Returns how many subscribers the event reached.
    pub fn publish(&self, event: WorkflowEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                trace!(?event, "No event subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

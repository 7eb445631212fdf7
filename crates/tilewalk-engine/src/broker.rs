use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing::debug;

use tilewalk_core::error::{Result, TileWalkError};
use tilewalk_core::event::EventBus;
use tilewalk_core::traits::PromptResponder;
use tilewalk_core::types::{PromptRequest, WorkflowEvent};

type Pending = HashMap<String, (PromptRequest, oneshot::Sender<String>)>;

/// Routes UserInteraction prompts to whoever is listening on the event bus.
///
/// Each prompt is published as `PromptRequested`; a front end answers it
/// through [`PromptBroker::answer`]. A prompt whose tile stops waiting
/// (timeout, stop, deadline) is forgotten.
pub struct PromptBroker {
    pending: Mutex<Pending>,
    event_bus: Arc<EventBus>,
}

impl PromptBroker {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            event_bus,
        }
    }

    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a prompt, publish it, and return the receiver to await.
    pub fn request(&self, request: PromptRequest) -> oneshot::Receiver<String> {
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending();
            pending.retain(|_, (_, tx)| !tx.is_closed());
            pending.insert(request.id.clone(), (request.clone(), tx));
        }

        self.event_bus
            .publish(WorkflowEvent::PromptRequested { request });
        rx
    }

    /// Answer a pending prompt.
    /// Returns false if the id is unknown or its tile stopped waiting.
    pub fn answer(&self, request_id: &str, answer: impl Into<String>) -> bool {
        let entry = self.pending().remove(request_id);
        match entry {
            Some((_request, tx)) => {
                let delivered = tx.send(answer.into()).is_ok();
                if delivered {
                    self.event_bus.publish(WorkflowEvent::PromptAnswered {
                        request_id: request_id.to_string(),
                    });
                }
                delivered
            }
            None => false,
        }
    }

    /// Drop a pending prompt unanswered; its tile fails with `PromptClosed`.
    pub fn dismiss(&self, request_id: &str) -> bool {
        self.pending().remove(request_id).is_some()
    }

    /// Prompts still waiting for an answer. Abandoned ones are dropped.
    pub fn pending_requests(&self) -> Vec<PromptRequest> {
        let mut pending = self.pending();
        pending.retain(|_, (_, tx)| !tx.is_closed());
        pending.values().map(|(req, _)| req.clone()).collect()
    }
}

/// Removes a prompt from the pending map when its waiter goes away.
struct PendingGuard<'a> {
    broker: &'a PromptBroker,
    request_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.broker.pending().remove(&self.request_id);
    }
}

impl PromptResponder for PromptBroker {
    fn respond(&self, request: PromptRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let tile_id = request.tile_id.clone();
            debug!(tile_id = %tile_id, request_id = %request.id, "Waiting for prompt answer");
            let _guard = PendingGuard {
                broker: self,
                request_id: request.id.clone(),
            };
            let rx = self.request(request);
            rx.await.map_err(|_| TileWalkError::PromptClosed(tile_id))
        })
    }
}

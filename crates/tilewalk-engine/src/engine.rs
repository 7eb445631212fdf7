use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use tilewalk_core::config::EngineConfig;
use tilewalk_core::error::{Result, TileWalkError};
use tilewalk_core::event::EventBus;
use tilewalk_core::graph::WorkflowGraph;
use tilewalk_core::types::{TileFailure, WorkflowData, WorkflowEvent};
use tilewalk_tiles::TileExecutor;

/// Where a single engine is in its one-shot life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    NotStarted,
    Running,
    Completed,
    Failed,
}

/// Result of walking a graph to termination.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Final workflow data.
    pub data: WorkflowData,
    /// Number of tiles executed.
    pub steps: usize,
    /// Tile ids in execution order.
    pub visited: Vec<String>,
    /// Set when the last tile ended the run because of an error.
    pub tile_failure: Option<TileFailure>,
    pub elapsed_ms: u64,
}

/// Walks a workflow graph from its start tile, one tile at a time, until a
/// tile leaves no successor.
///
/// Each engine runs once. The control hooks (`pause`, `resume`, `stop`) are
/// observed between tiles; `stop` also interrupts a tile that is waiting on
/// a prompt or an HTTP call.
pub struct WorkflowEngine {
    workflow_id: String,
    graph: Arc<WorkflowGraph>,
    executor: Arc<TileExecutor>,
    event_bus: Arc<EventBus>,
    config: EngineConfig,
    cancel: CancellationToken,
    paused: watch::Sender<bool>,
    state: Mutex<EngineState>,
    snapshot: Mutex<WorkflowData>,
}

impl WorkflowEngine {
    pub fn new(
        workflow_id: impl Into<String>,
        graph: Arc<WorkflowGraph>,
        executor: Arc<TileExecutor>,
        event_bus: Arc<EventBus>,
        config: EngineConfig,
    ) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            workflow_id: workflow_id.into(),
            graph,
            executor,
            event_bus,
            config,
            cancel: CancellationToken::new(),
            paused,
            state: Mutex::new(EngineState::NotStarted),
            snapshot: Mutex::new(WorkflowData::new()),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Workflow data as of the last completed tile.
    pub fn data_snapshot(&self) -> WorkflowData {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hold the run before its next tile.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Cancel the run. A paused run is released and ends as cancelled.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Execute the graph starting from its start tile with `initial` data.
    ///
    /// Returns the final data once a tile leaves `next_tile` empty. Errors
    /// when a tile is missing or has an unknown type, when a prompt fails,
    /// when the step budget or deadline is exhausted, when the run is
    /// stopped, and (with `fail_on_tile_error`) when a tile reports a
    /// failure.
    pub async fn run(&self, initial: WorkflowData) -> Result<RunOutcome> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != EngineState::NotStarted {
                return Err(TileWalkError::InvalidTransition {
                    id: self.workflow_id.clone(),
                    action: "run".to_string(),
                    status: format!("{:?}", *state).to_lowercase(),
                });
            }
            *state = EngineState::Running;
        }

        let result = self.run_loop(initial).await;

        let final_state = match &result {
            Ok(outcome) => {
                info!(
                    workflow_id = %self.workflow_id,
                    steps = outcome.steps,
                    elapsed_ms = outcome.elapsed_ms,
                    "Workflow execution completed"
                );
                self.event_bus.publish(WorkflowEvent::RunCompleted {
                    workflow_id: self.workflow_id.clone(),
                    steps: outcome.steps,
                });
                EngineState::Completed
            }
            Err(e) => {
                error!(workflow_id = %self.workflow_id, error = %e, "Workflow execution failed");
                self.event_bus.publish(WorkflowEvent::RunFailed {
                    workflow_id: self.workflow_id.clone(),
                    error: e.to_string(),
                });
                EngineState::Failed
            }
        };
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = final_state;

        result
    }

    async fn run_loop(&self, mut data: WorkflowData) -> Result<RunOutcome> {
        let start = Instant::now();
        let max_duration =
            (self.config.max_duration_secs > 0).then(|| Duration::from_secs(self.config.max_duration_secs));
        let deadline = max_duration.map(|d| tokio::time::Instant::now() + d);

        let mut steps = 0usize;
        let mut visited = Vec::new();
        let mut tile_failure = None;
        let mut current = Some(self.graph.start_tile().to_string());

        self.store_snapshot(&data);
        info!(
            workflow_id = %self.workflow_id,
            start_tile = %self.graph.start_tile(),
            "Starting workflow execution"
        );
        self.event_bus.publish(WorkflowEvent::RunStarted {
            workflow_id: self.workflow_id.clone(),
            start_tile: self.graph.start_tile().to_string(),
        });

        while let Some(tile_id) = current {
            if self.cancel.is_cancelled() {
                return Err(TileWalkError::Cancelled);
            }
            self.wait_while_paused().await?;

            if steps >= self.config.max_steps {
                warn!(
                    workflow_id = %self.workflow_id,
                    tile_id = %tile_id,
                    max_steps = self.config.max_steps,
                    "Step budget exhausted, likely a cycle"
                );
                return Err(TileWalkError::StepBudgetExceeded(self.config.max_steps));
            }
            if let Some(limit) = max_duration {
                if start.elapsed() >= limit {
                    return Err(TileWalkError::DeadlineExceeded(limit.as_secs()));
                }
            }

            let definition = match self.graph.get(&tile_id) {
                Some(def) => def,
                None => {
                    error!(workflow_id = %self.workflow_id, tile_id = %tile_id, "Tile not found in workflow");
                    return Err(TileWalkError::TileNotFound(tile_id));
                }
            };

            let run = tokio::select! {
                result = self.executor.execute_tile(&self.workflow_id, definition, &mut data) => result?,
                _ = self.cancel.cancelled() => return Err(TileWalkError::Cancelled),
                _ = sleep_until(deadline) => {
                    return Err(TileWalkError::DeadlineExceeded(self.config.max_duration_secs));
                }
            };

            steps += 1;
            visited.push(tile_id);
            self.store_snapshot(&data);

            if let Some(failure) = run.failure {
                if self.config.fail_on_tile_error {
                    return Err(TileWalkError::TileFailed {
                        tile: run.tile_id,
                        message: failure.to_string(),
                    });
                }
                debug!(workflow_id = %self.workflow_id, tile_id = %run.tile_id, failure = %failure, "Tile ended the run");
                tile_failure = Some(failure);
            }
            current = run.next_tile;
        }

        Ok(RunOutcome {
            data,
            steps,
            visited,
            tile_failure,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn wait_while_paused(&self) -> Result<()> {
        let mut paused = self.paused.subscribe();
        if !*paused.borrow_and_update() {
            return Ok(());
        }

        info!(workflow_id = %self.workflow_id, "Workflow paused");
        tokio::select! {
            resumed = async { paused.wait_for(|p| !*p).await.map(|_| ()) } => {
                resumed.map_err(|_| TileWalkError::Cancelled)?;
            }
            _ = self.cancel.cancelled() => return Err(TileWalkError::Cancelled),
        }
        info!(workflow_id = %self.workflow_id, "Workflow resumed");
        Ok(())
    }

    fn store_snapshot(&self, data: &WorkflowData) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = data.clone();
    }
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => futures::future::pending().await,
    }
}

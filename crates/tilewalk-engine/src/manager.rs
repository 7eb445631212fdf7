use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use tilewalk_core::config::EngineConfig;
use tilewalk_core::error::{Result, TileWalkError};
use tilewalk_core::event::EventBus;
use tilewalk_core::graph::WorkflowGraph;
use tilewalk_core::types::{WorkflowData, WorkflowEvent, WorkflowStatus};
use tilewalk_tiles::TileExecutor;

use crate::engine::WorkflowEngine;

/// Point-in-time view of a tracked workflow.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowState {
    pub status: WorkflowStatus,
    pub data: WorkflowData,
    /// Why the run failed or stopped, if it did.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct StatusReport {
    status: WorkflowStatus,
    error: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

impl StatusReport {
    fn running() -> Self {
        Self {
            status: WorkflowStatus::Running,
            error: None,
            finished_at: None,
        }
    }
}

struct WorkflowInstance {
    engine: Arc<WorkflowEngine>,
    graph: Arc<WorkflowGraph>,
    initial_data: WorkflowData,
    status: Arc<watch::Sender<StatusReport>>,
    started_at: DateTime<Utc>,
}

impl WorkflowInstance {
    fn state(&self) -> WorkflowState {
        let report = self.status.borrow().clone();
        WorkflowState {
            status: report.status,
            data: self.engine.data_snapshot(),
            error: report.error,
            started_at: self.started_at,
            finished_at: report.finished_at,
        }
    }
}

/// Tracks workflow instances by id and drives each one on its own task.
///
/// Finished runs stay tracked (so their state can be read and they can be
/// restarted) until they are stopped.
pub struct WorkflowManager {
    instances: Mutex<HashMap<String, WorkflowInstance>>,
    executor: Arc<TileExecutor>,
    event_bus: Arc<EventBus>,
    config: EngineConfig,
}

impl WorkflowManager {
    pub fn new(executor: Arc<TileExecutor>, event_bus: Arc<EventBus>, config: EngineConfig) -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            executor,
            event_bus,
            config,
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Start a workflow in the background and return immediately.
    pub async fn start(&self, workflow_id: &str, graph: WorkflowGraph, initial_data: WorkflowData) -> Result<()> {
        let mut instances = self.instances.lock().await;
        if instances.contains_key(workflow_id) {
            warn!(workflow_id, "Workflow is already active");
            return Err(TileWalkError::WorkflowAlreadyActive(workflow_id.to_string()));
        }

        let instance = self.launch(workflow_id, Arc::new(graph), initial_data);
        instances.insert(workflow_id.to_string(), instance);
        info!(workflow_id, "Workflow started");
        Ok(())
    }

    /// Wait until the workflow reaches a terminal status.
    pub async fn wait(&self, workflow_id: &str) -> Result<WorkflowState> {
        let (mut status, engine, started_at) = {
            let instances = self.instances.lock().await;
            let instance = instances
                .get(workflow_id)
                .ok_or_else(|| TileWalkError::WorkflowNotFound(workflow_id.to_string()))?;
            (
                instance.status.subscribe(),
                instance.engine.clone(),
                instance.started_at,
            )
        };

        let report = status
            .wait_for(|r| r.status.is_terminal())
            .await
            .map(|r| r.clone())
            .map_err(|_| TileWalkError::WorkflowNotFound(workflow_id.to_string()))?;

        Ok(WorkflowState {
            status: report.status,
            data: engine.data_snapshot(),
            error: report.error,
            started_at,
            finished_at: report.finished_at,
        })
    }

    /// Start a workflow and wait for it to finish.
    pub async fn run(&self, workflow_id: &str, graph: WorkflowGraph, initial_data: WorkflowData) -> Result<WorkflowState> {
        self.start(workflow_id, graph, initial_data).await?;
        self.wait(workflow_id).await
    }

    /// Cancel a workflow and stop tracking it.
    pub async fn stop(&self, workflow_id: &str) -> Result<()> {
        let instance = self.instances.lock().await.remove(workflow_id);
        let Some(instance) = instance else {
            warn!(workflow_id, "Attempted to stop non-existent workflow");
            return Err(TileWalkError::WorkflowNotFound(workflow_id.to_string()));
        };

        instance.engine.stop();
        let changed = instance.status.send_if_modified(|r| {
            if r.status.is_terminal() {
                return false;
            }
            r.status = WorkflowStatus::Stopped;
            r.error = Some(TileWalkError::Cancelled.to_string());
            r.finished_at = Some(Utc::now());
            true
        });
        if changed {
            self.publish_status(workflow_id, WorkflowStatus::Stopped);
        }
        info!(workflow_id, "Workflow stopped and removed");
        Ok(())
    }

    /// Hold a running workflow before its next tile.
    pub async fn pause(&self, workflow_id: &str) -> Result<()> {
        self.transition(workflow_id, "pause", WorkflowStatus::Running, WorkflowStatus::Paused)
            .await?;
        info!(workflow_id, "Workflow paused");
        Ok(())
    }

    pub async fn resume(&self, workflow_id: &str) -> Result<()> {
        self.transition(workflow_id, "resume", WorkflowStatus::Paused, WorkflowStatus::Running)
            .await?;
        info!(workflow_id, "Workflow resumed");
        Ok(())
    }

    pub async fn get_state(&self, workflow_id: &str) -> Option<WorkflowState> {
        self.instances
            .lock()
            .await
            .get(workflow_id)
            .map(WorkflowInstance::state)
    }

    /// Status of every tracked workflow, finished ones included.
    pub async fn get_all_active(&self) -> HashMap<String, WorkflowStatus> {
        self.instances
            .lock()
            .await
            .iter()
            .map(|(id, instance)| (id.clone(), instance.status.borrow().status))
            .collect()
    }

    /// Run a finished workflow again with its original graph and data.
    pub async fn restart(&self, workflow_id: &str) -> Result<()> {
        let mut instances = self.instances.lock().await;
        let Some(existing) = instances.get(workflow_id) else {
            error!(workflow_id, "Cannot restart workflow, no data found");
            return Err(TileWalkError::NoDataFound(workflow_id.to_string()));
        };

        let status = existing.status.borrow().status;
        if !status.is_terminal() {
            warn!(workflow_id, %status, "Cannot restart an unfinished workflow");
            return Err(TileWalkError::WorkflowAlreadyActive(workflow_id.to_string()));
        }

        let graph = existing.graph.clone();
        let initial_data = existing.initial_data.clone();
        let instance = self.launch(workflow_id, graph, initial_data);
        instances.insert(workflow_id.to_string(), instance);
        info!(workflow_id, "Workflow restarted");
        Ok(())
    }

    fn launch(&self, workflow_id: &str, graph: Arc<WorkflowGraph>, initial_data: WorkflowData) -> WorkflowInstance {
        let engine = Arc::new(WorkflowEngine::new(
            workflow_id,
            graph.clone(),
            self.executor.clone(),
            self.event_bus.clone(),
            self.config.clone(),
        ));
        let (tx, _) = watch::channel(StatusReport::running());
        let status = Arc::new(tx);
        self.publish_status(workflow_id, WorkflowStatus::Running);

        tokio::spawn(drive(
            engine.clone(),
            status.clone(),
            self.event_bus.clone(),
            initial_data.clone(),
        ));

        WorkflowInstance {
            engine,
            graph,
            initial_data,
            status,
            started_at: Utc::now(),
        }
    }

    async fn transition(
        &self,
        workflow_id: &str,
        action: &str,
        from: WorkflowStatus,
        to: WorkflowStatus,
    ) -> Result<()> {
        let instances = self.instances.lock().await;
        let instance = instances
            .get(workflow_id)
            .ok_or_else(|| TileWalkError::WorkflowNotFound(workflow_id.to_string()))?;

        let mut current = from;
        let changed = instance.status.send_if_modified(|r| {
            current = r.status;
            if r.status != from {
                return false;
            }
            r.status = to;
            true
        });
        if !changed {
            warn!(workflow_id, action, status = %current, "Invalid workflow transition");
            return Err(TileWalkError::InvalidTransition {
                id: workflow_id.to_string(),
                action: action.to_string(),
                status: current.to_string(),
            });
        }

        match to {
            WorkflowStatus::Paused => instance.engine.pause(),
            _ => instance.engine.resume(),
        }
        self.publish_status(workflow_id, to);
        Ok(())
    }

    fn publish_status(&self, workflow_id: &str, status: WorkflowStatus) {
        self.event_bus.publish(WorkflowEvent::StatusChanged {
            workflow_id: workflow_id.to_string(),
            status,
        });
    }
}

/// Run the engine to completion and record how it ended.
async fn drive(
    engine: Arc<WorkflowEngine>,
    status: Arc<watch::Sender<StatusReport>>,
    event_bus: Arc<EventBus>,
    initial_data: WorkflowData,
) {
    let result = engine.run(initial_data).await;
    let report = match result {
        Ok(_) => StatusReport {
            status: WorkflowStatus::Completed,
            error: None,
            finished_at: Some(Utc::now()),
        },
        Err(e) => StatusReport {
            status: if matches!(e, TileWalkError::Cancelled) {
                WorkflowStatus::Stopped
            } else {
                WorkflowStatus::Failed
            },
            error: Some(e.to_string()),
            finished_at: Some(Utc::now()),
        },
    };

    let final_status = report.status;
    // A stop may already have recorded the outcome.
    let changed = status.send_if_modified(|r| {
        if r.status.is_terminal() {
            return false;
        }
        *r = report;
        true
    });
    if changed {
        event_bus.publish(WorkflowEvent::StatusChanged {
            workflow_id: engine.workflow_id().to_string(),
            status: final_status,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tilewalk_core::traits::PromptResponder;
    use tilewalk_test_utils::{
        branch_then_jump, graph, self_loop, tile, MockHttpClient, ScriptedResponder, SilentResponder,
    };

    fn build_manager(responder: Arc<dyn PromptResponder>, config: EngineConfig) -> WorkflowManager {
        let bus = Arc::new(EventBus::default());
        let executor = Arc::new(TileExecutor::new(
            responder,
            Arc::new(MockHttpClient::new()),
            bus.clone(),
        ));
        WorkflowManager::new(executor, bus, config)
    }

    fn prompt_graph() -> WorkflowGraph {
        graph("ask", vec![tile("ask", "UserInteractionTile", json!({}))])
    }

    async fn wait_for_status(manager: &WorkflowManager, id: &str, expected: WorkflowStatus) {
        for _ in 0..100 {
            if manager.get_state(id).await.map(|s| s.status) == Some(expected) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("workflow {} never reached {}", id, expected);
    }

    #[tokio::test]
    async fn run_completes_with_final_data() {
        let manager = build_manager(Arc::new(ScriptedResponder::new(["Yes"])), EngineConfig::default());

        let state = manager
            .run("wf-1", branch_then_jump(), WorkflowData::new())
            .await
            .unwrap();

        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.data.to_value(), json!({"next_tile": null}));
        assert!(state.error.is_none());
        assert!(state.finished_at.is_some());

        // Finished runs stay tracked.
        let tracked = manager.get_state("wf-1").await.unwrap();
        assert_eq!(tracked.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn start_returns_before_run_finishes() {
        let manager = build_manager(Arc::new(SilentResponder), EngineConfig::default());

        manager
            .start("wf-1", prompt_graph(), WorkflowData::new())
            .await
            .unwrap();

        let state = manager.get_state("wf-1").await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Running);
        assert!(state.finished_at.is_none());
        manager.stop("wf-1").await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_start_is_rejected() {
        let responder = Arc::new(ScriptedResponder::new(["Yes"]));
        let manager = build_manager(responder.clone(), EngineConfig::default());

        let mut first = WorkflowData::new();
        first.set_str("run", "first");
        manager.start("wf-1", prompt_graph(), first).await.unwrap();

        let mut second = WorkflowData::new();
        second.set_str("run", "second");
        let err = manager
            .start("wf-1", self_loop(), second.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, TileWalkError::WorkflowAlreadyActive(id) if id == "wf-1"));
        assert_eq!(manager.get_all_active().await.len(), 1);

        let state = manager.wait("wf-1").await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(
            state.data.to_value(),
            json!({"run": "first", "selected_option": "Yes", "next_tile": null})
        );

        // A finished run is still tracked, so its id stays taken.
        let err = manager
            .start("wf-1", prompt_graph(), second)
            .await
            .unwrap_err();
        assert!(matches!(err, TileWalkError::WorkflowAlreadyActive(_)));

        let after = manager.get_state("wf-1").await.unwrap();
        assert_eq!(after.status, WorkflowStatus::Completed);
        assert_eq!(after.data.to_value(), state.data.to_value());
        assert_eq!(responder.requests().len(), 1);
    }

    #[tokio::test]
    async fn cycle_fails_with_step_budget() {
        let config = EngineConfig {
            max_steps: 5,
            ..EngineConfig::default()
        };
        let manager = build_manager(Arc::new(ScriptedResponder::new(["Yes"])), config);

        let state = manager
            .run("loop", self_loop(), WorkflowData::new())
            .await
            .unwrap();

        assert_eq!(state.status, WorkflowStatus::Failed);
        assert!(state.error.unwrap().contains("step budget"));
    }

    #[tokio::test]
    async fn stop_removes_instance() {
        let manager = build_manager(Arc::new(SilentResponder), EngineConfig::default());
        manager
            .start("wf-1", prompt_graph(), WorkflowData::new())
            .await
            .unwrap();

        manager.stop("wf-1").await.unwrap();

        assert!(manager.get_state("wf-1").await.is_none());
        assert!(manager.get_all_active().await.is_empty());
        assert!(matches!(
            manager.stop("wf-1").await,
            Err(TileWalkError::WorkflowNotFound(_))
        ));
    }

    #[tokio::test]
    async fn stop_unknown_workflow() {
        let manager = build_manager(Arc::new(SilentResponder), EngineConfig::default());
        assert!(matches!(
            manager.stop("ghost").await,
            Err(TileWalkError::WorkflowNotFound(id)) if id == "ghost"
        ));
    }

    #[tokio::test]
    async fn pause_and_resume() {
        let manager = build_manager(Arc::new(SilentResponder), EngineConfig::default());
        manager
            .start("wf-1", prompt_graph(), WorkflowData::new())
            .await
            .unwrap();

        manager.pause("wf-1").await.unwrap();
        assert_eq!(
            manager.get_all_active().await.get("wf-1"),
            Some(&WorkflowStatus::Paused)
        );
        assert!(matches!(
            manager.pause("wf-1").await,
            Err(TileWalkError::InvalidTransition { .. })
        ));

        manager.resume("wf-1").await.unwrap();
        assert_eq!(
            manager.get_state("wf-1").await.unwrap().status,
            WorkflowStatus::Running
        );
        assert!(matches!(
            manager.resume("wf-1").await,
            Err(TileWalkError::InvalidTransition { .. })
        ));
        manager.stop("wf-1").await.unwrap();
    }

    #[tokio::test]
    async fn paused_run_holds_before_next_tile() {
        let manager = build_manager(Arc::new(ScriptedResponder::new(["Yes"])), EngineConfig::default());
        // Pausing races the spawned task; whichever tile it lands on, the
        // run must not finish until resumed.
        let g = graph(
            "A",
            vec![
                tile("A", "FlowJumpTile", json!({"jump_target": "B"})),
                tile("B", "FlowJumpTile", json!({"jump_target": "C"})),
                tile("C", "FlowJumpTile", json!({"jump_target": null})),
            ],
        );
        manager.start("wf-1", g, WorkflowData::new()).await.unwrap();
        if manager.pause("wf-1").await.is_err() {
            // Already finished before the pause landed.
            assert_eq!(
                manager.get_state("wf-1").await.unwrap().status,
                WorkflowStatus::Completed
            );
            return;
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        let paused = manager.get_state("wf-1").await.unwrap();
        assert!(matches!(
            paused.status,
            WorkflowStatus::Paused | WorkflowStatus::Completed
        ));

        if paused.status == WorkflowStatus::Paused {
            manager.resume("wf-1").await.unwrap();
        }
        let state = tokio::time::timeout(Duration::from_secs(5), manager.wait("wf-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(state.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn pause_finished_workflow_is_invalid() {
        let manager = build_manager(Arc::new(ScriptedResponder::new(["Yes"])), EngineConfig::default());
        manager
            .run("wf-1", branch_then_jump(), WorkflowData::new())
            .await
            .unwrap();

        let err = manager.pause("wf-1").await.unwrap_err();
        match err {
            TileWalkError::InvalidTransition { action, status, .. } => {
                assert_eq!(action, "pause");
                assert_eq!(status, "completed");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn restart_reruns_with_original_data() {
        let manager = build_manager(
            Arc::new(ScriptedResponder::new(["Yes", "No"])),
            EngineConfig::default(),
        );
        let g = graph(
            "ask",
            vec![tile("ask", "UserInteractionTile", json!({"next_tile": null}))],
        );
        let mut initial = WorkflowData::new();
        initial.set_str("customer", "ada");

        let first = manager.run("wf-1", g, initial).await.unwrap();
        assert_eq!(first.data.get_str("selected_option"), Some("Yes"));

        manager.restart("wf-1").await.unwrap();
        let second = manager.wait("wf-1").await.unwrap();

        assert_eq!(second.status, WorkflowStatus::Completed);
        assert_eq!(second.data.get_str("customer"), Some("ada"));
        assert_eq!(second.data.get_str("selected_option"), Some("No"));
    }

    #[tokio::test]
    async fn restart_unknown_workflow() {
        let manager = build_manager(Arc::new(SilentResponder), EngineConfig::default());
        assert!(matches!(
            manager.restart("ghost").await,
            Err(TileWalkError::NoDataFound(id)) if id == "ghost"
        ));
    }

    #[tokio::test]
    async fn restart_running_workflow_is_rejected() {
        let manager = build_manager(Arc::new(SilentResponder), EngineConfig::default());
        manager
            .start("wf-1", prompt_graph(), WorkflowData::new())
            .await
            .unwrap();

        assert!(matches!(
            manager.restart("wf-1").await,
            Err(TileWalkError::WorkflowAlreadyActive(_))
        ));
        manager.stop("wf-1").await.unwrap();
    }

    #[tokio::test]
    async fn failed_run_reports_error() {
        let manager = build_manager(Arc::new(ScriptedResponder::new(["Yes"])), EngineConfig::default());
        let g = graph(
            "A",
            vec![tile("A", "FlowJumpTile", json!({"jump_target": "missing"}))],
        );

        manager.start("wf-1", g, WorkflowData::new()).await.unwrap();
        wait_for_status(&manager, "wf-1", WorkflowStatus::Failed).await;

        let state = manager.get_state("wf-1").await.unwrap();
        assert!(state.error.unwrap().contains("missing"));
        assert_eq!(state.data.next_tile(), Some("missing"));
    }

    #[tokio::test]
    async fn status_changes_are_published() {
        let manager = build_manager(Arc::new(ScriptedResponder::new(["Yes"])), EngineConfig::default());
        let mut rx = manager.event_bus().subscribe();

        manager
            .run("wf-1", branch_then_jump(), WorkflowData::new())
            .await
            .unwrap();

        let mut statuses = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let WorkflowEvent::StatusChanged { status, .. } = event {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![WorkflowStatus::Running, WorkflowStatus::Completed]
        );
    }
}

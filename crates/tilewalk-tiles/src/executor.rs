use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use tilewalk_core::config::AppConfig;
use tilewalk_core::error::Result;
use tilewalk_core::event::EventBus;
use tilewalk_core::graph::TileDefinition;
use tilewalk_core::traits::{HttpClient, PromptResponder};
use tilewalk_core::types::{TileFailure, TileKind, WorkflowData, WorkflowEvent};

use crate::builtin::{Tile, TileContext};

/// Summary of one tile execution.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRun {
    pub tile_id: String,
    pub kind: TileKind,
    /// Successor read back from the merged workflow data.
    pub next_tile: Option<String>,
    pub failure: Option<TileFailure>,
    /// Configuration fields that fell back to defaults.
    pub defaulted: Vec<&'static str>,
    pub elapsed_ms: u64,
}

/// Instantiates, configures and runs tiles against workflow data.
pub struct TileExecutor {
    responder: Arc<dyn PromptResponder>,
    http: Arc<dyn HttpClient>,
    event_bus: Arc<EventBus>,
    prompt_timeout: Option<Duration>,
    http_timeout: Option<Duration>,
}

impl TileExecutor {
    pub fn new(
        responder: Arc<dyn PromptResponder>,
        http: Arc<dyn HttpClient>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::with_config(responder, http, event_bus, &AppConfig::default())
    }

    /// Create an executor taking its timeouts from `config` (0 = no limit).
    pub fn with_config(
        responder: Arc<dyn PromptResponder>,
        http: Arc<dyn HttpClient>,
        event_bus: Arc<EventBus>,
        config: &AppConfig,
    ) -> Self {
        Self {
            responder,
            http,
            event_bus,
            prompt_timeout: secs(config.prompt.timeout_secs),
            http_timeout: secs(config.http.timeout_secs),
        }
    }

    /// Execute one tile and merge its result into `data`.
    ///
    /// An unknown tile type fails before anything runs and leaves `data`
    /// untouched. On success `data` is the new authoritative state.
    pub async fn execute_tile(
        &self,
        workflow_id: &str,
        definition: &TileDefinition,
        data: &mut WorkflowData,
    ) -> Result<TileRun> {
        let kind = match definition.tile_type.parse::<TileKind>() {
            Ok(kind) => kind,
            Err(e) => {
                error!(tile_id = %definition.id, tile_type = %definition.tile_type, "Unsupported tile type");
                return Err(e);
            }
        };

        info!(
            tile_id = %definition.id,
            tile_name = %definition.name,
            tile_type = %kind,
            "Executing tile"
        );
        self.event_bus.publish(WorkflowEvent::TileStarted {
            workflow_id: workflow_id.to_string(),
            tile_id: definition.id.clone(),
            tile_name: definition.name.clone(),
            kind,
        });

        let start = Instant::now();
        let (tile, report) = Tile::configure(kind, &definition.configuration);
        if !report.defaulted.is_empty() {
            debug!(tile_id = %definition.id, defaulted = ?report.defaulted, "Configuration defaults applied");
        }

        let output = {
            let ctx = TileContext {
                workflow_id,
                tile_id: &definition.id,
                data: &*data,
                responder: self.responder.as_ref(),
                http: self.http.as_ref(),
                prompt_timeout: self.prompt_timeout,
                http_timeout: self.http_timeout,
            };
            tile.execute(&ctx).await?
        };

        data.merge(output.values);
        let next_tile = data.next_tile().map(str::to_string);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        debug!(tile_id = %definition.id, next_tile = ?next_tile, elapsed_ms, "Tile execution complete");
        self.event_bus.publish(WorkflowEvent::TileCompleted {
            workflow_id: workflow_id.to_string(),
            tile_id: definition.id.clone(),
            next_tile: next_tile.clone(),
            failure: output.failure.clone(),
            elapsed_ms,
        });

        Ok(TileRun {
            tile_id: definition.id.clone(),
            kind,
            next_tile,
            failure: output.failure,
            defaulted: report.defaulted,
            elapsed_ms,
        })
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}

use serde_json::{Map, Value};
use tracing::{debug, info};

use tilewalk_core::error::{Result, TileWalkError};
use tilewalk_core::types::PromptRequest;

use super::{ConfigReader, ConfigReport, TileContext, TileOutput};

const DEFAULT_PROMPT: &str = "Enter your choice:";
const DEFAULT_OPTIONS: [&str; 2] = ["Yes", "No"];

/// Asks the prompt responder a question and records the answer.
#[derive(Debug, Clone, PartialEq)]
pub struct UserInteractionTile {
    pub prompt: String,
    pub options: Vec<String>,
    pub next_tile: Option<String>,
}

impl UserInteractionTile {
    pub fn configure(configuration: &Map<String, Value>) -> (Self, ConfigReport) {
        let mut reader = ConfigReader::new(configuration);
        let tile = Self {
            prompt: reader.string("prompt", DEFAULT_PROMPT),
            options: reader.string_list("options", &DEFAULT_OPTIONS),
            next_tile: reader.tile_ref("next_tile"),
        };
        (tile, reader.finish())
    }

    /// Wait for a single response. A responder error or an expired wait
    /// fails the tile.
    pub async fn execute(&self, ctx: &TileContext<'_>) -> Result<TileOutput> {
        let request = PromptRequest::new(
            ctx.workflow_id,
            ctx.tile_id,
            self.prompt.clone(),
            self.options.clone(),
        );
        debug!(tile_id = %ctx.tile_id, prompt = %self.prompt, options = ?self.options, "Waiting for response");

        let answer = match ctx.prompt_timeout {
            Some(timeout) => tokio::time::timeout(timeout, ctx.responder.respond(request))
                .await
                .map_err(|_| TileWalkError::PromptTimeout {
                    tile: ctx.tile_id.to_string(),
                    timeout_secs: timeout.as_secs(),
                })??,
            None => ctx.responder.respond(request).await?,
        };

        info!(tile_id = %ctx.tile_id, selected = %answer, "User selected option");
        Ok(TileOutput::next(self.next_tile.as_deref()).with("selected_option", Value::String(answer)))
    }
}

use serde_json::{Map, Value};
use tracing::debug;

use super::{ConfigReader, ConfigReport, TileOutput};

/// Unconditional redirect to another tile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowJumpTile {
    pub jump_target: Option<String>,
}

impl FlowJumpTile {
    pub fn new(jump_target: Option<&str>) -> Self {
        Self {
            jump_target: jump_target.map(str::to_string),
        }
    }

    pub fn configure(configuration: &Map<String, Value>) -> (Self, ConfigReport) {
        let mut reader = ConfigReader::new(configuration);
        let tile = Self {
            jump_target: reader.tile_ref("jump_target"),
        };
        (tile, reader.finish())
    }

    /// The result depends on nothing but the configured target.
    pub fn execute(&self) -> TileOutput {
        debug!(jump_target = ?self.jump_target, "Jumping");
        TileOutput::next(self.jump_target.as_deref())
    }
}

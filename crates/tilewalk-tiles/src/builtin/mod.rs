pub mod api_call;
pub mod flow_jump;
pub mod logic_builder;
pub mod user_interaction;

use std::time::Duration;

use serde_json::{Map, Value};

use tilewalk_core::error::Result;
use tilewalk_core::traits::{HttpClient, PromptResponder};
use tilewalk_core::types::{TileFailure, TileKind, WorkflowData, NEXT_TILE};

pub use api_call::ApiCallTile;
pub use flow_jump::FlowJumpTile;
pub use logic_builder::LogicBuilderTile;
pub use user_interaction::UserInteractionTile;

/// Collaborators and inputs available to a tile while it executes.
pub struct TileContext<'a> {
    pub workflow_id: &'a str,
    pub tile_id: &'a str,
    /// Workflow data as it stood before this tile.
    pub data: &'a WorkflowData,
    pub responder: &'a dyn PromptResponder,
    pub http: &'a dyn HttpClient,
    /// `None` waits indefinitely.
    pub prompt_timeout: Option<Duration>,
    pub http_timeout: Option<Duration>,
}

/// What a tile produced: the values to merge and, if the tile ended the
/// workflow because something went wrong, why.
#[derive(Debug, Clone, PartialEq)]
pub struct TileOutput {
    pub values: Map<String, Value>,
    pub failure: Option<TileFailure>,
}

impl TileOutput {
    /// An output carrying only the successor.
    pub fn next(next_tile: Option<&str>) -> Self {
        let mut values = Map::new();
        values.insert(
            NEXT_TILE.to_string(),
            next_tile.map_or(Value::Null, |t| Value::String(t.to_string())),
        );
        Self {
            values,
            failure: None,
        }
    }

    /// An output that ends the workflow because of `failure`.
    pub fn failed(failure: TileFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::next(None)
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn next_tile(&self) -> Option<&str> {
        self.values.get(NEXT_TILE).and_then(|v| v.as_str())
    }
}

/// Which configuration fields fell back to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigReport {
    pub defaulted: Vec<&'static str>,
}

/// Typed accessor over a configuration map that records every default it
/// has to fill in. A field present with the wrong JSON type counts as
/// defaulted.
pub(crate) struct ConfigReader<'a> {
    map: &'a Map<String, Value>,
    report: ConfigReport,
}

impl<'a> ConfigReader<'a> {
    pub(crate) fn new(map: &'a Map<String, Value>) -> Self {
        Self {
            map,
            report: ConfigReport::default(),
        }
    }

    pub(crate) fn string(&mut self, key: &'static str, default: &str) -> String {
        match self.map.get(key).and_then(|v| v.as_str()) {
            Some(s) => s.to_string(),
            None => {
                self.report.defaulted.push(key);
                default.to_string()
            }
        }
    }

    /// A nullable tile reference. An explicit `null` is a supplied value.
    pub(crate) fn tile_ref(&mut self, key: &'static str) -> Option<String> {
        match self.map.get(key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) => None,
            _ => {
                self.report.defaulted.push(key);
                None
            }
        }
    }

    pub(crate) fn string_list(&mut self, key: &'static str, default: &[&str]) -> Vec<String> {
        let list = self.map.get(key).and_then(|v| v.as_array()).map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        });
        match list {
            Some(list) => list,
            None => {
                self.report.defaulted.push(key);
                default.iter().map(|s| s.to_string()).collect()
            }
        }
    }

    pub(crate) fn object(&mut self, key: &'static str) -> Map<String, Value> {
        match self.map.get(key).and_then(|v| v.as_object()) {
            Some(obj) => obj.clone(),
            None => {
                self.report.defaulted.push(key);
                Map::new()
            }
        }
    }

    pub(crate) fn value(&mut self, key: &'static str, default: Value) -> Value {
        match self.map.get(key) {
            Some(v) => v.clone(),
            None => {
                self.report.defaulted.push(key);
                default
            }
        }
    }

    /// An optional field whose absence is not worth reporting.
    pub(crate) fn optional_string(&self, key: &str) -> Option<String> {
        self.map.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }

    pub(crate) fn finish(self) -> ConfigReport {
        self.report
    }
}

/// A configured tile, ready to execute once.
#[derive(Debug, Clone, PartialEq)]
pub enum Tile {
    UserInteraction(UserInteractionTile),
    LogicBuilder(LogicBuilderTile),
    FlowJump(FlowJumpTile),
    ApiCall(ApiCallTile),
}

impl Tile {
    /// Configure the variant for `kind` from a generic configuration map,
    /// filling defaults for missing fields.
    pub fn configure(kind: TileKind, configuration: &Map<String, Value>) -> (Self, ConfigReport) {
        match kind {
            TileKind::UserInteraction => {
                let (tile, report) = UserInteractionTile::configure(configuration);
                (Self::UserInteraction(tile), report)
            }
            TileKind::LogicBuilder => {
                let (tile, report) = LogicBuilderTile::configure(configuration);
                (Self::LogicBuilder(tile), report)
            }
            TileKind::FlowJump => {
                let (tile, report) = FlowJumpTile::configure(configuration);
                (Self::FlowJump(tile), report)
            }
            TileKind::ApiCall => {
                let (tile, report) = ApiCallTile::configure(configuration);
                (Self::ApiCall(tile), report)
            }
        }
    }

    pub fn kind(&self) -> TileKind {
        match self {
            Self::UserInteraction(_) => TileKind::UserInteraction,
            Self::LogicBuilder(_) => TileKind::LogicBuilder,
            Self::FlowJump(_) => TileKind::FlowJump,
            Self::ApiCall(_) => TileKind::ApiCall,
        }
    }

    /// Run the tile. Every output carries a `next_tile` entry.
    pub async fn execute(&self, ctx: &TileContext<'_>) -> Result<TileOutput> {
        match self {
            Self::UserInteraction(tile) => tile.execute(ctx).await,
            Self::LogicBuilder(tile) => Ok(tile.execute(ctx.data)),
            Self::FlowJump(tile) => Ok(tile.execute()),
            Self::ApiCall(tile) => Ok(tile.execute(ctx).await),
        }
    }
}

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, TileWalkError};

/// Reserved workflow data key naming the tile to run next.
pub const NEXT_TILE: &str = "next_tile";

/// The closed set of tile kinds the executor knows how to run.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum TileKind {
    UserInteraction,
    LogicBuilder,
    FlowJump,
    ApiCall,
}

impl TileKind {
    pub const ALL: [TileKind; 4] = [
        TileKind::UserInteraction,
        TileKind::LogicBuilder,
        TileKind::FlowJump,
        TileKind::ApiCall,
    ];

    /// Canonical type name as written in workflow definitions.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserInteraction => "UserInteractionTile",
            Self::LogicBuilder => "LogicBuilderTile",
            Self::FlowJump => "FlowJumpTile",
            Self::ApiCall => "APICallTile",
        }
    }
}

impl FromStr for TileKind {
    type Err = TileWalkError;

    /// Accepts the canonical `...Tile` names and their short forms.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UserInteractionTile" | "UserInteraction" => Ok(Self::UserInteraction),
            "LogicBuilderTile" | "LogicBuilder" => Ok(Self::LogicBuilder),
            "FlowJumpTile" | "FlowJump" => Ok(Self::FlowJump),
            "APICallTile" | "APICall" | "ApiCall" => Ok(Self::ApiCall),
            other => Err(TileWalkError::UnsupportedTileType(other.to_string())),
        }
    }
}

impl std::fmt::Display for TileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable record threaded through every tile of one workflow run.
///
/// Tile results are merged in with overwrite-on-conflict semantics;
/// keys a tile does not return are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowData {
    data: HashMap<String, Value>,
}

impl WorkflowData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build workflow data from a JSON value, which must be an object (or null).
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(obj) => Ok(Self {
                data: obj.into_iter().collect(),
            }),
            other => Err(TileWalkError::Config(format!(
                "workflow data must be a JSON object, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get a value as a string, if it's a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), Value::String(value.into()));
    }

    /// Merge a tile result into the data (overwrites on conflict).
    pub fn merge(&mut self, values: Map<String, Value>) {
        for (k, v) in values {
            self.data.insert(k, v);
        }
    }

    /// The tile the run loop should execute next.
    ///
    /// Absent, null, non-string and empty values all mean "stop".
    pub fn next_tile(&self) -> Option<&str> {
        self.get_str(NEXT_TILE).filter(|s| !s.is_empty())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Render the data as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

impl From<HashMap<String, Value>> for WorkflowData {
    fn from(data: HashMap<String, Value>) -> Self {
        Self { data }
    }
}

/// Lifecycle status of a workflow instance.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Paused,
    Stopped,
    Completed,
    Failed,
}

impl WorkflowStatus {
    /// Whether the run loop has finished for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why a tile ended the workflow without a successor even though it was
/// configured with one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TileFailure {
    UnsupportedHttpMethod { method: String },
    RemoteStatus { url: String, status: u16 },
    Transport { url: String, message: String },
}

impl std::fmt::Display for TileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedHttpMethod { method } => {
                write!(f, "unsupported HTTP method: {}", method)
            }
            Self::RemoteStatus { url, status } => {
                write!(f, "{} answered with status {}", url, status)
            }
            Self::Transport { url, message } => write!(f, "{}: {}", url, message),
        }
    }
}

/// A question put to the prompt responder by a UserInteraction tile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub id: String,
    pub workflow_id: String,
    pub tile_id: String,
    pub prompt: String,
    pub options: Vec<String>,
}

impl PromptRequest {
    pub fn new(
        workflow_id: impl Into<String>,
        tile_id: impl Into<String>,
        prompt: impl Into<String>,
        options: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            tile_id: tile_id.into(),
            prompt: prompt.into(),
            options,
        }
    }
}

/// HTTP methods an APICall tile may issue.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl FromStr for HttpMethod {
    type Err = TileWalkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            _ => Err(TileWalkError::UnsupportedHttpMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// One outbound request issued by an APICall tile.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Sent as query parameters.
    pub params: Map<String, Value>,
    /// JSON body; only sent for POST.
    pub payload: Option<Value>,
}

/// Status and parsed body of a completed request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// `None` when the body was empty or not valid JSON.
    pub body: Option<Value>,
}

impl HttpResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: Some(body),
        }
    }
}

/// Structured event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// Run loop entered.
    RunStarted {
        workflow_id: String,
        start_tile: String,
    },
    /// A tile is about to execute.
    TileStarted {
        workflow_id: String,
        tile_id: String,
        tile_name: String,
        kind: TileKind,
    },
    /// A tile finished and its result was merged.
    TileCompleted {
        workflow_id: String,
        tile_id: String,
        next_tile: Option<String>,
        failure: Option<TileFailure>,
        elapsed_ms: u64,
    },
    /// Run loop ended without a successor.
    RunCompleted { workflow_id: String, steps: usize },
    /// Run loop aborted.
    RunFailed { workflow_id: String, error: String },
    /// Lifecycle status changed.
    StatusChanged {
        workflow_id: String,
        status: WorkflowStatus,
    },
    /// A UserInteraction tile is waiting for an answer.
    PromptRequested { request: PromptRequest },
    /// A pending prompt was answered.
    PromptAnswered { request_id: String },
}

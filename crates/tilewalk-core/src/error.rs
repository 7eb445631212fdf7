use thiserror::Error;

#[derive(Debug, Error)]
pub enum TileWalkError {
    // Tile errors
    #[error("Unsupported tile type: {0}")]
    UnsupportedTileType(String),

    #[error("Tile with ID {0} not found")]
    TileNotFound(String),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedHttpMethod(String),

    #[error("Remote call to {url} failed: {message}")]
    RemoteCall { url: String, message: String },

    #[error("Tile {tile} ended the workflow with an error: {message}")]
    TileFailed { tile: String, message: String },

    // Run loop errors
    #[error("Workflow exceeded step budget ({0})")]
    StepBudgetExceeded(usize),

    #[error("Workflow exceeded max duration ({0}s)")]
    DeadlineExceeded(u64),

    #[error("Workflow cancelled")]
    Cancelled,

    // Prompt errors
    #[error("Prompt timeout after {timeout_secs}s: {tile}")]
    PromptTimeout { tile: String, timeout_secs: u64 },

    #[error("Prompt responder closed before answering: {0}")]
    PromptClosed(String),

    // Lifecycle errors
    #[error("Workflow {0} is already active")]
    WorkflowAlreadyActive(String),

    #[error("Workflow {0} not found")]
    WorkflowNotFound(String),

    #[error("No data found for workflow {0}")]
    NoDataFound(String),

    #[error("Workflow {id} cannot {action} while {status}")]
    InvalidTransition {
        id: String,
        action: String,
        status: String,
    },

    // Graph errors
    #[error("Invalid workflow graph: {0}")]
    InvalidGraph(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TileWalkError>;

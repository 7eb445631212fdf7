//! Workflow execution for tilewalk.
//!
//! [`WorkflowEngine`] walks one graph to termination. [`WorkflowManager`]
//! tracks engines by workflow id and exposes the start/pause/resume/stop
//! lifecycle. [`PromptBroker`] connects UserInteraction prompts to a
//! front end through the event bus.

pub mod broker;
pub mod engine;
pub mod manager;

pub use broker::PromptBroker;
pub use engine::{EngineState, RunOutcome, WorkflowEngine};
pub use manager::{WorkflowManager, WorkflowState};

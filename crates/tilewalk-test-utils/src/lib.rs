//! Mocks and fixtures shared by the tilewalk test suites.

use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;
use serde_json::Value;

use tilewalk_core::config::AppConfig;
use tilewalk_core::error::{Result, TileWalkError};
use tilewalk_core::graph::{TileDefinition, WorkflowGraph};
use tilewalk_core::traits::{HttpClient, PromptResponder};
use tilewalk_core::types::{HttpRequest, HttpResponse, PromptRequest};

/// Answers prompts from a fixed script, in order.
///
/// Once the script is exhausted every prompt fails with `PromptClosed`.
pub struct ScriptedResponder {
    answers: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<PromptRequest>>,
}

impl ScriptedResponder {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Prompts received so far.
    pub fn requests(&self) -> Vec<PromptRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl PromptResponder for ScriptedResponder {
    fn respond(&self, request: PromptRequest) -> BoxFuture<'_, Result<String>> {
        let tile_id = request.tile_id.clone();
        self.requests.lock().unwrap().push(request);
        let answer = self.answers.lock().unwrap().pop_front();
        Box::pin(async move { answer.ok_or(TileWalkError::PromptClosed(tile_id)) })
    }
}

/// A responder that never answers.
pub struct SilentResponder;

impl PromptResponder for SilentResponder {
    fn respond(&self, _request: PromptRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(futures::future::pending())
    }
}

/// Records requests and replays queued responses.
///
/// With nothing queued it answers `200 {}`.
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    /// Queue a transport failure.
    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(TileWalkError::RemoteCall {
                url: "mock".to_string(),
                message: message.to_string(),
            }));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpClient for MockHttpClient {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        self.requests.lock().unwrap().push(request);
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(HttpResponse::json(200, serde_json::json!({}))));
        Box::pin(async move { next })
    }
}

/// Build a tile definition from an id, a declared type and a JSON config.
pub fn tile(id: &str, tile_type: &str, configuration: Value) -> TileDefinition {
    TileDefinition::new(id, tile_type).with_configuration(configuration)
}

/// Build a graph, panicking on invalid input.
pub fn graph(start_tile: &str, tiles: Vec<TileDefinition>) -> WorkflowGraph {
    WorkflowGraph::new(start_tile, tiles).expect("valid test graph")
}

/// A LogicBuilder(true) → FlowJump(null) graph.
pub fn branch_then_jump() -> WorkflowGraph {
    graph(
        "A",
        vec![
            tile(
                "A",
                "LogicBuilderTile",
                serde_json::json!({"condition": true, "true_tile": "B", "false_tile": null}),
            ),
            tile("B", "FlowJumpTile", serde_json::json!({"jump_target": null})),
        ],
    )
}

/// A single FlowJump tile that jumps to itself forever.
pub fn self_loop() -> WorkflowGraph {
    graph(
        "loop",
        vec![tile("loop", "FlowJumpTile", serde_json::json!({"jump_target": "loop"}))],
    )
}

/// Config with a small step budget for fast cycle tests.
pub fn test_config(max_steps: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.engine.max_steps = max_steps;
    config
}

use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{HttpRequest, HttpResponse, PromptRequest};

/// Prompt responder: the interactive input channel behind UserInteraction tiles.
pub trait PromptResponder: Send + Sync + 'static {
    /// Present the prompt and its options, resolving to the single response.
    fn respond(&self, request: PromptRequest) -> BoxFuture<'_, Result<String>>;
}

/// HTTP client: the transport behind APICall tiles.
pub trait HttpClient: Send + Sync + 'static {
    /// Issue one request. Transport failures are returned as `Err`;
    /// any HTTP status, success or not, is an `Ok` response.
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>>;
}

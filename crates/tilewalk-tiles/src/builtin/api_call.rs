use serde_json::{Map, Value};
use tracing::{info, warn};

use tilewalk_core::types::{HttpMethod, HttpRequest, HttpResponse, TileFailure};

use super::{ConfigReader, ConfigReport, TileContext, TileOutput};

const DEFAULT_API_URL: &str = "https://example.com";
const DEFAULT_HTTP_METHOD: &str = "GET";

/// Calls a remote HTTP API and stores the JSON response.
///
/// Failures never raise: an unsupported method, a non-200 status, an
/// unparseable body or a transport error all produce
/// `{"response": null, "next_tile": null}` together with a [`TileFailure`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCallTile {
    pub api_url: String,
    /// Kept as written; validated when the tile executes.
    pub http_method: String,
    pub params: Map<String, Value>,
    pub payload: Map<String, Value>,
    pub next_tile: Option<String>,
}

impl ApiCallTile {
    pub fn configure(configuration: &Map<String, Value>) -> (Self, ConfigReport) {
        let mut reader = ConfigReader::new(configuration);
        let tile = Self {
            api_url: reader.string("api_url", DEFAULT_API_URL),
            http_method: reader.string("http_method", DEFAULT_HTTP_METHOD),
            params: reader.object("params"),
            payload: reader.object("payload"),
            next_tile: reader.tile_ref("next_tile"),
        };
        (tile, reader.finish())
    }

    pub async fn execute(&self, ctx: &TileContext<'_>) -> TileOutput {
        let method = match self.http_method.parse::<HttpMethod>() {
            Ok(method) => method,
            Err(_) => {
                warn!(tile_id = %ctx.tile_id, method = %self.http_method, "Unsupported HTTP method");
                return failed(TileFailure::UnsupportedHttpMethod {
                    method: self.http_method.clone(),
                });
            }
        };

        let request = HttpRequest {
            method,
            url: self.api_url.clone(),
            params: self.params.clone(),
            payload: (method == HttpMethod::Post).then(|| Value::Object(self.payload.clone())),
        };

        let sent = match ctx.http_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, ctx.http.send(request)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(tile_id = %ctx.tile_id, url = %self.api_url, "API call timed out");
                    return failed(TileFailure::Transport {
                        url: self.api_url.clone(),
                        message: format!("timed out after {}s", timeout.as_secs()),
                    });
                }
            },
            None => ctx.http.send(request).await,
        };

        match sent {
            Ok(HttpResponse {
                status: 200,
                body: Some(body),
            }) => {
                info!(tile_id = %ctx.tile_id, url = %self.api_url, %method, "API call successful");
                TileOutput::next(self.next_tile.as_deref()).with("response", body)
            }
            Ok(HttpResponse { status: 200, body: None }) => {
                warn!(tile_id = %ctx.tile_id, url = %self.api_url, "API call returned a non-JSON body");
                failed(TileFailure::Transport {
                    url: self.api_url.clone(),
                    message: "response body is not valid JSON".to_string(),
                })
            }
            Ok(HttpResponse { status, .. }) => {
                warn!(tile_id = %ctx.tile_id, url = %self.api_url, status, "API call failed");
                failed(TileFailure::RemoteStatus {
                    url: self.api_url.clone(),
                    status,
                })
            }
            Err(e) => {
                warn!(tile_id = %ctx.tile_id, url = %self.api_url, error = %e, "Error during API call");
                failed(TileFailure::Transport {
                    url: self.api_url.clone(),
                    message: e.to_string(),
                })
            }
        }
    }
}

fn failed(failure: TileFailure) -> TileOutput {
    TileOutput::failed(failure).with("response", Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::json;
    use tilewalk_core::types::WorkflowData;
    use tilewalk_test_utils::{MockHttpClient, ScriptedResponder};

    fn configured(value: Value) -> ApiCallTile {
        ApiCallTile::configure(value.as_object().unwrap()).0
    }

    async fn run(tile: &ApiCallTile, http: &MockHttpClient) -> TileOutput {
        let responder = ScriptedResponder::new(Vec::<String>::new());
        let data = WorkflowData::new();
        let ctx = TileContext {
            workflow_id: "wf",
            tile_id: "api",
            data: &data,
            responder: &responder,
            http,
            prompt_timeout: None,
            http_timeout: Some(Duration::from_secs(5)),
        };
        tile.execute(&ctx).await
    }

    fn expected(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_configure_defaults() {
        let (tile, report) = ApiCallTile::configure(&Map::new());
        assert_eq!(tile.api_url, "https://example.com");
        assert_eq!(tile.http_method, "GET");
        assert!(tile.params.is_empty());
        assert!(tile.payload.is_empty());
        assert_eq!(
            report.defaulted,
            vec!["api_url", "http_method", "params", "payload", "next_tile"]
        );
    }

    #[tokio::test]
    async fn test_get_success() {
        let http = MockHttpClient::new();
        http.push_response(HttpResponse::json(200, json!({"x": 1})));
        let tile = configured(json!({
            "api_url": "https://api.test/items",
            "params": {"page": 2},
            "payload": {"ignored": true},
            "next_tile": "next"
        }));

        let out = run(&tile, &http).await;
        assert_eq!(out.values, expected(json!({"response": {"x": 1}, "next_tile": "next"})));
        assert!(out.failure.is_none());

        let sent = http.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, HttpMethod::Get);
        assert_eq!(sent[0].url, "https://api.test/items");
        assert_eq!(sent[0].params.get("page"), Some(&json!(2)));
        assert_eq!(sent[0].payload, None);
    }

    #[tokio::test]
    async fn test_post_sends_payload() {
        let http = MockHttpClient::new();
        http.push_response(HttpResponse::json(200, json!({"id": 7})));
        let tile = configured(json!({
            "api_url": "https://api.test/items",
            "http_method": "POST",
            "payload": {"name": "widget"},
            "next_tile": "done"
        }));

        let out = run(&tile, &http).await;
        assert_eq!(out.next_tile(), Some("done"));
        assert_eq!(http.requests()[0].payload, Some(json!({"name": "widget"})));
    }

    #[tokio::test]
    async fn test_server_error_clears_next_tile() {
        let http = MockHttpClient::new();
        http.push_response(HttpResponse::json(500, json!({"error": "boom"})));
        let tile = configured(json!({"next_tile": "next"}));

        let out = run(&tile, &http).await;
        assert_eq!(out.values, expected(json!({"response": null, "next_tile": null})));
        assert!(matches!(
            out.failure,
            Some(TileFailure::RemoteStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_non_200_success_is_failure() {
        let http = MockHttpClient::new();
        http.push_response(HttpResponse::json(201, json!({"created": true})));
        let tile = configured(json!({"next_tile": "next"}));

        let out = run(&tile, &http).await;
        assert_eq!(out.next_tile(), None);
        assert!(out.failure.is_some());
    }

    #[tokio::test]
    async fn test_transport_error() {
        let http = MockHttpClient::new();
        http.push_error("connection refused");
        let tile = configured(json!({"next_tile": "next"}));

        let out = run(&tile, &http).await;
        assert_eq!(out.values, expected(json!({"response": null, "next_tile": null})));
        assert!(matches!(out.failure, Some(TileFailure::Transport { .. })));
    }

    #[tokio::test]
    async fn test_non_json_body() {
        let http = MockHttpClient::new();
        http.push_response(HttpResponse {
            status: 200,
            body: None,
        });
        let tile = configured(json!({"next_tile": "next"}));

        let out = run(&tile, &http).await;
        assert_eq!(out.next_tile(), None);
        assert!(matches!(out.failure, Some(TileFailure::Transport { .. })));
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let http = MockHttpClient::new();
        let tile = configured(json!({"http_method": "DELETE", "next_tile": "next"}));

        let out = run(&tile, &http).await;
        assert_eq!(out.values, expected(json!({"response": null, "next_tile": null})));
        assert_eq!(
            out.failure,
            Some(TileFailure::UnsupportedHttpMethod {
                method: "DELETE".into()
            })
        );
        assert!(http.requests().is_empty());
    }
}

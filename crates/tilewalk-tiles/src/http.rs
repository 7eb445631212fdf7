use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tracing::debug;

use tilewalk_core::config::HttpConfig;
use tilewalk_core::error::{Result, TileWalkError};
use tilewalk_core::traits::HttpClient;
use tilewalk_core::types::{HttpMethod, HttpRequest, HttpResponse};

/// `HttpClient` backed by a shared `reqwest::Client`.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.as_str());
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        let client = builder
            .build()
            .map_err(|e| TileWalkError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse>> {
        Box::pin(async move {
            debug!(method = %request.method, url = %request.url, "Sending request");

            let mut req = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
            };
            let query = query_pairs(&request.params);
            if !query.is_empty() {
                req = req.query(&query);
            }
            if let Some(ref payload) = request.payload {
                req = req.json(payload);
            }

            let resp = req.send().await.map_err(|e| TileWalkError::RemoteCall {
                url: request.url.clone(),
                message: format!("Request failed: {}", e),
            })?;

            let status = resp.status().as_u16();
            let text = resp.text().await.map_err(|e| TileWalkError::RemoteCall {
                url: request.url.clone(),
                message: format!("Failed to read response body: {}", e),
            })?;

            Ok(HttpResponse {
                status,
                body: serde_json::from_str(&text).ok(),
            })
        })
    }
}

/// Render params as query pairs; strings go out unquoted.
fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect()
}

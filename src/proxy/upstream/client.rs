use reqwest::{Client, Response};
use serde_json::Value;
use tokio::time::Duration;

use crate::error::{ProxyError, ProxyResult};

fn request_timeout_secs() -> u64 {
    std::env::var("THINKGATE_REQUEST_TIMEOUT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(crate::constants::DEFAULT_REQUEST_TIMEOUT_SECS)
}

// One shared reqwest client; connections are pooled per host and each
// response is scoped to its request's lifetime.
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new() -> Self {
        let timeout = request_timeout_secs();
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(
                crate::constants::UPSTREAM_CONNECT_TIMEOUT_SECS,
            ))
            .pool_max_idle_per_host(16)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(timeout))
            .build()
            .expect("Failed to create upstream HTTP client");
        tracing::debug!("UpstreamClient created (timeout: {}s)", timeout);
        Self { client }
    }

    pub async fn post_json(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
        body: &Value,
    ) -> ProxyResult<Response> {
        let mut request = self.client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        request.send().await.map_err(ProxyError::from)
    }

    pub async fn get(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> ProxyResult<Response> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, value);
        }
        request.send().await.map_err(ProxyError::from)
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

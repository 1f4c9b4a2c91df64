//! Outbound transport for custom-send calls.

use crate::error::{Result, WeixinError};
use async_trait::async_trait;

/// POSTs a JSON body and returns the response body. Implementations must not retry.
#[async_trait]
pub trait SendTransport: Send + Sync {
    async fn post_json(&self, url: &str, body: String) -> Result<String>;
}

/// reqwest-backed transport.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SendTransport for HttpTransport {
    async fn post_json(&self, url: &str, body: String) -> Result<String> {
        let res = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| WeixinError::UpstreamSend(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(WeixinError::UpstreamSend(format!("{} {}", status, body)));
        }
        res.text()
            .await
            .map_err(|e| WeixinError::UpstreamSend(e.to_string()))
    }
}

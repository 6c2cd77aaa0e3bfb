use futures::future::BoxFuture;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use parcell_core::config::NetConfig;
use parcell_core::error::{ParcellError, Result};
use parcell_core::traits::Transport;

/// reqwest-backed transport resolving relative URLs against a base URL.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &NetConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| {
                ParcellError::transport(
                    config.base_url.as_str(),
                    format!("Failed to create HTTP client: {}", e),
                )
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Absolute URLs pass through; anything else is joined onto the base.
    pub fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            url.trim_start_matches('/')
        )
    }

    async fn send(&self, url: &str, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let resp = request
            .send()
            .await
            .map_err(|e| ParcellError::transport(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ParcellError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }

    async fn decode_json(url: &str, resp: reqwest::Response) -> Result<serde_json::Value> {
        resp.json()
            .await
            .map_err(|e| ParcellError::transport(url, format!("Invalid JSON response: {}", e)))
    }
}

impl Transport for HttpTransport {
    fn get_json(&self, url: &str) -> BoxFuture<'_, Result<serde_json::Value>> {
        let url = self.resolve(url);
        Box::pin(async move {
            debug!(url = %url, "GET");
            let resp = self.send(&url, self.client.get(&url)).await?;
            Self::decode_json(&url, resp).await
        })
    }

    fn get_text(&self, url: &str) -> BoxFuture<'_, Result<String>> {
        let url = self.resolve(url);
        Box::pin(async move {
            debug!(url = %url, "GET (text)");
            let resp = self.send(&url, self.client.get(&url)).await?;
            resp.text()
                .await
                .map_err(|e| ParcellError::transport(url.as_str(), e))
        })
    }

    fn post_json(&self, url: &str, body: String) -> BoxFuture<'_, Result<serde_json::Value>> {
        let url = self.resolve(url);
        Box::pin(async move {
            debug!(url = %url, bytes = body.len(), "POST");
            let request = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .body(body);
            let resp = self.send(&url, request).await?;
            Self::decode_json(&url, resp).await
        })
    }
}

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{Result, WikiError};
use super::client::{text_stream, CompletionClient, CompletionRequest, TextStream};

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8001";

/// Client for the repository-aware chat completion service
pub struct ServiceClient {
    base_url: String,
    http: reqwest::Client,
}

impl ServiceClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_http(base_url, reqwest::Client::new())
    }

    pub fn with_http(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions/stream", self.base_url)
    }
}

#[async_trait]
impl CompletionClient for ServiceClient {
    async fn stream(&self, request: &CompletionRequest) -> Result<TextStream> {
        let endpoint = self.endpoint();
        debug!("POST {} (provider={}, model={})", endpoint, request.provider, request.model);

        let response = self.http
            .post(&endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| WikiError::Network(format!("Completion request to {} failed: {}", endpoint, e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(WikiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(text_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        "completion service"
    }
}

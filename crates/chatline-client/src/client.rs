//! HTTP transport for the chat service.
//!
//! Endpoint: POST `<endpoint>/request_smart`. The speech routes live in
//! [`crate::voice`].

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::mpsc;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::sse::stream_events;
use crate::transport::{ChatRequest, StreamEvent, Transport};

/// Streaming client for the chat service.
#[derive(Debug, Clone)]
pub struct ChatClient {
    pub(crate) client: Client,
    config: ClientConfig,
}

impl ChatClient {
    /// Create a client for `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client, config })
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send `request`, waiting at most the configured timeout for headers.
    ///
    /// Non-success statuses become [`ClientError::Api`].
    pub(crate) async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = tokio::time::timeout(self.config.request_timeout(), request.send())
            .await
            .map_err(|_| ClientError::Timeout(self.config.request_timeout_seconds))??;

        if !response.status().is_success() {
            let err = Self::handle_error(response).await;
            tracing::warn!(error = %err, "Request rejected");
            return Err(err);
        }
        Ok(response)
    }

    /// Handle API error responses.
    async fn handle_error(response: reqwest::Response) -> ClientError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        ClientError::Api { status, message }
    }
}

#[async_trait]
impl Transport for ChatClient {
    async fn send_request(&self, request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>> {
        let url = self.config.request_url();
        tracing::debug!(
            url = %url,
            model = ?request.model,
            has_image = request.image_url.is_some(),
            "Sending chat request"
        );

        let response = self.send(self.client.post(&url).json(&request)).await?;
        Ok(stream_events(response, self.config.channel_capacity))
    }
}

//! The seam between the exchange controller and the network.
//!
//! A [`Transport`] turns one [`ChatRequest`] into a channel of
//! [`StreamEvent`]s: zero or more fragments followed by exactly one
//! `Complete` or `Error`.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::Result;

/// Body of a streaming chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// The user's text.
    pub user_input: String,
    /// Attached image, as a URL or inline `data:` URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Requested model name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl ChatRequest {
    /// A text-only request.
    #[must_use]
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            image_url: None,
            model: None,
        }
    }

    /// Attach an image.
    #[must_use]
    pub fn with_image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }

    /// Request a specific model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Events delivered for one exchange, in receipt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of assistant text.
    Fragment(String),
    /// The reply finished normally.
    Complete,
    /// The transport failed; no further events follow.
    Error(String),
}

impl StreamEvent {
    /// Whether this event ends the exchange.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error(_))
    }
}

/// Something that can start a streaming exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return the channel its events arrive on.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be started. Failures after
    /// that point arrive as [`StreamEvent::Error`].
    async fn send_request(&self, request: ChatRequest) -> Result<mpsc::Receiver<StreamEvent>>;
}

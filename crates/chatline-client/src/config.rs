//! Client configuration types.

use std::time::Duration;

use chatline_core::AppSettings;
use serde::Deserialize;

/// Configuration for the streaming chat client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the chat service (e.g., `http://127.0.0.1:9200`).
    #[serde(default = "ClientConfig::default_endpoint")]
    pub endpoint: String,

    /// Path of the streaming request route.
    #[serde(default = "ClientConfig::default_route")]
    pub route: String,

    /// Seconds to wait for the response headers. The body stream itself is
    /// not time-limited.
    #[serde(default = "ClientConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Buffered stream events per exchange.
    #[serde(default = "ClientConfig::default_channel_capacity")]
    pub channel_capacity: usize,
}

impl ClientConfig {
    fn default_endpoint() -> String {
        AppSettings::DEFAULT_ENDPOINT.to_string()
    }

    fn default_route() -> String {
        "/request_smart".to_string()
    }

    const fn default_request_timeout() -> u64 {
        60
    }

    const fn default_channel_capacity() -> usize {
        128
    }

    /// Default configuration pointed at `endpoint`.
    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Full URL of the streaming route.
    #[must_use]
    pub fn request_url(&self) -> String {
        self.url(&self.route)
    }

    /// Full URL of `route` on the configured endpoint.
    #[must_use]
    pub fn url(&self, route: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            route.trim_start_matches('/')
        )
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            route: Self::default_route(),
            request_timeout_seconds: Self::default_request_timeout(),
            channel_capacity: Self::default_channel_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, "http://127.0.0.1:9200");
        assert_eq!(config.route, "/request_smart");
        assert_eq!(config.channel_capacity, 128);
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn request_url_joins_cleanly() {
        let config = ClientConfig::with_endpoint("http://localhost:9200/");
        assert_eq!(config.request_url(), "http://localhost:9200/request_smart");
        assert_eq!(
            config.url("text_to_speech"),
            "http://localhost:9200/text_to_speech"
        );
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"endpoint": "http://example.test"}"#).unwrap();
        assert_eq!(config.endpoint, "http://example.test");
        assert_eq!(config.route, "/request_smart");
        assert_eq!(config.request_timeout_seconds, 60);
    }
}

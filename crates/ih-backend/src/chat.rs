//! Chat-completion client for the assistant backend function.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use ih_protocol::{ChatRequest, ConversationTurn};
use reqwest::{Client, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::sse::{parse_delta_stream, DeltaStream};

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Shown when a failed response carries no usable message.
pub const GENERIC_FAILURE: &str = "Failed to get response";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Non-success status. Displays the server's message only.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("stream error: {0}")]
    Stream(String),
}

/// Response body as raw chunks, in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

/// Deltas decoded from one response body.
pub type ChatStream = DeltaStream<ByteStream>;

/// Anything that can open a streamed chat-completion exchange.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the whole conversation and return the response's delta stream.
    ///
    /// Fails before any delta when the transport fails or the status is not
    /// a success.
    async fn stream_chat(&self, turns: &[ConversationTurn]) -> Result<ChatStream, ChatError>;
}

/// URL of a backend function, e.g. `{base}/functions/v1/chat`.
pub fn function_url(base_url: &str, function: &str) -> String {
    format!("{}/functions/v1/{}", base_url.trim_end_matches('/'), function)
}

/// Extract the human-readable message from an error body.
///
/// Accepts `{"error": "..."}` and `{"error": {"message": "..."}}`; anything
/// else yields [`GENERIC_FAILURE`].
pub fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return GENERIC_FAILURE.to_string();
    };
    let error = value.get("error");
    error
        .and_then(|e| e.as_str())
        .or_else(|| error.and_then(|e| e.get("message")).and_then(|m| m.as_str()))
        .filter(|m| !m.is_empty())
        .unwrap_or(GENERIC_FAILURE)
        .to_string()
}

/// HTTP client for the chat function.
pub struct ChatClient {
    endpoint: String,
    api_key: String,
    http: Client,
}

/// Build an HTTP client with the given timeouts.
fn build_http_client(timeout: Duration, connect_timeout: Duration) -> Result<Client, ChatError> {
    Ok(Client::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(2)
        .build()?)
}

impl ChatClient {
    /// Create a client for `endpoint` authorized with `api_key`.
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ChatError> {
        Self::with_timeouts(
            endpoint,
            api_key,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    pub fn with_timeouts(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, ChatError> {
        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            http: build_http_client(timeout, connect_timeout)?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_request(&self, turns: &[ConversationTurn]) -> Result<Response, ChatError> {
        let body = ChatRequest::from(turns);

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            warn!(%status, %message, "chat request rejected");
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn stream_chat(&self, turns: &[ConversationTurn]) -> Result<ChatStream, ChatError> {
        info!(turns = turns.len(), endpoint = %self.endpoint, "starting chat exchange");
        let response = self.send_request(turns).await?;

        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(ChatError::from)),
        );
        Ok(parse_delta_stream(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_url_joins_cleanly() {
        assert_eq!(
            function_url("https://abc.supabase.co/", "chat"),
            "https://abc.supabase.co/functions/v1/chat"
        );
        assert_eq!(
            function_url("http://localhost:54321", "chat"),
            "http://localhost:54321/functions/v1/chat"
        );
    }

    #[test]
    fn error_message_from_string_field() {
        assert_eq!(error_message(r#"{"error":"rate limited"}"#), "rate limited");
    }

    #[test]
    fn error_message_from_nested_field() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Payment required"}}"#),
            "Payment required"
        );
    }

    #[test]
    fn error_message_falls_back() {
        assert_eq!(error_message(""), GENERIC_FAILURE);
        assert_eq!(error_message("<html>bad gateway</html>"), GENERIC_FAILURE);
        assert_eq!(error_message(r#"{"error":""}"#), GENERIC_FAILURE);
        assert_eq!(error_message(r#"{"detail":"x"}"#), GENERIC_FAILURE);
    }

    #[test]
    fn api_error_displays_message_only() {
        let err = ChatError::Api {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn new_client_does_not_panic() {
        let client = ChatClient::new("http://localhost/functions/v1/chat", "key").unwrap();
        assert_eq!(client.endpoint(), "http://localhost/functions/v1/chat");
    }
}

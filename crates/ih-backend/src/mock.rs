//! Mock upstream for testing.
//!
//! Produces the same wire bytes the real chat function sends, so tests at
//! every layer exercise the real reader instead of a shortcut.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use ih_protocol::{ChatRequest, ConversationTurn};
use tokio::time::sleep;

use crate::chat::{error_message, ByteStream, ChatBackend, ChatError, ChatStream};
use crate::sse::parse_delta_stream;

/// One piece of a scripted response body.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A `data:` record carrying a content delta.
    Text { content: String },
    /// A `:` comment line.
    Comment { text: String },
    /// Bytes written verbatim.
    Raw { bytes: String },
    /// The `[DONE]` sentinel.
    Done,
    /// Fail the transport mid-body.
    Error { message: String },
    /// Delay before the next piece (for timing tests).
    Delay { ms: u64 },
}

impl MockResponse {
    fn wire(&self) -> Option<String> {
        match self {
            MockResponse::Text { content } => {
                let record = serde_json::json!({"choices": [{"delta": {"content": content}}]});
                Some(format!("data: {record}\n\n"))
            }
            MockResponse::Comment { text } => Some(format!(": {text}\n\n")),
            MockResponse::Raw { bytes } => Some(bytes.clone()),
            MockResponse::Done => Some("data: [DONE]\n\n".to_string()),
            MockResponse::Error { .. } | MockResponse::Delay { .. } => None,
        }
    }
}

/// Configuration for a mock body.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Sequence of pieces to emit.
    pub responses: Vec<MockResponse>,
    /// Re-cut each piece into chunks of at most this many bytes.
    pub chunk_size: Option<usize>,
    /// Optional delay between each chunk (ms).
    pub chunk_delay_ms: Option<u64>,
}

impl MockConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(mut self, responses: Vec<MockResponse>) -> Self {
        self.responses = responses;
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    pub fn with_chunk_delay(mut self, ms: u64) -> Self {
        self.chunk_delay_ms = Some(ms);
        self
    }
}

/// Create a response body from mock config.
pub fn mock_body(config: MockConfig) -> impl Stream<Item = Result<Bytes, ChatError>> + Send {
    stream! {
        for response in config.responses {
            match &response {
                MockResponse::Error { message } => {
                    yield Err(ChatError::Stream(message.clone()));
                    return;
                }
                MockResponse::Delay { ms } => {
                    sleep(Duration::from_millis(*ms)).await;
                    continue;
                }
                _ => {}
            }

            let Some(wire) = response.wire() else { continue };
            let bytes = Bytes::from(wire);
            let size = config.chunk_size.unwrap_or(bytes.len()).max(1);

            let mut offset = 0;
            while offset < bytes.len() {
                if let Some(delay_ms) = config.chunk_delay_ms {
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                let end = (offset + size).min(bytes.len());
                yield Ok(bytes.slice(offset..end));
                offset = end;
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Stream(MockConfig),
    Fail { status: u16, body: String },
}

/// A [`ChatBackend`] that replays scripted exchanges and records requests.
#[derive(Debug, Clone)]
pub struct MockBackend {
    behaviors: Arc<Mutex<Vec<Behavior>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl MockBackend {
    fn with_behavior(behavior: Behavior) -> Self {
        Self {
            behaviors: Arc::new(Mutex::new(vec![behavior])),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every exchange streams `config`.
    pub fn streaming(config: MockConfig) -> Self {
        Self::with_behavior(Behavior::Stream(config))
    }

    /// Every exchange fails with `status` and `body`.
    pub fn failing(status: u16, body: impl Into<String>) -> Self {
        Self::with_behavior(Behavior::Fail {
            status,
            body: body.into(),
        })
    }

    /// Queue a different script for the next exchange. Scripts are used in
    /// order; the last one repeats.
    pub fn then_streaming(self, config: MockConfig) -> Self {
        self.push(Behavior::Stream(config))
    }

    pub fn then_failing(self, status: u16, body: impl Into<String>) -> Self {
        self.push(Behavior::Fail {
            status,
            body: body.into(),
        })
    }

    fn push(self, behavior: Behavior) -> Self {
        if let Ok(mut behaviors) = self.behaviors.lock() {
            behaviors.push(behavior);
        }
        self
    }

    fn next_behavior(&self) -> Option<Behavior> {
        let mut behaviors = self.behaviors.lock().ok()?;
        if behaviors.len() > 1 {
            Some(behaviors.remove(0))
        } else {
            behaviors.first().cloned()
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn stream_chat(&self, turns: &[ConversationTurn]) -> Result<ChatStream, ChatError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(ChatRequest::from(turns));
        }

        match self.next_behavior() {
            Some(Behavior::Stream(config)) => {
                let body: ByteStream = Box::pin(mock_body(config));
                Ok(parse_delta_stream(body))
            }
            Some(Behavior::Fail { status, body }) => Err(ChatError::Api {
                status,
                message: error_message(&body),
            }),
            None => Err(ChatError::Stream("mock backend poisoned".to_string())),
        }
    }
}

/// Built-in test fixtures for common scenarios.
pub mod fixtures {
    use super::*;

    /// A complete response streaming `chunks` as separate deltas.
    pub fn streaming_text(chunks: &[&str]) -> MockConfig {
        let mut responses: Vec<MockResponse> = chunks
            .iter()
            .map(|chunk| MockResponse::Text {
                content: (*chunk).to_string(),
            })
            .collect();
        responses.push(MockResponse::Done);

        MockConfig::new().with_responses(responses)
    }

    /// The two-chunk "Hello" / " there" exchange with a record split across
    /// the chunk boundary.
    pub fn split_record() -> MockConfig {
        MockConfig::new().with_responses(vec![
            MockResponse::Raw {
                bytes: r#"data: {"choices":[{"delta":{"content":"Hel"#.to_string(),
            },
            MockResponse::Raw {
                bytes: "lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n\ndata: [DONE]\n"
                    .to_string(),
            },
        ])
    }

    /// Some text, then a transport failure.
    pub fn error_mid_stream(text_before: &str, error: &str) -> MockConfig {
        MockConfig::new().with_responses(vec![
            MockResponse::Text {
                content: text_before.to_string(),
            },
            MockResponse::Error {
                message: error.to_string(),
            },
        ])
    }
}

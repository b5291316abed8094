//! ih-backend: Assistant backend access for the Ihumure client.
//!
//! This crate reads the chat function's streamed response into ordered text
//! deltas and provides the HTTP client and a scripted mock behind a common
//! [`ChatBackend`] trait.

pub mod chat;
pub mod mock;
pub mod sse;

pub use chat::{function_url, ChatBackend, ChatClient, ChatError, ChatStream};
pub use mock::{MockBackend, MockConfig, MockResponse};
pub use sse::{parse_delta_stream, DeltaDecoder, DeltaStream, ReaderState, StreamFrame};

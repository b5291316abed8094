//! Incremental reader for streamed chat-completion responses.
//!
//! The upstream sends one record per line:
//!
//! ```text
//! : keep-alive
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Network chunks do not line up with lines, and in rare cases a line does
//! not hold a whole JSON record. [`DeltaDecoder`] buffers raw bytes, only
//! decodes complete lines (so a multi-byte character split across chunks is
//! never mangled) and carries an unparseable payload over to the next chunk
//! instead of dropping it.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use ih_protocol::DeltaEvent;
use serde_json::Value;
use tracing::debug;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// A carried-over fragment larger than this is given up on.
const MAX_CARRY_BYTES: usize = 64 * 1024;

/// A single record extracted from a complete line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// Payload of a `data: ` line with leading whitespace removed.
    Data(String),
    /// The `[DONE]` sentinel.
    Done,
}

/// Lifecycle of one response body. `Streaming -> Done` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Streaming,
    Done,
}

/// Classify one line (already stripped of `\n` and a trailing `\r`).
///
/// Blank lines, `:` comments and lines without the `data: ` prefix carry no
/// frame.
pub fn parse_frame(line: &str) -> Option<StreamFrame> {
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix(DATA_PREFIX)?.trim_start();
    if payload.trim_end() == DONE_SENTINEL {
        Some(StreamFrame::Done)
    } else {
        Some(StreamFrame::Data(payload.to_string()))
    }
}

/// Pull `choices[0].delta.content` out of a parsed record.
fn extract_content(record: &Value) -> Option<&str> {
    record
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
}

/// Lines that stand on their own and therefore cannot be the tail of a
/// record split by a stray line break.
///
/// Any other line that follows a carried fragment is taken as its
/// continuation, so a line without the `data: ` prefix can complete a record
/// in that one position. Outside a carry such lines are always ignored.
fn is_framing_line(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with(':') || line.starts_with("data:")
}

/// Synchronous core of the reader: feed chunks, get ordered deltas back.
#[derive(Debug)]
pub struct DeltaDecoder {
    /// Raw bytes not yet terminated by `\n`.
    buf: Vec<u8>,
    /// Payload that failed to parse, waiting for its continuation.
    carry: Option<String>,
    /// Set after a parse failure; line extraction resumes on the next chunk.
    stalled: bool,
    state: ReaderState,
}

impl Default for DeltaDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            carry: None,
            stalled: false,
            state: ReaderState::Streaming,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ReaderState::Done
    }

    /// Append a chunk and return every delta it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DeltaEvent> {
        if self.is_done() {
            return Vec::new();
        }
        self.buf.extend_from_slice(chunk);
        self.stalled = false;
        self.drain()
    }

    /// Signal end of the transport. Complete lines still waiting behind a
    /// stall are processed; an unterminated tail is discarded.
    pub fn finish(&mut self) -> Vec<DeltaEvent> {
        if self.is_done() {
            return Vec::new();
        }
        self.stalled = false;
        let events = self.drain();

        if !self.buf.is_empty() {
            debug!(bytes = self.buf.len(), "discarding unterminated tail");
            self.buf.clear();
        }
        if let Some(fragment) = self.carry.take() {
            debug!(bytes = fragment.len(), "discarding incomplete record");
        }
        self.state = ReaderState::Done;
        events
    }

    fn drain(&mut self) -> Vec<DeltaEvent> {
        let mut events = Vec::new();
        while !self.stalled && !self.is_done() {
            let Some(line) = self.next_line() else {
                break;
            };
            if let Some(delta) = self.process_line(&line) {
                events.push(delta);
            }
        }
        events
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn process_line(&mut self, line: &str) -> Option<DeltaEvent> {
        if let Some(fragment) = self.carry.take() {
            if !is_framing_line(line) {
                return self.process_payload(fragment + line);
            }
            debug!(bytes = fragment.len(), "dropping record that was never completed");
        }

        match parse_frame(line)? {
            StreamFrame::Done => {
                debug!("received done sentinel");
                self.state = ReaderState::Done;
                self.buf.clear();
                None
            }
            StreamFrame::Data(payload) => self.process_payload(payload),
        }
    }

    fn process_payload(&mut self, payload: String) -> Option<DeltaEvent> {
        match serde_json::from_str::<Value>(&payload) {
            Ok(record) => extract_content(&record).map(DeltaEvent::new),
            Err(e) if payload.len() <= MAX_CARRY_BYTES => {
                debug!(error = %e, "incomplete record, waiting for next chunk");
                self.carry = Some(payload);
                self.stalled = true;
                None
            }
            Err(e) => {
                debug!(error = %e, bytes = payload.len(), "dropping oversized record");
                None
            }
        }
    }
}

/// Stream wrapper that turns a byte stream into text deltas.
pub struct DeltaStream<S> {
    inner: S,
    decoder: DeltaDecoder,
    pending: VecDeque<DeltaEvent>,
    finished: bool,
}

impl<S> DeltaStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: DeltaDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.decoder.state()
    }
}

impl<S, E> Stream for DeltaStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<DeltaEvent, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        loop {
            if let Some(delta) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(delta)));
            }
            if this.finished {
                return Poll::Ready(None);
            }

            // After the sentinel the body is still read to its natural end;
            // the decoder ignores everything it sees.
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.pending.extend(this.decoder.push(&bytes));
                }
                Poll::Ready(Some(Err(_))) if this.decoder.is_done() => {
                    debug!("transport failed after done sentinel, ending stream");
                    this.finished = true;
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.pending.extend(this.decoder.finish());
                    this.finished = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Create a delta stream from a byte stream.
pub fn parse_delta_stream<S, E>(stream: S) -> DeltaStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    DeltaStream::new(stream)
}

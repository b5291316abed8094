//! Assistant conversation: the visible log and the exchange driver.
//!
//! Each [`AssistantSession::send`] appends the user's turn, streams the reply
//! into a trailing assistant turn, and rolls the exchange back out of the log
//! when it fails or is cancelled, so the log never shows partial text as if
//! it were a finished answer.

use futures::StreamExt;
use ih_backend::{ChatBackend, ChatError};
use ih_protocol::ConversationTurn;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Starter prompts offered on an empty conversation.
pub const SUGGESTED_PROMPTS: &[&str] = &[
    "I'm feeling anxious lately",
    "Help me cope with stress",
    "Teach me a breathing technique",
    "I need some encouragement",
];

/// Crisis hotline shown alongside the assistant.
pub const CRISIS_LINE: &str = "114";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl SessionError {
    /// Transient user-facing notification for this failure.
    pub fn notice(&self) -> Notice {
        match self {
            SessionError::EmptyMessage => Notice::new("Nothing to send", "Type a message first."),
            SessionError::Chat(e) => Notice::new("Connection issue", e.to_string()),
        }
    }
}

/// A transient notification, the terminal analogue of a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

/// How an exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Completed,
    Cancelled,
}

/// Ordered turns as shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::user(content));
    }

    /// Append a delta to the trailing assistant turn, starting one if the
    /// last turn is not the assistant's.
    pub fn append_assistant(&mut self, delta: &str) {
        match self.turns.last_mut() {
            Some(turn) if turn.is_assistant() => turn.content.push_str(delta),
            _ => self.turns.push(ConversationTurn::assistant(delta)),
        }
    }

    /// Drop every turn from index `len` on.
    pub fn truncate(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// One conversation with the assistant. `send` takes `&mut self`, so at most
/// one stream is read per session at a time.
pub struct AssistantSession<B> {
    backend: B,
    log: ConversationLog,
}

impl<B: ChatBackend> AssistantSession<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            log: ConversationLog::new(),
        }
    }

    pub fn log(&self) -> &ConversationLog {
        &self.log
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Start a new conversation.
    pub fn reset(&mut self) {
        self.log.clear();
    }

    /// Send `text` and stream the reply into the log.
    ///
    /// `on_delta` sees each fragment right after it lands in the log. On
    /// failure or cancellation the whole exchange is removed from the log.
    pub async fn send<F>(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        mut on_delta: F,
    ) -> Result<ExchangeOutcome, SessionError>
    where
        F: FnMut(&str),
    {
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let mark = self.log.len();
        self.log.push_user(text);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.backend.stream_chat(self.log.turns()) => Some(result),
        };
        let mut stream = match opened {
            None => return Ok(self.cancel_exchange(mark)),
            Some(Ok(stream)) => stream,
            Some(Err(e)) => return Err(self.fail_exchange(mark, e)),
        };

        let mut deltas = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(self.cancel_exchange(mark)),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(delta)) => {
                    deltas += 1;
                    self.log.append_assistant(&delta.text);
                    on_delta(&delta.text);
                }
                Some(Err(e)) => return Err(self.fail_exchange(mark, e)),
                None => break,
            }
        }

        debug!(state = ?stream.state(), "reader finished");
        info!(deltas, "exchange completed");
        Ok(ExchangeOutcome::Completed)
    }

    fn cancel_exchange(&mut self, mark: usize) -> ExchangeOutcome {
        info!("exchange cancelled");
        self.log.truncate(mark);
        ExchangeOutcome::Cancelled
    }

    fn fail_exchange(&mut self, mark: usize, error: ChatError) -> SessionError {
        warn!(error = %error, "exchange failed, rolling back");
        self.log.truncate(mark);
        SessionError::Chat(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ih_backend::mock::fixtures;
    use ih_backend::{MockBackend, MockConfig, MockResponse};
    use ih_protocol::Role;

    async fn send_collect(
        session: &mut AssistantSession<MockBackend>,
        text: &str,
    ) -> (Result<ExchangeOutcome, SessionError>, Vec<String>) {
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let result = session
            .send(text, &cancel, |delta| seen.push(delta.to_string()))
            .await;
        (result, seen)
    }

    #[test]
    fn log_appends_to_trailing_assistant_turn() {
        let mut log = ConversationLog::new();
        log.push_user("hi");
        log.append_assistant("Hel");
        log.append_assistant("lo");

        assert_eq!(log.len(), 2);
        assert_eq!(log.last().unwrap(), &ConversationTurn::assistant("Hello"));
    }

    #[test]
    fn log_starts_new_assistant_turn_after_user() {
        let mut log = ConversationLog::new();
        log.append_assistant("first");
        log.push_user("question");
        log.append_assistant("second");

        let roles: Vec<Role> = log.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn completed_exchange_folds_deltas_into_one_turn() {
        let mut session = AssistantSession::new(MockBackend::streaming(fixtures::split_record()));

        let (result, seen) = send_collect(&mut session, "  hi  ").await;

        assert_eq!(result.unwrap(), ExchangeOutcome::Completed);
        assert_eq!(seen, vec!["Hello", " there"]);
        assert_eq!(
            session.log().turns(),
            &[ConversationTurn::user("hi"), ConversationTurn::assistant("Hello there")]
        );
    }

    #[tokio::test]
    async fn request_carries_whole_conversation() {
        let backend = MockBackend::streaming(fixtures::streaming_text(&["Breathe in."]));
        let mut session = AssistantSession::new(backend.clone());

        send_collect(&mut session, "Teach me a breathing technique").await.0.unwrap();
        send_collect(&mut session, "Again").await.0.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(
            requests[1].messages,
            vec![
                ConversationTurn::user("Teach me a breathing technique"),
                ConversationTurn::assistant("Breathe in."),
                ConversationTurn::user("Again"),
            ]
        );
    }

    #[tokio::test]
    async fn failed_request_rolls_back_user_turn() {
        let mut session =
            AssistantSession::new(MockBackend::failing(500, r#"{"error":"rate limited"}"#));

        let (result, seen) = send_collect(&mut session, "hello").await;

        let err = result.unwrap_err();
        assert!(seen.is_empty());
        assert!(session.log().is_empty());

        let notice = err.notice();
        assert_eq!(notice.title, "Connection issue");
        assert!(notice.description.contains("rate limited"));
    }

    #[tokio::test]
    async fn failure_keeps_earlier_exchanges() {
        let backend = MockBackend::streaming(fixtures::streaming_text(&["ok"]))
            .then_failing(502, "");
        let mut session = AssistantSession::new(backend);

        send_collect(&mut session, "first").await.0.unwrap();
        let (result, _) = send_collect(&mut session, "second").await;

        assert!(result.is_err());
        assert_eq!(
            session.log().turns(),
            &[ConversationTurn::user("first"), ConversationTurn::assistant("ok")]
        );
    }

    #[tokio::test]
    async fn mid_stream_failure_removes_partial_reply() {
        let backend = MockBackend::streaming(fixtures::error_mid_stream("I hear", "reset"));
        let mut session = AssistantSession::new(backend);

        let (result, seen) = send_collect(&mut session, "hello").await;

        assert!(matches!(result, Err(SessionError::Chat(ChatError::Stream(_)))));
        assert_eq!(seen, vec!["I hear"]);
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn transport_error_after_sentinel_keeps_finished_reply() {
        let config = MockConfig::new().with_responses(vec![
            MockResponse::Text {
                content: "You are safe.".to_string(),
            },
            MockResponse::Done,
            MockResponse::Error {
                message: "connection reset".to_string(),
            },
        ]);
        let mut session = AssistantSession::new(MockBackend::streaming(config));

        let (result, seen) = send_collect(&mut session, "hello").await;

        assert_eq!(result.unwrap(), ExchangeOutcome::Completed);
        assert_eq!(seen, vec!["You are safe."]);
        assert_eq!(
            session.log().turns(),
            &[ConversationTurn::user("hello"), ConversationTurn::assistant("You are safe.")]
        );
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_request() {
        let backend = MockBackend::streaming(fixtures::streaming_text(&["x"]));
        let mut session = AssistantSession::new(backend.clone());

        let (result, _) = send_collect(&mut session, "   \n").await;

        assert!(matches!(result, Err(SessionError::EmptyMessage)));
        assert!(backend.requests().is_empty());
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn cancelled_before_send_leaves_log_untouched() {
        let mut session = AssistantSession::new(MockBackend::streaming(fixtures::streaming_text(&["x"])));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = session.send("hi", &cancel, |_| {}).await.unwrap();

        assert_eq!(outcome, ExchangeOutcome::Cancelled);
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn cancellation_stops_further_updates() {
        let config = MockConfig::new().with_responses(vec![
            MockResponse::Text {
                content: "one".to_string(),
            },
            MockResponse::Delay { ms: 10_000 },
            MockResponse::Text {
                content: "two".to_string(),
            },
            MockResponse::Done,
        ]);
        let mut session = AssistantSession::new(MockBackend::streaming(config));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        let mut seen = Vec::new();
        let outcome = session
            .send("hi", &cancel, |delta| {
                seen.push(delta.to_string());
                trigger.cancel();
            })
            .await
            .unwrap();

        assert_eq!(outcome, ExchangeOutcome::Cancelled);
        assert_eq!(seen, vec!["one"]);
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn reset_clears_log() {
        let mut session = AssistantSession::new(MockBackend::streaming(fixtures::streaming_text(&["ok"])));
        send_collect(&mut session, "hi").await.0.unwrap();
        assert_eq!(session.log().len(), 2);

        session.reset();
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn stream_without_deltas_adds_no_assistant_turn() {
        let config = MockConfig::new().with_responses(vec![
            MockResponse::Comment {
                text: "keep-alive".to_string(),
            },
            MockResponse::Done,
        ]);
        let mut session = AssistantSession::new(MockBackend::streaming(config));

        let (result, seen) = send_collect(&mut session, "hi").await;

        assert_eq!(result.unwrap(), ExchangeOutcome::Completed);
        assert!(seen.is_empty());
        assert_eq!(session.log().turns(), &[ConversationTurn::user("hi")]);
    }
}

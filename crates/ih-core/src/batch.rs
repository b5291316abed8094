//! Non-interactive one-shot mode.
//!
//! Ask a single question, stream the answer to stdout as it arrives, and
//! exit. Status and failures go to stderr so the answer can be piped.

use std::io::{IsTerminal, Write};

use ih_backend::ChatBackend;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::assistant::{AssistantSession, ExchangeOutcome, Notice};
use crate::config::Config;

/// Exit code after Ctrl-C, as shells report it.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Stderr side of one-shot mode.
///
/// On a TTY the waiting indicator is a single line cleared by the first
/// delta; elsewhere nothing is printed until there is a failure.
pub struct BatchOutput<W: Write> {
    writer: W,
    is_tty: bool,
    waiting: bool,
}

impl<W: Write> BatchOutput<W> {
    pub fn new(writer: W, is_tty: bool) -> Self {
        Self {
            writer,
            is_tty,
            waiting: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    pub fn emit_waiting(&mut self) {
        if self.is_tty {
            let _ = write!(self.writer, "\r\x1b[K\x1b[2mthinking...\x1b[0m");
            let _ = self.writer.flush();
            self.waiting = true;
        }
    }

    pub fn clear_waiting(&mut self) {
        if self.waiting {
            let _ = write!(self.writer, "\r\x1b[K");
            let _ = self.writer.flush();
            self.waiting = false;
        }
    }

    pub fn emit_notice(&mut self, notice: &Notice) {
        self.clear_waiting();
        if self.is_tty {
            let _ = writeln!(
                self.writer,
                "\x1b[31m{}\x1b[0m: {}",
                notice.title, notice.description
            );
        } else {
            let _ = writeln!(self.writer, "{notice}");
        }
    }
}

/// Stream one answer from `session` into `stdout`. Returns the exit code.
pub async fn answer<B, O, E>(
    session: &mut AssistantSession<B>,
    question: &str,
    cancel: &CancellationToken,
    stdout: &mut O,
    output: &mut BatchOutput<E>,
) -> i32
where
    B: ChatBackend,
    O: Write,
    E: Write,
{
    output.emit_waiting();
    let result = session
        .send(question, cancel, |delta| {
            output.clear_waiting();
            let _ = stdout.write_all(delta.as_bytes());
            let _ = stdout.flush();
        })
        .await;

    match result {
        Ok(ExchangeOutcome::Completed) => {
            output.clear_waiting();
            if session.log().last().is_some_and(|t| t.is_assistant()) {
                let _ = writeln!(stdout);
            }
            0
        }
        Ok(ExchangeOutcome::Cancelled) => {
            output.emit_notice(&Notice::new("Cancelled", "the answer was interrupted"));
            EXIT_INTERRUPTED
        }
        Err(e) => {
            warn!(error = %e, "one-shot request failed");
            output.emit_notice(&e.notice());
            1
        }
    }
}

/// One-shot entry point used by the binary.
pub async fn run_batch(config: &Config, question: &str) -> i32 {
    let is_tty = std::io::stderr().is_terminal();
    let mut output = BatchOutput::new(std::io::stderr(), is_tty);

    let client = match config.chat_client() {
        Ok(client) => client,
        Err(e) => {
            output.emit_notice(&Notice::new("Not configured", e.to_string()));
            return 1;
        }
    };

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let mut session = AssistantSession::new(client);
    let mut stdout = std::io::stdout();
    let code = answer(&mut session, question, &cancel, &mut stdout, &mut output).await;
    watcher.abort();
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use ih_backend::mock::fixtures;
    use ih_backend::MockBackend;

    async fn run(backend: MockBackend, is_tty: bool) -> (i32, String, String) {
        let mut session = AssistantSession::new(backend);
        let mut stdout = Vec::new();
        let mut output = BatchOutput::new(Vec::new(), is_tty);
        let code = answer(
            &mut session,
            "How do I calm down?",
            &CancellationToken::new(),
            &mut stdout,
            &mut output,
        )
        .await;
        (
            code,
            String::from_utf8(stdout).unwrap(),
            String::from_utf8(output.into_inner()).unwrap(),
        )
    }

    #[tokio::test]
    async fn answer_goes_to_stdout() {
        let backend = MockBackend::streaming(fixtures::streaming_text(&["Slow ", "breaths."]));
        let (code, stdout, stderr) = run(backend, false).await;

        assert_eq!(code, 0);
        assert_eq!(stdout, "Slow breaths.\n");
        assert!(stderr.is_empty());
    }

    #[tokio::test]
    async fn failure_prints_notice_and_exits_1() {
        let backend = MockBackend::failing(500, r#"{"error":"rate limited"}"#);
        let (code, stdout, stderr) = run(backend, false).await;

        assert_eq!(code, 1);
        assert!(stdout.is_empty());
        assert_eq!(stderr, "Connection issue: rate limited\n");
    }

    #[tokio::test]
    async fn tty_waiting_line_is_cleared() {
        let backend = MockBackend::streaming(fixtures::streaming_text(&["ok"]));
        let (code, stdout, stderr) = run(backend, true).await;

        assert_eq!(code, 0);
        assert_eq!(stdout, "ok\n");
        assert!(stderr.contains("thinking..."));
        assert!(stderr.ends_with("\r\x1b[K"));
    }

    #[tokio::test]
    async fn cancelled_answer_exits_interrupted() {
        let mut session =
            AssistantSession::new(MockBackend::streaming(fixtures::streaming_text(&["x"])));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut stdout = Vec::new();
        let mut output = BatchOutput::new(Vec::new(), false);

        let code = answer(&mut session, "hi", &cancel, &mut stdout, &mut output).await;

        assert_eq!(code, EXIT_INTERRUPTED);
        assert!(stdout.is_empty());
        let stderr = String::from_utf8(output.into_inner()).unwrap();
        assert!(stderr.starts_with("Cancelled"));
    }

    #[tokio::test]
    async fn empty_answer_prints_nothing() {
        let backend = MockBackend::streaming(fixtures::streaming_text(&[]));
        let (code, stdout, _) = run(backend, false).await;

        assert_eq!(code, 0);
        assert!(stdout.is_empty());
    }
}

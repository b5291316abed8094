//! Interactive line REPL for the assistant.
//!
//! Each input line is either a slash command or a message. Replies stream
//! onto the terminal as they arrive; Ctrl-C cancels the reply in flight and
//! leaves the conversation as it was before the message.

use std::io::{self, Write};

use ih_backend::ChatBackend;
use ih_protocol::ROOM_CATALOG;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::assistant::{AssistantSession, ExchangeOutcome, CRISIS_LINE, SUGGESTED_PROMPTS};
use crate::style::Style;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    New,
    Prompts,
    Rooms,
    Help,
    Quit,
    Unknown(String),
}

impl ReplCommand {
    /// Parse a slash command. `None` means the line is a message.
    pub fn parse(line: &str) -> Option<Self> {
        let word = line.trim().strip_prefix('/')?.split_whitespace().next()?;
        Some(match word {
            "new" => ReplCommand::New,
            "prompts" => ReplCommand::Prompts,
            "rooms" => ReplCommand::Rooms,
            "help" => ReplCommand::Help,
            "quit" | "exit" => ReplCommand::Quit,
            other => ReplCommand::Unknown(other.to_string()),
        })
    }
}

/// Expand `/1`..`/4` style shortcuts into the matching suggested prompt.
fn suggested_prompt(line: &str) -> Option<&'static str> {
    let n: usize = line.trim().strip_prefix('/')?.parse().ok()?;
    SUGGESTED_PROMPTS.get(n.checked_sub(1)?).copied()
}

pub struct Repl<B> {
    session: AssistantSession<B>,
    style: Style,
    catch_interrupt: bool,
}

impl<B: ChatBackend> Repl<B> {
    pub fn new(session: AssistantSession<B>, style: Style) -> Self {
        Self {
            session,
            style,
            catch_interrupt: true,
        }
    }

    /// Leave SIGINT alone; replies can then only end on their own.
    pub fn without_interrupt_handler(mut self) -> Self {
        self.catch_interrupt = false;
        self
    }

    pub fn session(&self) -> &AssistantSession<B> {
        &self.session
    }

    /// Run until `/quit` or end of input.
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        self.banner(out)?;
        let mut lines = input.lines();

        loop {
            write!(out, "{}you>{} ", self.style.bold(), self.style.reset())?;
            out.flush()?;

            let Some(line) = lines.next_line().await? else {
                writeln!(out)?;
                return Ok(());
            };

            let message = match suggested_prompt(&line) {
                Some(prompt) => prompt,
                None => match ReplCommand::parse(&line) {
                    Some(ReplCommand::Quit) => return Ok(()),
                    Some(command) => {
                        self.handle_command(&command, out)?;
                        continue;
                    }
                    None => line.as_str(),
                },
            };
            if message.trim().is_empty() {
                continue;
            }
            self.exchange(message, out).await?;
        }
    }

    fn banner<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "{}Ihumure{} mental health assistant. Crisis line: {}",
            self.style.bold(),
            self.style.reset(),
            CRISIS_LINE
        )?;
        writeln!(
            out,
            "{}",
            self.style
                .hint("Type a message, /prompts for ideas, /help for commands.")
        )
    }

    fn handle_command<W: Write>(&mut self, command: &ReplCommand, out: &mut W) -> io::Result<()> {
        match command {
            ReplCommand::New => {
                self.session.reset();
                writeln!(out, "{}", self.style.hint("Started a new conversation."))
            }
            ReplCommand::Prompts => {
                for (i, prompt) in SUGGESTED_PROMPTS.iter().enumerate() {
                    writeln!(out, "  /{} {}", i + 1, prompt)?;
                }
                Ok(())
            }
            ReplCommand::Rooms => {
                for room in ROOM_CATALOG {
                    writeln!(out, "  {:<10} {}", room.id, room.name)?;
                }
                Ok(())
            }
            ReplCommand::Help => {
                writeln!(out, "  /new      start a new conversation")?;
                writeln!(out, "  /prompts  list suggested prompts (send one with /1../4)")?;
                writeln!(out, "  /rooms    list peer-support rooms")?;
                writeln!(out, "  /quit     exit (Ctrl-D works too)")?;
                writeln!(out, "  Ctrl-C    stop the reply being written")
            }
            ReplCommand::Quit => Ok(()),
            ReplCommand::Unknown(name) => writeln!(
                out,
                "{}",
                self.style.hint(&format!("Unknown command /{name}; try /help."))
            ),
        }
    }

    async fn exchange<W: Write>(&mut self, message: &str, out: &mut W) -> io::Result<()> {
        let cancel = CancellationToken::new();
        let watcher = self.catch_interrupt.then(|| {
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    trigger.cancel();
                }
            })
        });

        write!(out, "{}", self.style.assistant_label())?;
        out.flush()?;

        let mut write_error = None;
        let result = self
            .session
            .send(message, &cancel, |delta| {
                if write_error.is_none() {
                    if let Err(e) = out.write_all(delta.as_bytes()).and_then(|_| out.flush()) {
                        write_error = Some(e);
                    }
                }
            })
            .await;

        if let Some(watcher) = watcher {
            watcher.abort();
        }
        if let Some(e) = write_error {
            return Err(e);
        }

        match result {
            Ok(ExchangeOutcome::Completed) => writeln!(out),
            Ok(ExchangeOutcome::Cancelled) => {
                debug!("reply interrupted");
                writeln!(out)?;
                writeln!(out, "{}", self.style.hint("(stopped)"))
            }
            Err(e) => {
                writeln!(out)?;
                writeln!(out, "{}", self.style.notice(&e.notice()))
            }
        }
    }
}

/// Run the REPL on the process's stdin and stdout.
pub async fn run_repl<B: ChatBackend>(session: AssistantSession<B>) -> io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    Repl::new(session, Style::new()).run(stdin, &mut stdout).await
}

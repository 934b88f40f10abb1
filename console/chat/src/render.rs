//! Plain-text rendering of console messages
//!
//! A terminal cannot insert lines above text it already printed, so the
//! narration of the message in progress is held back while its tool records
//! print as they arrive. The narration follows once the message completes,
//! fails or the console returns to Ready.

use std::io::{self, Write};

use console_core::{ApprovalClearReason, ConsoleMessage, ConsoleState, NotifyLevel};
use tokio::sync::mpsc;

/// Print messages from the engine until the channel closes
pub async fn run(mut rx: mpsc::Receiver<ConsoleMessage>) {
    let mut renderer = Renderer::new(io::stdout(), io::stderr());
    while let Some(msg) = rx.recv().await {
        if let Err(e) = renderer.render(msg) {
            tracing::debug!(error = %e, "Failed to write to the terminal");
        }
    }
}

/// Writes console messages to an output and an error stream
pub struct Renderer<O, E> {
    out: O,
    err: E,
    /// Narration of the message in progress, not yet printed
    narration: String,
}

impl<O: Write, E: Write> Renderer<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            narration: String::new(),
        }
    }

    pub fn render(&mut self, msg: ConsoleMessage) -> io::Result<()> {
        match msg {
            ConsoleMessage::UserMessage { .. } => {}
            ConsoleMessage::TextDelta { text, .. } => self.narration.push_str(&text),
            ConsoleMessage::ToolExecution { record, .. } => {
                let status = if record.is_error { "failed" } else { "ok" };
                writeln!(self.out, "\n[{}] {} ({status})", record.tool, record.command)?;
            }
            ConsoleMessage::MessageComplete { .. } => {
                self.flush_narration()?;
                writeln!(self.out)?;
            }
            ConsoleMessage::TurnFailed {
                error, guidance, ..
            } => {
                self.flush_narration()?;
                writeln!(self.err, "\nerror: {error}")?;
                if let Some(guidance) = guidance {
                    writeln!(self.err, "hint: {guidance}")?;
                }
            }
            ConsoleMessage::SessionAssigned { session_id } => {
                tracing::debug!(session_id = %session_id, "Session assigned");
            }
            ConsoleMessage::ConversationReset => {
                self.narration.clear();
                writeln!(self.out, "Started a new conversation.")?;
            }
            ConsoleMessage::ApprovalRequested { request } => {
                writeln!(
                    self.out,
                    "\n? {} wants to run ({}): {}",
                    request.tool_name, request.category, request.command
                )?;
                write!(self.out, "  Approve? [Y/n] ")?;
            }
            ConsoleMessage::ApprovalCleared { reason, .. } => match reason {
                ApprovalClearReason::Resolved { approved: true } => {
                    writeln!(self.out, "  approved")?;
                }
                ApprovalClearReason::Resolved { approved: false } => {
                    writeln!(self.out, "  denied")?;
                }
                ApprovalClearReason::Replaced => {
                    writeln!(self.out, "  superseded by a newer request")?;
                }
                ApprovalClearReason::Expired => writeln!(self.out, "\n  approval timed out")?,
                ApprovalClearReason::Dismissed => {}
            },
            ConsoleMessage::RefreshRequested { resources } => {
                writeln!(self.out, "(changed: {})", resources.join(", "))?;
            }
            ConsoleMessage::State { state } => match state {
                ConsoleState::Thinking => write!(self.out, "{} ", state.description())?,
                // Cancelled turns end here without a MessageComplete
                ConsoleState::Ready => self.flush_narration()?,
                ConsoleState::Responding => {}
            },
            ConsoleMessage::Notify {
                level,
                title,
                message,
            } => {
                let tag = match level {
                    NotifyLevel::Warning => "warning",
                    NotifyLevel::Error => "error",
                };
                writeln!(self.err, "\n{tag}: {title}: {message}")?;
            }
        }
        self.out.flush()
    }

    fn flush_narration(&mut self) -> io::Result<()> {
        if self.narration.is_empty() {
            return Ok(());
        }
        let narration = std::mem::take(&mut self.narration);
        write!(self.out, "{narration}")
    }
}

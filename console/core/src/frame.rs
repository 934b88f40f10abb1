//! Stream Frame Decoder
//!
//! Incremental decoder for the agent's line-oriented event stream.
//!
//! # Wire Format
//!
//! ```text
//! event: session\n                      <- optional, tags the next data line
//! data: {"session_id":"abc"}\n          <- one frame
//! data: Hello \n                        <- untagged frame, defaults to text
//! data: [DONE]\n                        <- terminates the stream
//! ```
//!
//! Bytes may arrive split at any offset, including inside a multi-byte UTF-8
//! sequence. Lines are cut at the byte level and decoded only once complete,
//! so the output is independent of how the input was chunked.

use std::borrow::Cow;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Payload that terminates a stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Event type carried by an `event:` line
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Conversational text (also the default for untagged data lines)
    Text,
    /// Backend-assigned session identifier
    Session,
    /// Tool execution audit record
    ToolExecution,
    /// Human approval request
    Approval,
    /// Backend stopped waiting for an approval
    ApprovalTimeout,
    /// Any other event name
    Unknown(String),
}

impl EventType {
    /// Parse an event name as it appears after `event:`
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "" | "text" | "message" => Self::Text,
            "session" => Self::Session,
            "tool_execution" => Self::ToolExecution,
            "approval" => Self::Approval,
            "approval_timeout" => Self::ApprovalTimeout,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Session => "session",
            Self::ToolExecution => "tool_execution",
            Self::Approval => "approval",
            Self::ApprovalTimeout => "approval_timeout",
            Self::Unknown(name) => name,
        }
    }
}

/// One decoded `(event type, payload)` unit
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFrame {
    /// Tag from the preceding `event:` line, `Text` when absent
    pub event_type: EventType,
    /// Everything after `data:` minus one optional leading space
    pub payload: String,
}

impl StreamFrame {
    /// Build a frame
    pub fn new(event_type: EventType, payload: impl Into<String>) -> Self {
        Self {
            event_type,
            payload: payload.into(),
        }
    }

    /// Payload with escaped newlines (`\` + `n`) restored
    ///
    /// The backend escapes newlines inside text so each chunk fits on one
    /// `data:` line.
    #[must_use]
    pub fn text_delta(&self) -> Cow<'_, str> {
        unescape_newlines(&self.payload)
    }
}

/// Restore `\n` escape sequences to real newlines
#[must_use]
pub fn unescape_newlines(payload: &str) -> Cow<'_, str> {
    if payload.contains("\\n") {
        Cow::Owned(payload.replace("\\n", "\n"))
    } else {
        Cow::Borrowed(payload)
    }
}

/// Output of one decode step
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame
    Frame(StreamFrame),
    /// The `[DONE]` sentinel; nothing follows
    Done,
}

/// Incremental line scanner
///
/// Holds a byte buffer, a read position and the current event-type register.
/// Feed bytes with [`push`](Self::push) and pull frames with
/// [`decode`](Self::decode) until it returns `None`.
#[derive(Debug)]
pub struct StreamFrameDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
    /// Set by `event:`, cleared after the next data frame
    current_event: Option<EventType>,
    done: bool,
}

impl Default for StreamFrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFrameDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            current_event: None,
            done: false,
        }
    }

    /// Append bytes to the buffer
    ///
    /// Ignored once the stream has terminated.
    pub fn push(&mut self, data: &[u8]) {
        if self.done {
            return;
        }
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Get the number of unconsumed bytes in the buffer
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Whether `[DONE]` has been seen
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Try to decode the next frame
    ///
    /// Returns `None` when more bytes are needed or the stream has terminated.
    pub fn decode(&mut self) -> Option<Decoded> {
        while !self.done {
            let pending = &self.buffer[self.read_pos..];
            let newline = pending.iter().position(|&b| b == b'\n')?;

            let line_end = self.read_pos + newline;
            let line = strip_cr(&self.buffer[self.read_pos..line_end]).to_vec();
            self.read_pos = line_end + 1;

            if let Some(decoded) = self.handle_line(&line) {
                return Some(decoded);
            }
        }
        None
    }

    /// Flush an unterminated trailing line at end of stream
    ///
    /// A trailing `data:` line decodes normally. Any other non-empty content
    /// becomes a frame tagged with the current event type.
    pub fn finish(&mut self) -> Option<Decoded> {
        if let Some(decoded) = self.decode() {
            return Some(decoded);
        }
        if self.done || self.available() == 0 {
            return None;
        }

        let line = strip_cr(&self.buffer[self.read_pos..]).to_vec();
        self.read_pos = self.buffer.len();

        if let Some(decoded) = self.handle_line(&line) {
            return Some(decoded);
        }

        let text = String::from_utf8_lossy(&line);
        if text.trim().is_empty() || text.starts_with(':') || text.starts_with("event:") {
            return None;
        }

        tracing::debug!(bytes = line.len(), "Flushing unterminated trailing line");
        let event_type = self.current_event.take().unwrap_or(EventType::Text);
        Some(Decoded::Frame(StreamFrame::new(event_type, text.into_owned())))
    }

    fn handle_line(&mut self, line: &[u8]) -> Option<Decoded> {
        if let Some(name) = line.strip_prefix(b"event:") {
            let name = String::from_utf8_lossy(name);
            self.current_event = Some(EventType::parse(name.trim()));
            return None;
        }

        let data = line.strip_prefix(b"data:")?;
        let data = data.strip_prefix(b" ").unwrap_or(data);
        let payload = String::from_utf8_lossy(data).into_owned();

        if payload == DONE_SENTINEL {
            self.done = true;
            self.current_event = None;
            self.buffer.clear();
            self.read_pos = 0;
            return Some(Decoded::Done);
        }

        let event_type = self.current_event.take().unwrap_or(EventType::Text);
        Some(Decoded::Frame(StreamFrame::new(event_type, payload)))
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

//! Console Messages
//!
//! Messages sent from the core to the host surface. These represent every way
//! the protocol handler communicates with whatever renders the conversation
//! (the line-oriented CLI, a TUI, a web view).
//!
//! The host is a pure renderer: it displays what it is told and calls back
//! into the core only to confirm a risky message or resolve an approval.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::Message;
use crate::protocol::{ApprovalRequest, ToolExecutionRecord};

/// Messages from the core to the host surface
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConsoleMessage {
    // ============================================
    // Conversation Messages
    // ============================================
    /// The user's message was accepted and is being sent
    UserMessage {
        /// Message id
        id: MessageId,
        /// Message text
        text: String,
    },

    /// Text appended to the in-progress assistant message
    TextDelta {
        /// Assistant message this delta belongs to
        message_id: MessageId,
        /// Unescaped text
        text: String,
    },

    /// A tool ran on the agent side
    ///
    /// Belongs ahead of all narration of the same message, including text
    /// already delivered through `TextDelta`.
    ToolExecution {
        /// Assistant message the record belongs to
        message_id: MessageId,
        /// Audit record
        record: ToolExecutionRecord,
    },

    /// Assistant message finalized
    MessageComplete {
        /// The finalized message, tool records included
        message: Message,
    },

    /// Turn failed before completion
    TurnFailed {
        /// Assistant message that was in progress, if the stream had started
        message_id: Option<MessageId>,
        /// Error description
        error: String,
        /// What the user can do about it
        guidance: Option<String>,
    },

    // ============================================
    // Session Messages
    // ============================================
    /// Backend assigned (or re-confirmed) the session id
    SessionAssigned {
        /// Session identifier
        session_id: String,
    },

    /// Session id and history were cleared
    ConversationReset,

    // ============================================
    // Approval Messages
    // ============================================
    /// A tool call is waiting for the user's decision
    ApprovalRequested {
        /// The pending request
        request: ApprovalRequest,
    },

    /// The pending approval is gone
    ApprovalCleared {
        /// Id of the cleared request
        id: String,
        /// Why it was cleared
        reason: ApprovalClearReason,
    },

    // ============================================
    // Host Directives
    // ============================================
    /// Resources changed; views showing them should reload
    RefreshRequested {
        /// Resource references taken from mutating tool commands
        resources: Vec<String>,
    },

    /// Operational state changed
    State {
        /// The new state
        state: ConsoleState,
    },

    /// Show a notification
    Notify {
        /// Severity level
        level: NotifyLevel,
        /// Title
        title: String,
        /// Body
        message: String,
    },
}

/// Why a pending approval was cleared
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalClearReason {
    /// User answered it
    Resolved {
        /// The decision
        approved: bool,
    },
    /// A newer request took its slot
    Replaced,
    /// Backend stopped waiting
    Expired,
    /// Turn ended or conversation reset
    Dismissed,
}

/// Unique message identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Generate a new random message id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Agent response
    Assistant,
}

/// Notification levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Something was skipped but the conversation continues
    Warning,
    /// An action the user took had no effect
    Error,
}

/// Console operational states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsoleState {
    /// Ready for input
    Ready,
    /// Turn sent, waiting for the first frame
    Thinking,
    /// Frames are arriving
    Responding,
}

impl ConsoleState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Thinking => "Thinking...",
            Self::Responding => "Responding...",
        }
    }
}

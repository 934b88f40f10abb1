//! Conversation State
//!
//! The active session: the backend-assigned id plus the ordered list of
//! finalized messages. Owned by the engine; an in-progress assistant message
//! lives in a [`MessageDraft`] and only joins the history once finalized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::{MessageId, MessageRole};
use crate::protocol::ToolExecutionRecord;

/// A finalized message in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message text
    pub text: String,
    /// When the message was created
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Tools the agent ran while producing this message, in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_executions: Vec<ToolExecutionRecord>,
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::User,
            text: text.into(),
            created_at: Utc::now(),
            tool_executions: Vec::new(),
        }
    }

    /// Creation time as Unix milliseconds
    #[must_use]
    pub fn created_at_ms(&self) -> i64 {
        self.created_at.timestamp_millis()
    }
}

/// Assistant message being assembled from stream frames
#[derive(Clone, Debug)]
pub struct MessageDraft {
    id: MessageId,
    created_at: DateTime<Utc>,
    text: String,
    tool_executions: Vec<ToolExecutionRecord>,
}

impl Default for MessageDraft {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageDraft {
    /// Start an empty assistant message
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: MessageId::new(),
            created_at: Utc::now(),
            text: String::new(),
            tool_executions: Vec::new(),
        }
    }

    /// Id the finalized message will carry
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Append a text delta
    pub fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// Record a tool execution
    pub fn push_tool_execution(&mut self, record: ToolExecutionRecord) {
        self.tool_executions.push(record);
    }

    /// Freeze into an immutable message
    #[must_use]
    pub fn finish(self) -> Message {
        Message {
            id: self.id,
            role: MessageRole::Assistant,
            text: self.text,
            created_at: self.created_at,
            tool_executions: self.tool_executions,
        }
    }
}

/// The single active conversation
#[derive(Clone, Debug, Default)]
pub struct ConversationSession {
    /// Backend-assigned session id
    id: Option<String>,
    /// Finalized messages, oldest first
    messages: Vec<Message>,
    /// Maximum number of messages to keep (0 = unlimited)
    max_messages: usize,
}

impl ConversationSession {
    /// Create a session, optionally resuming a stored id
    #[must_use]
    pub fn new(id: Option<String>) -> Self {
        Self {
            id,
            messages: Vec::new(),
            max_messages: 0,
        }
    }

    /// Keep at most `max_messages` in memory (0 = unlimited)
    #[must_use]
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Backend-assigned session id
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Replace the session id
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Finalized messages, oldest first
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Append a finalized message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.trim_if_needed();
    }

    /// Forget the id and all messages
    pub fn reset(&mut self) {
        self.id = None;
        self.messages.clear();
    }

    fn trim_if_needed(&mut self) {
        if self.max_messages > 0 && self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(command: &str) -> ToolExecutionRecord {
        ToolExecutionRecord {
            tool: "kubectl".to_string(),
            command: command.to_string(),
            result: String::new(),
            is_error: false,
        }
    }

    #[test]
    fn test_draft_accumulates_in_order() {
        let mut draft = MessageDraft::new();
        let id = draft.id();
        draft.push_tool_execution(record("kubectl get pods"));
        draft.append("Hello ");
        draft.push_tool_execution(record("kubectl get svc"));
        draft.append("world");

        let message = draft.finish();
        assert_eq!(message.id, id);
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.text, "Hello world");
        assert_eq!(message.tool_executions.len(), 2);
        assert_eq!(message.tool_executions[1].command, "kubectl get svc");
    }

    #[test]
    fn test_user_message_has_no_tools() {
        let message = Message::user("hi");
        assert_eq!(message.role, MessageRole::User);
        assert!(message.tool_executions.is_empty());
        assert!(message.created_at_ms() > 0);
    }

    #[test]
    fn test_session_reset() {
        let mut session = ConversationSession::new(Some("abc".to_string()));
        session.push(Message::user("one"));
        assert_eq!(session.id(), Some("abc"));

        session.reset();
        assert_eq!(session.id(), None);
        assert!(session.messages().is_empty());
    }

    #[test]
    fn test_session_max_messages() {
        let mut session = ConversationSession::new(None).with_max_messages(2);
        for text in ["a", "b", "c"] {
            session.push(Message::user(text));
        }
        let texts: Vec<_> = session.messages().iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "c"]);
    }

    #[test]
    fn test_message_serializes_timestamp_as_millis() {
        let message = Message::user("x");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["created_at"], message.created_at_ms());
        assert_eq!(json["role"], "user");
        assert!(json.get("tool_executions").is_none());
    }
}

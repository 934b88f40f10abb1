//! Agent Protocol
//!
//! Wire types exchanged with the agent service, and the classification of
//! decoded stream frames into [`AgentFrame`]s.
//!
//! # Fallback Rule
//!
//! | Frame tag                  | Payload parses           | Result                       |
//! |----------------------------|--------------------------|------------------------------|
//! | `session`                  | `{session_id}`           | `Session`                    |
//! | `tool_execution`           | `{tool, command, ...}`   | `ToolExecution`              |
//! | `approval`                 | `{id, tool_name, ...}`   | `Approval`                   |
//! | any of the three above     | no                       | `Text(unescaped payload)`    |
//! | `approval_timeout`         | id (raw or JSON string)  | `ApprovalTimeout`            |
//! | `text` / untagged          | shape recognised         | recognised variant           |
//! | `text` / untagged          | no                       | `Text(unescaped payload)`    |
//! | unknown name               | shape recognised         | recognised variant           |
//! | unknown name               | no                       | `Unrecognized`               |
//!
//! Shape recognition looks at JSON objects only: `type == "approval_required"` means
//! an approval, `tool` + `command` means a tool execution, a `session_id`
//! means a session assignment.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::frame::{EventType, StreamFrame};

/// Body of an agent turn request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    /// User message text
    pub message: String,
    /// Session to continue, absent on first contact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Preferred response language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Audit record for one tool the agent ran
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    /// Tool name (e.g. `kubectl`)
    pub tool: String,
    /// Command line as executed
    pub command: String,
    /// Captured output
    #[serde(default)]
    pub result: String,
    /// Whether the tool reported failure
    #[serde(default)]
    pub is_error: bool,
}

impl ToolExecutionRecord {
    /// Positional arguments of the command, tool name and flags removed
    ///
    /// `kubectl -n prod scale deploy/api --replicas=2` yields
    /// `["scale", "deploy/api"]`.
    #[must_use]
    pub fn arguments(&self) -> Vec<&str> {
        let mut words = self.command.split_whitespace().peekable();
        if words
            .peek()
            .is_some_and(|first| *first == self.tool || first.ends_with("kubectl"))
        {
            words.next();
        }

        let mut args = Vec::new();
        while let Some(word) = words.next() {
            if word.starts_with('-') {
                if !word.contains('=') && VALUE_FLAGS.contains(&word) {
                    words.next();
                }
                continue;
            }
            args.push(word);
        }
        args
    }

    /// Subcommand verb, lowercased
    #[must_use]
    pub fn verb(&self) -> Option<String> {
        self.arguments().first().map(|verb| verb.to_lowercase())
    }
}

/// Flags whose value is the following word
const VALUE_FLAGS: &[&str] = &[
    "-n",
    "--namespace",
    "--context",
    "--kubeconfig",
    "--cluster",
    "--user",
    "-f",
    "--filename",
    "-l",
    "--selector",
    "-o",
    "--output",
    "-c",
    "--container",
];

/// Safety category the backend assigns to a pending tool call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalCategory {
    /// Inspects state only
    ReadOnly,
    /// Modifies state
    Write,
    /// Destructive or wide-impact
    Dangerous,
    /// Needs a TTY or user input
    Interactive,
    /// Missing or unrecognized category
    #[default]
    #[serde(other)]
    Unknown,
}

impl ApprovalCategory {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read-only",
            Self::Write => "write",
            Self::Dangerous => "dangerous",
            Self::Interactive => "interactive",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ApprovalCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool call waiting for human approval
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Opaque correlation id
    pub id: String,
    /// Tool the agent wants to run
    #[serde(default)]
    pub tool_name: String,
    /// Command line it wants to run
    #[serde(default)]
    pub command: String,
    /// Backend-assigned category
    #[serde(default)]
    pub category: ApprovalCategory,
}

/// Body of the approval resolution call
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Id of the request being answered
    pub id: String,
    /// Whether the tool may run
    pub approved: bool,
}

#[derive(Deserialize)]
struct SessionPayload {
    session_id: String,
}

/// Classified stream frame
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentFrame {
    /// Text to append to the assistant message
    Text(String),
    /// Backend assigned or confirmed the session id
    Session {
        /// Session identifier
        session_id: String,
    },
    /// Tool audit record
    ToolExecution(ToolExecutionRecord),
    /// Approval needed before a tool runs
    Approval(ApprovalRequest),
    /// Backend stopped waiting for approval `id`
    ApprovalTimeout {
        /// Approval id that expired
        id: String,
    },
    /// Unknown event type whose payload matched nothing
    Unrecognized {
        /// Event name as received
        event_type: String,
        /// Raw payload
        payload: String,
    },
}

impl AgentFrame {
    /// Text contributed to the assistant message, if any
    ///
    /// Unrecognized frames fall back to their unescaped payload.
    #[must_use]
    pub fn text_delta(&self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text.clone()),
            Self::Unrecognized { payload, .. } => {
                Some(crate::frame::unescape_newlines(payload).into_owned())
            }
            _ => None,
        }
    }
}

impl From<StreamFrame> for AgentFrame {
    fn from(frame: StreamFrame) -> Self {
        match &frame.event_type {
            EventType::Session => parse_session(&frame.payload)
                .unwrap_or_else(|| malformed(&frame)),
            EventType::ToolExecution => serde_json::from_str(&frame.payload)
                .ok()
                .filter(|r: &ToolExecutionRecord| !r.tool.is_empty() || !r.command.is_empty())
                .map(Self::ToolExecution)
                .unwrap_or_else(|| malformed(&frame)),
            EventType::Approval => parse_approval(&frame.payload)
                .map(Self::Approval)
                .unwrap_or_else(|| malformed(&frame)),
            EventType::ApprovalTimeout => parse_timeout_id(&frame.payload)
                .map(|id| Self::ApprovalTimeout { id })
                .unwrap_or_else(|| malformed(&frame)),
            EventType::Text => recognise_shape(&frame.payload)
                .unwrap_or_else(|| Self::Text(frame.text_delta().into_owned())),
            EventType::Unknown(name) => {
                recognise_shape(&frame.payload).unwrap_or_else(|| Self::Unrecognized {
                    event_type: name.clone(),
                    payload: frame.payload.clone(),
                })
            }
        }
    }
}

/// Tagged frame whose payload did not parse; recovered as text
fn malformed(frame: &StreamFrame) -> AgentFrame {
    tracing::debug!(
        event_type = frame.event_type.as_str(),
        payload_len = frame.payload.len(),
        "Malformed tagged payload, treating as text"
    );
    AgentFrame::Text(frame.text_delta().into_owned())
}

fn parse_session(payload: &str) -> Option<AgentFrame> {
    let parsed: SessionPayload = serde_json::from_str(payload).ok()?;
    (!parsed.session_id.is_empty()).then_some(AgentFrame::Session {
        session_id: parsed.session_id,
    })
}

fn parse_approval(payload: &str) -> Option<ApprovalRequest> {
    let request: ApprovalRequest = serde_json::from_str(payload).ok()?;
    (!request.id.is_empty()).then_some(request)
}

fn parse_timeout_id(payload: &str) -> Option<String> {
    let trimmed = payload.trim();
    let id = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(id)) => id,
        Ok(Value::Object(map)) => map.get("id")?.as_str()?.to_string(),
        _ => trimmed.to_string(),
    };
    (!id.is_empty()).then_some(id)
}

/// Best-effort structural recognition of an untagged JSON payload
fn recognise_shape(payload: &str) -> Option<AgentFrame> {
    let trimmed = payload.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    let object = value.as_object()?;

    if object.get("type").and_then(Value::as_str) == Some("approval_required") {
        return serde_json::from_value::<ApprovalRequest>(value.clone())
            .ok()
            .filter(|r| !r.id.is_empty())
            .map(AgentFrame::Approval);
    }
    if object.contains_key("tool") && object.contains_key("command") {
        return serde_json::from_value(value.clone())
            .ok()
            .map(AgentFrame::ToolExecution);
    }
    if let Some(Value::String(session_id)) = object.get("session_id") {
        if !session_id.is_empty() {
            return Some(AgentFrame::Session {
                session_id: session_id.clone(),
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tagged(event: EventType, payload: &str) -> AgentFrame {
        AgentFrame::from(StreamFrame::new(event, payload))
    }

    #[test]
    fn test_session_frame() {
        assert_eq!(
            tagged(EventType::Session, r#"{"session_id":"abc"}"#),
            AgentFrame::Session {
                session_id: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_tool_execution_frame() {
        let frame = tagged(
            EventType::ToolExecution,
            r#"{"type":"tool_execution","tool":"kubectl","command":"kubectl get pods","result":"nginx Running","is_error":false}"#,
        );
        assert_eq!(
            frame,
            AgentFrame::ToolExecution(ToolExecutionRecord {
                tool: "kubectl".to_string(),
                command: "kubectl get pods".to_string(),
                result: "nginx Running".to_string(),
                is_error: false,
            })
        );
    }

    #[test]
    fn test_approval_frame_with_unknown_category() {
        let frame = tagged(
            EventType::Approval,
            r#"{"type":"approval_required","id":"ap-1","tool_name":"kubectl","command":"kubectl delete pod x","category":"catastrophic"}"#,
        );
        let AgentFrame::Approval(request) = frame else {
            panic!("expected approval, got {frame:?}");
        };
        assert_eq!(request.id, "ap-1");
        assert_eq!(request.category, ApprovalCategory::Unknown);
    }

    #[test]
    fn test_approval_categories_parse() {
        for (wire, category) in [
            ("read-only", ApprovalCategory::ReadOnly),
            ("write", ApprovalCategory::Write),
            ("dangerous", ApprovalCategory::Dangerous),
            ("interactive", ApprovalCategory::Interactive),
        ] {
            let parsed: ApprovalCategory = serde_json::from_str(&format!("\"{wire}\"")).unwrap();
            assert_eq!(parsed, category);
            assert_eq!(category.as_str(), wire);
        }
    }

    #[test]
    fn test_malformed_tagged_payload_becomes_text() {
        for event in [EventType::Session, EventType::ToolExecution, EventType::Approval] {
            assert_eq!(
                tagged(event, "{not json"),
                AgentFrame::Text("{not json".to_string())
            );
        }
        // Approval without an id cannot be correlated
        assert_eq!(
            tagged(EventType::Approval, r#"{"tool_name":"kubectl"}"#),
            AgentFrame::Text(r#"{"tool_name":"kubectl"}"#.to_string())
        );
    }

    #[test]
    fn test_malformed_tagged_payload_is_unescaped() {
        assert_eq!(
            tagged(EventType::Session, "not json\\nsecond line"),
            AgentFrame::Text("not json\nsecond line".to_string())
        );
    }

    #[test]
    fn test_untagged_shape_recognition() {
        assert_eq!(
            tagged(EventType::Text, r#"{"session_id":"s-9"}"#),
            AgentFrame::Session {
                session_id: "s-9".to_string()
            }
        );
        assert!(matches!(
            tagged(
                EventType::Text,
                r#"{"type":"approval_required","id":"a","command":"rm"}"#
            ),
            AgentFrame::Approval(_)
        ));
        assert!(matches!(
            tagged(EventType::Text, r#"{"tool":"kubectl","command":"kubectl get ns"}"#),
            AgentFrame::ToolExecution(_)
        ));
    }

    #[test]
    fn test_untagged_plain_text_is_unescaped() {
        assert_eq!(
            tagged(EventType::Text, "world\\n!"),
            AgentFrame::Text("world\n!".to_string())
        );
        assert_eq!(
            tagged(EventType::Text, r#"{"answer": 42}"#),
            AgentFrame::Text(r#"{"answer": 42}"#.to_string())
        );
    }

    #[test]
    fn test_unknown_event_falls_back_to_unrecognized() {
        let frame = tagged(EventType::Unknown("progress".to_string()), "step\\n2");
        assert_eq!(
            frame,
            AgentFrame::Unrecognized {
                event_type: "progress".to_string(),
                payload: "step\\n2".to_string(),
            }
        );
        assert_eq!(frame.text_delta().as_deref(), Some("step\n2"));
    }

    #[test]
    fn test_approval_timeout_id_forms() {
        for payload in ["ap-7", "\"ap-7\"", r#"{"id":"ap-7"}"#] {
            assert_eq!(
                tagged(EventType::ApprovalTimeout, payload),
                AgentFrame::ApprovalTimeout {
                    id: "ap-7".to_string()
                },
                "{payload}"
            );
        }
    }

    #[test]
    fn test_tool_verb() {
        let record = |command: &str| ToolExecutionRecord {
            tool: "kubectl".to_string(),
            command: command.to_string(),
            result: String::new(),
            is_error: false,
        };

        assert_eq!(record("kubectl get pods").verb().as_deref(), Some("get"));
        assert_eq!(
            record("kubectl -n prod scale deploy/api --replicas=2").verb().as_deref(),
            Some("scale")
        );
        assert_eq!(record("kubectl").verb(), None);
        assert_eq!(
            record("kubectl apply -f deploy.yaml -n web").arguments(),
            vec!["apply"]
        );
        assert_eq!(
            record("kubectl rollout restart deployment/api --context=prod").arguments(),
            vec!["rollout", "restart", "deployment/api"]
        );
    }

    #[test]
    fn test_turn_request_omits_missing_session() {
        let body = serde_json::to_value(TurnRequest {
            message: "hi".to_string(),
            session_id: None,
            language: None,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"message": "hi"}));
    }
}

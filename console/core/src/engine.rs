//! Conversation Engine
//!
//! Orchestrates one turn at a time:
//!
//! 1. classify the outgoing text with the guardrail, asking the host to
//!    confirm risky messages
//! 2. record the user message and open the turn through the transport
//! 3. feed response chunks through the frame decoder
//! 4. dispatch each classified frame (session, tool execution, approval,
//!    text) to the session, the approval coordinator and the host
//! 5. finalize the assistant message and request view refreshes
//!
//! The engine is UI-agnostic. It talks to the host through
//! [`ConsoleMessage`]s on an mpsc channel and calls back only through
//! [`ConfirmOverride`]. `send` takes `&mut self`, so turns are serialized by
//! construction.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use crate::approval::ApprovalCoordinator;
use crate::config::ConsoleConfig;
use crate::conversation::{ConversationSession, Message, MessageDraft};
use crate::frame::{Decoded, StreamFrameDecoder};
use crate::guardrail::{GuardrailClassifier, GuardrailVerdict};
use crate::messages::{ConsoleMessage, ConsoleState, MessageId, NotifyLevel};
use crate::protocol::{AgentFrame, ToolExecutionRecord, TurnRequest};
use crate::session_store::SessionStore;
use crate::transport::{AgentTransport, TransportError};

/// Command verbs that change cluster state
pub const MUTATION_VERBS: &[&str] = &[
    "apply", "create", "delete", "scale", "patch", "edit", "replace", "rollout", "label",
    "annotate", "cordon", "drain", "taint",
];

/// Errors that end a turn
#[derive(Debug, Error)]
pub enum TurnError {
    /// Guardrail refused the message; nothing was sent
    #[error("Message blocked ({}): {}", .0.risk_level, .0.reason.as_deref().unwrap_or("no reason given"))]
    Blocked(GuardrailVerdict),

    /// User declined to confirm a risky message; nothing was sent
    #[error("Message not confirmed ({} risk)", .0.risk_level)]
    Declined(GuardrailVerdict),

    /// Transport failed before or during the stream
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Host cancelled the turn or went away
    #[error("Turn cancelled")]
    Cancelled,
}

/// Host callback for confirming a message the guardrail flagged
#[async_trait]
pub trait ConfirmOverride: Send + Sync {
    /// Return `true` to send the message anyway
    async fn confirm(&self, text: &str, verdict: &GuardrailVerdict) -> bool;
}

/// Confirms everything (automation and tests)
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysConfirm;

#[async_trait]
impl ConfirmOverride for AlwaysConfirm {
    async fn confirm(&self, _text: &str, _verdict: &GuardrailVerdict) -> bool {
        true
    }
}

/// Confirms nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverConfirm;

#[async_trait]
impl ConfirmOverride for NeverConfirm {
    async fn confirm(&self, _text: &str, _verdict: &GuardrailVerdict) -> bool {
        false
    }
}

/// Cloneable cancel flag for the in-flight turn
#[derive(Clone, Debug, Default)]
pub struct TurnCancellation {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl TurnCancellation {
    /// Create an uncancelled flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop the current turn
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether `cancel` was called since the last reset
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Resolves once cancelled
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Engine configuration
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Preferred response language sent with each turn
    pub language: Option<String>,
    /// Block critical messages instead of asking
    pub strict: bool,
    /// Maximum messages kept in memory (0 = unlimited)
    pub max_messages: usize,
}

impl From<&ConsoleConfig> for EngineConfig {
    fn from(config: &ConsoleConfig) -> Self {
        Self {
            language: config.agent.language.clone(),
            strict: config.guardrail.strict,
            max_messages: 0,
        }
    }
}

/// Protocol handler for one conversation
pub struct ConversationEngine {
    /// Configuration
    config: EngineConfig,
    /// Pre-send safety gate
    classifier: GuardrailClassifier,
    /// Network boundary
    transport: Arc<dyn AgentTransport>,
    /// Session id persistence
    store: Arc<dyn SessionStore>,
    /// Pending approval slot, shared with the host
    approvals: Arc<ApprovalCoordinator>,
    /// Current session
    session: ConversationSession,
    /// Current operational state
    state: ConsoleState,
    /// Cancel flag for the in-flight turn
    cancellation: TurnCancellation,
    /// Channel to the host surface
    tx: mpsc::Sender<ConsoleMessage>,
}

impl ConversationEngine {
    /// Create an engine, resuming the session id held by `store`
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        store: Arc<dyn SessionStore>,
        config: EngineConfig,
        tx: mpsc::Sender<ConsoleMessage>,
    ) -> Self {
        let session_id = store.get();
        if let Some(ref id) = session_id {
            tracing::info!(session_id = %id, "Resuming stored session");
        }

        Self {
            classifier: GuardrailClassifier::new(config.strict),
            session: ConversationSession::new(session_id).with_max_messages(config.max_messages),
            approvals: Arc::new(ApprovalCoordinator::new(transport.clone(), tx.clone())),
            transport,
            store,
            config,
            state: ConsoleState::Ready,
            cancellation: TurnCancellation::new(),
            tx,
        }
    }

    /// Shared approval coordinator
    #[must_use]
    pub fn approvals(&self) -> Arc<ApprovalCoordinator> {
        self.approvals.clone()
    }

    /// Handle for cancelling the in-flight turn
    #[must_use]
    pub fn cancellation(&self) -> TurnCancellation {
        self.cancellation.clone()
    }

    /// Current session
    #[must_use]
    pub fn session(&self) -> &ConversationSession {
        &self.session
    }

    /// Backend-assigned session id
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session.id()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConsoleState {
        self.state
    }

    /// Guardrail classifier
    #[must_use]
    pub fn classifier(&self) -> &GuardrailClassifier {
        &self.classifier
    }

    /// Toggle strict guardrail mode
    pub fn set_strict(&mut self, strict: bool) {
        self.classifier.set_strict(strict);
    }

    /// Run one turn
    ///
    /// Returns the finalized assistant message.
    ///
    /// # Errors
    ///
    /// - `TurnError::Blocked` / `TurnError::Declined` before anything is sent
    /// - `TurnError::Transport` if the request or stream fails (the user
    ///   message stays in the history, no assistant message is added)
    /// - `TurnError::Cancelled` if the turn was cancelled or the host went away
    pub async fn send(
        &mut self,
        text: &str,
        confirm: &dyn ConfirmOverride,
    ) -> Result<Message, TurnError> {
        let verdict = self.classifier.classify(text);
        if verdict.is_blocked() {
            tracing::info!(risk = %verdict.risk_level, "Message blocked by guardrail");
            return Err(TurnError::Blocked(verdict));
        }
        if verdict.require_confirmation && !confirm.confirm(text, &verdict).await {
            tracing::info!(risk = %verdict.risk_level, "Risky message not confirmed");
            return Err(TurnError::Declined(verdict));
        }

        self.cancellation.reset();

        let user = Message::user(text);
        self.send_msg(ConsoleMessage::UserMessage {
            id: user.id,
            text: user.text.clone(),
        })
        .await;
        self.session.push(user);

        self.set_state(ConsoleState::Thinking).await;

        let request = TurnRequest {
            message: text.to_string(),
            session_id: self.session.id().map(str::to_string),
            language: self.config.language.clone(),
        };
        tracing::info!(
            session_id = request.session_id.as_deref().unwrap_or("-"),
            transport = self.transport.name(),
            "Starting turn"
        );

        let result = self.run_turn(&request).await;

        // Approvals never outlive their turn
        self.approvals.dismiss().await;
        self.set_state(ConsoleState::Ready).await;

        result
    }

    async fn run_turn(&mut self, request: &TurnRequest) -> Result<Message, TurnError> {
        let mut chunks = match self.transport.open_turn(request).await {
            Ok(rx) => rx,
            Err(e) => {
                self.fail_turn(None, &e).await;
                return Err(e.into());
            }
        };

        let mut draft = MessageDraft::new();
        let mut decoder = StreamFrameDecoder::new();
        let mut refresh = Vec::new();
        let cancellation = self.cancellation.clone();
        let host = self.tx.clone();

        self.set_state(ConsoleState::Responding).await;

        'stream: loop {
            let chunk = tokio::select! {
                biased;
                () = cancellation.cancelled() => None,
                () = host.closed() => None,
                chunk = chunks.recv() => Some(chunk),
            };
            let Some(chunk) = chunk else {
                return Err(self.cancelled());
            };

            let end_of_stream = match chunk {
                Some(Ok(bytes)) => {
                    decoder.push(&bytes);
                    false
                }
                Some(Err(e)) => {
                    self.fail_turn(Some(draft.id()), &e).await;
                    return Err(e.into());
                }
                None => true,
            };

            loop {
                let next = if end_of_stream {
                    decoder.finish()
                } else {
                    decoder.decode()
                };
                let Some(decoded) = next else {
                    break;
                };

                if self.is_cancelled() {
                    return Err(self.cancelled());
                }

                let frame = match decoded {
                    Decoded::Frame(frame) => frame,
                    Decoded::Done => break 'stream,
                };
                if self
                    .dispatch(AgentFrame::from(frame), &mut draft, &mut refresh)
                    .await
                    .is_break()
                {
                    break 'stream;
                }
            }

            if end_of_stream {
                break;
            }
        }

        // Abandon whatever the agent sends after [DONE]
        drop(chunks);

        Ok(self.finalize(draft, refresh).await)
    }

    async fn dispatch(
        &mut self,
        frame: AgentFrame,
        draft: &mut MessageDraft,
        refresh: &mut Vec<String>,
    ) -> ControlFlow<()> {
        match frame {
            AgentFrame::Session { session_id } => {
                self.assign_session(session_id).await;
            }
            AgentFrame::ToolExecution(record) => {
                tracing::debug!(
                    tool = %record.tool,
                    command = %record.command,
                    is_error = record.is_error,
                    "Tool execution"
                );
                if let Some(resource) = mutated_resource(&record) {
                    if !refresh.contains(&resource) {
                        refresh.push(resource);
                    }
                }
                draft.push_tool_execution(record.clone());
                self.send_msg(ConsoleMessage::ToolExecution {
                    message_id: draft.id(),
                    record,
                })
                .await;
            }
            AgentFrame::Approval(request) => {
                self.approvals.offer(request).await;
            }
            AgentFrame::ApprovalTimeout { id } => {
                self.approvals.expire(&id).await;
            }
            other @ (AgentFrame::Text(_) | AgentFrame::Unrecognized { .. }) => {
                if let AgentFrame::Unrecognized { ref event_type, .. } = other {
                    tracing::debug!(event_type = %event_type, "Unrecognized frame, treating as text");
                }
                if let Some(delta) = other.text_delta().filter(|d| !d.is_empty()) {
                    draft.append(&delta);
                    self.send_msg(ConsoleMessage::TextDelta {
                        message_id: draft.id(),
                        text: delta,
                    })
                    .await;
                }
            }
        }

        if self.tx.is_closed() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }

    async fn assign_session(&mut self, session_id: String) {
        if let Err(e) = self.store.set(&session_id) {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to persist session id");
            self.notify(
                NotifyLevel::Warning,
                "Session not saved",
                &format!("The conversation will not resume after a restart: {e}"),
            )
            .await;
        }

        if self.session.id() != Some(session_id.as_str()) {
            tracing::info!(session_id = %session_id, "Session assigned");
        }
        self.session.set_id(session_id.clone());
        self.send_msg(ConsoleMessage::SessionAssigned { session_id })
            .await;
    }

    async fn finalize(&mut self, draft: MessageDraft, refresh: Vec<String>) -> Message {
        let message = draft.finish();
        self.session.push(message.clone());

        tracing::info!(
            message_id = %message.id,
            chars = message.text.len(),
            tools = message.tool_executions.len(),
            "Turn complete"
        );
        self.send_msg(ConsoleMessage::MessageComplete {
            message: message.clone(),
        })
        .await;

        if !refresh.is_empty() {
            self.send_msg(ConsoleMessage::RefreshRequested { resources: refresh })
                .await;
        }

        message
    }

    /// Forget the session id and history
    pub async fn new_conversation(&mut self) {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear stored session id");
        }
        self.approvals.dismiss().await;
        self.session.reset();
        tracing::info!("Started a new conversation");
        self.send_msg(ConsoleMessage::ConversationReset).await;
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled() || self.tx.is_closed()
    }

    fn cancelled(&self) -> TurnError {
        tracing::info!("Turn cancelled");
        TurnError::Cancelled
    }

    async fn fail_turn(&self, message_id: Option<MessageId>, error: &TransportError) {
        tracing::warn!(error = %error, "Turn failed");
        self.send_msg(ConsoleMessage::TurnFailed {
            message_id,
            error: error.to_string(),
            guidance: error.guidance(),
        })
        .await;
    }

    /// Set state and notify host
    async fn set_state(&mut self, state: ConsoleState) {
        self.state = state;
        self.send_msg(ConsoleMessage::State { state }).await;
    }

    /// Send notification
    async fn notify(&self, level: NotifyLevel, title: &str, message: &str) {
        self.send_msg(ConsoleMessage::Notify {
            level,
            title: title.to_string(),
            message: message.to_string(),
        })
        .await;
    }

    /// Send a message to the host surface
    async fn send_msg(&self, msg: ConsoleMessage) {
        if let Err(e) = self.tx.send(msg).await {
            tracing::debug!("Failed to send message to host: {}", e);
        }
    }
}

/// Resource reference touched by a successful mutating tool call
///
/// `kubectl scale deployment foo --replicas=0` yields `deployment/foo`.
fn mutated_resource(record: &ToolExecutionRecord) -> Option<String> {
    if record.is_error {
        return None;
    }

    let args = record.arguments();
    let (verb, rest) = args.split_first()?;
    let verb = verb.to_lowercase();
    if !MUTATION_VERBS.contains(&verb.as_str()) {
        return None;
    }

    // `rollout restart`, `rollout undo` etc. carry a sub-verb
    let rest = if verb == "rollout" {
        rest.get(1..).unwrap_or_default()
    } else {
        rest
    };
    let targets: Vec<&str> = rest
        .iter()
        .copied()
        .filter(|word| !word.contains('='))
        .collect();

    Some(match targets.as_slice() {
        [] => record.command.clone(),
        [single] => (*single).to_string(),
        [kind, name, ..] if !kind.contains('/') => format!("{kind}/{name}"),
        [first, ..] => (*first).to_string(),
    })
}

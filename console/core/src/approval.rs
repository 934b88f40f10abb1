//! Approval Coordinator
//!
//! Human-in-the-loop confirmation for tool calls the agent wants to run.
//!
//! The coordinator holds at most one pending [`ApprovalRequest`]. A newer
//! request replaces the older one in the slot; the displaced request is
//! returned to the caller and reported to the host. Decisions travel to the
//! agent through [`AgentTransport::submit_approval`], a separate call outside
//! the turn stream, so the stream keeps draining while the user decides.
//!
//! The coordinator is shared (`Arc`) between the engine, which offers and
//! expires requests, and the host, which resolves them.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::messages::{ApprovalClearReason, ConsoleMessage, NotifyLevel};
use crate::protocol::{ApprovalDecision, ApprovalRequest};
use crate::transport::{AgentTransport, TransportError};

/// Errors from resolving an approval
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    /// There is no pending request to answer
    #[error("No approval is pending")]
    NothingPending,
}

/// Result of a resolve call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// Decision that was sent
    pub decision: ApprovalDecision,
    /// Whether the agent acknowledged it
    pub delivered: bool,
}

/// Single-slot approval state shared by engine and host
pub struct ApprovalCoordinator {
    slot: Mutex<Option<ApprovalRequest>>,
    transport: Arc<dyn AgentTransport>,
    tx: mpsc::Sender<ConsoleMessage>,
}

impl ApprovalCoordinator {
    /// Create a coordinator that submits through `transport` and reports to `tx`
    pub fn new(transport: Arc<dyn AgentTransport>, tx: mpsc::Sender<ConsoleMessage>) -> Self {
        Self {
            slot: Mutex::new(None),
            transport,
            tx,
        }
    }

    /// Currently pending request
    #[must_use]
    pub fn pending(&self) -> Option<ApprovalRequest> {
        self.slot.lock().clone()
    }

    /// Whether a request is waiting for a decision
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Put a request in the slot and announce it
    ///
    /// Returns the request it displaced, if any.
    pub async fn offer(&self, request: ApprovalRequest) -> Option<ApprovalRequest> {
        let displaced = self.slot.lock().replace(request.clone());

        if let Some(ref old) = displaced {
            tracing::warn!(
                approval_id = %old.id,
                replaced_by = %request.id,
                "Pending approval replaced before it was answered"
            );
            self.send(ConsoleMessage::ApprovalCleared {
                id: old.id.clone(),
                reason: ApprovalClearReason::Replaced,
            })
            .await;
        }

        tracing::info!(
            approval_id = %request.id,
            tool = %request.tool_name,
            category = %request.category,
            "Approval requested"
        );
        self.send(ConsoleMessage::ApprovalRequested { request }).await;

        displaced
    }

    /// Answer the pending request
    ///
    /// The slot is cleared before the decision is sent and stays cleared
    /// whatever the network outcome. Delivery is attempted once.
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::NothingPending` if the slot is empty.
    pub async fn resolve(&self, approved: bool) -> Result<ResolveOutcome, ApprovalError> {
        let request = self
            .slot
            .lock()
            .take()
            .ok_or(ApprovalError::NothingPending)?;

        let decision = ApprovalDecision {
            id: request.id.clone(),
            approved,
        };

        self.send(ConsoleMessage::ApprovalCleared {
            id: request.id.clone(),
            reason: ApprovalClearReason::Resolved { approved },
        })
        .await;

        let delivered = match self.transport.submit_approval(&decision).await {
            Ok(()) => {
                tracing::info!(approval_id = %decision.id, approved, "Approval decision delivered");
                true
            }
            Err(e) => {
                tracing::warn!(
                    approval_id = %decision.id,
                    approved,
                    error = %e,
                    "Failed to deliver approval decision"
                );
                let notify = if matches!(e, TransportError::ApprovalNotFound) {
                    ConsoleMessage::Notify {
                        level: NotifyLevel::Error,
                        title: "Approval expired".to_string(),
                        message: format!(
                            "The agent no longer waits on '{}'; your decision was ignored",
                            request.command
                        ),
                    }
                } else {
                    ConsoleMessage::Notify {
                        level: NotifyLevel::Warning,
                        title: "Approval not delivered".to_string(),
                        message: format!(
                            "Your decision for '{}' may not have reached the agent: {e}",
                            request.command
                        ),
                    }
                };
                self.send(notify).await;
                false
            }
        };

        Ok(ResolveOutcome {
            decision,
            delivered,
        })
    }

    /// Clear the slot if it still holds `id`
    ///
    /// Returns whether anything was cleared.
    pub async fn expire(&self, id: &str) -> bool {
        let expired = {
            let mut slot = self.slot.lock();
            match slot.as_ref() {
                Some(pending) if pending.id == id => slot.take(),
                _ => None,
            }
        };

        let Some(request) = expired else {
            tracing::debug!(approval_id = %id, "Timeout for an approval that is not pending");
            return false;
        };

        tracing::info!(approval_id = %request.id, "Approval expired");
        self.send(ConsoleMessage::ApprovalCleared {
            id: request.id,
            reason: ApprovalClearReason::Expired,
        })
        .await;
        true
    }

    /// Drop the pending request without answering it
    pub async fn dismiss(&self) -> Option<ApprovalRequest> {
        let dismissed = self.slot.lock().take();
        if let Some(ref request) = dismissed {
            tracing::debug!(approval_id = %request.id, "Pending approval dismissed");
            self.send(ConsoleMessage::ApprovalCleared {
                id: request.id.clone(),
                reason: ApprovalClearReason::Dismissed,
            })
            .await;
        }
        dismissed
    }

    async fn send(&self, msg: ConsoleMessage) {
        if self.tx.send(msg).await.is_err() {
            tracing::debug!("Host receiver dropped, approval message discarded");
        }
    }
}

impl std::fmt::Debug for ApprovalCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalCoordinator")
            .field("pending", &*self.slot.lock())
            .field("transport", &self.transport.name())
            .finish()
    }
}

/// Keyboard shortcut for answering an approval
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalShortcut {
    /// `y`, `Y`, `a` or Enter
    Accept,
    /// `n`, `N`, `d` or Esc
    Deny,
}

impl ApprovalShortcut {
    /// Map a single key press
    #[must_use]
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            'y' | 'Y' | 'a' | '\n' | '\r' => Some(Self::Accept),
            'n' | 'N' | 'd' | '\u{1b}' => Some(Self::Deny),
            _ => None,
        }
    }

    /// Map a line typed at a prompt (an empty line is Enter)
    #[must_use]
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']).trim();
        let mut chars = line.chars();
        match (chars.next(), chars.next()) {
            (None, _) => Some(Self::Accept),
            (Some(key), None) => Self::from_key(key),
            _ => match line.to_lowercase().as_str() {
                "yes" | "approve" | "accept" => Some(Self::Accept),
                "no" | "deny" | "reject" => Some(Self::Deny),
                _ => None,
            },
        }
    }

    /// Decision this shortcut stands for
    #[must_use]
    pub fn approved(self) -> bool {
        matches!(self, Self::Accept)
    }

    /// Resolve the pending approval with this shortcut's decision
    ///
    /// # Errors
    ///
    /// Returns `ApprovalError::NothingPending` if nothing is pending.
    pub async fn apply(
        self,
        coordinator: &ApprovalCoordinator,
    ) -> Result<ResolveOutcome, ApprovalError> {
        coordinator.resolve(self.approved()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ApprovalCategory, TurnRequest};
    use crate::transport::ChunkReceiver;
    use async_trait::async_trait;

    /// Records decisions; fails delivery with `fail` when set
    #[derive(Default)]
    struct RecordingTransport {
        decisions: Mutex<Vec<ApprovalDecision>>,
        fail: Option<fn() -> TransportError>,
    }

    #[async_trait]
    impl AgentTransport for RecordingTransport {
        fn name(&self) -> &str {
            "recording"
        }

        async fn open_turn(&self, _request: &TurnRequest) -> Result<ChunkReceiver, TransportError> {
            Err(TransportError::Request("not scripted".to_string()))
        }

        async fn submit_approval(&self, decision: &ApprovalDecision) -> Result<(), TransportError> {
            self.decisions.lock().push(decision.clone());
            match self.fail {
                Some(error) => Err(error()),
                None => Ok(()),
            }
        }
    }

    fn request(id: &str) -> ApprovalRequest {
        ApprovalRequest {
            id: id.to_string(),
            tool_name: "kubectl".to_string(),
            command: format!("kubectl delete pod {id}"),
            category: ApprovalCategory::Dangerous,
        }
    }

    fn setup(
        fail: Option<fn() -> TransportError>,
    ) -> (
        Arc<RecordingTransport>,
        ApprovalCoordinator,
        mpsc::Receiver<ConsoleMessage>,
    ) {
        let transport = Arc::new(RecordingTransport {
            fail,
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(32);
        let coordinator = ApprovalCoordinator::new(transport.clone(), tx);
        (transport, coordinator, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ConsoleMessage>) -> Vec<ConsoleMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_second_offer_replaces_first() {
        let (_transport, coordinator, mut rx) = setup(None);

        assert_eq!(coordinator.offer(request("a")).await, None);
        assert_eq!(coordinator.offer(request("b")).await, Some(request("a")));
        assert_eq!(coordinator.pending(), Some(request("b")));

        let messages = drain(&mut rx);
        assert_eq!(
            messages,
            vec![
                ConsoleMessage::ApprovalRequested {
                    request: request("a")
                },
                ConsoleMessage::ApprovalCleared {
                    id: "a".to_string(),
                    reason: ApprovalClearReason::Replaced,
                },
                ConsoleMessage::ApprovalRequested {
                    request: request("b")
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_sends_decision_and_clears_slot() {
        let (transport, coordinator, _rx) = setup(None);
        coordinator.offer(request("a")).await;

        let outcome = coordinator.resolve(true).await.unwrap();
        assert!(outcome.delivered);
        assert_eq!(
            outcome.decision,
            ApprovalDecision {
                id: "a".to_string(),
                approved: true
            }
        );
        assert!(!coordinator.has_pending());
        assert_eq!(transport.decisions.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_without_pending() {
        let (transport, coordinator, _rx) = setup(None);
        assert_eq!(
            coordinator.resolve(false).await,
            Err(ApprovalError::NothingPending)
        );
        assert!(transport.decisions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delivery_warns_and_does_not_reopen() {
        let (transport, coordinator, mut rx) =
            setup(Some(|| TransportError::Request("connection refused".to_string())));
        coordinator.offer(request("a")).await;
        drain(&mut rx);

        let outcome = coordinator.resolve(false).await.unwrap();
        assert!(!outcome.delivered);
        assert!(!coordinator.has_pending());
        // Attempted exactly once
        assert_eq!(transport.decisions.lock().len(), 1);

        let messages = drain(&mut rx);
        assert!(messages.iter().any(|m| matches!(
            m,
            ConsoleMessage::Notify {
                level: NotifyLevel::Warning,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_unknown_approval_id_reports_error() {
        let (_transport, coordinator, mut rx) = setup(Some(|| TransportError::ApprovalNotFound));
        coordinator.offer(request("a")).await;
        drain(&mut rx);

        let outcome = coordinator.resolve(true).await.unwrap();
        assert!(!outcome.delivered);
        assert!(!coordinator.has_pending());

        let messages = drain(&mut rx);
        assert!(matches!(
            messages.last(),
            Some(ConsoleMessage::Notify {
                level: NotifyLevel::Error,
                title,
                ..
            }) if title == "Approval expired"
        ));
    }

    #[tokio::test]
    async fn test_expire_only_matching_id() {
        let (_transport, coordinator, _rx) = setup(None);
        coordinator.offer(request("a")).await;

        assert!(!coordinator.expire("other").await);
        assert!(coordinator.has_pending());

        assert!(coordinator.expire("a").await);
        assert!(!coordinator.has_pending());
    }

    #[tokio::test]
    async fn test_dismiss() {
        let (transport, coordinator, _rx) = setup(None);
        assert_eq!(coordinator.dismiss().await, None);

        coordinator.offer(request("a")).await;
        assert_eq!(coordinator.dismiss().await, Some(request("a")));
        assert!(!coordinator.has_pending());
        assert!(transport.decisions.lock().is_empty());
    }

    #[test]
    fn test_shortcut_keys() {
        for key in ['y', 'Y', 'a', '\n'] {
            assert_eq!(ApprovalShortcut::from_key(key), Some(ApprovalShortcut::Accept));
        }
        for key in ['n', 'N', 'd', '\u{1b}'] {
            assert_eq!(ApprovalShortcut::from_key(key), Some(ApprovalShortcut::Deny));
        }
        assert_eq!(ApprovalShortcut::from_key('x'), None);
    }

    #[test]
    fn test_shortcut_lines() {
        assert_eq!(ApprovalShortcut::from_line("\n"), Some(ApprovalShortcut::Accept));
        assert_eq!(ApprovalShortcut::from_line("y\n"), Some(ApprovalShortcut::Accept));
        assert_eq!(ApprovalShortcut::from_line("No"), Some(ApprovalShortcut::Deny));
        assert_eq!(ApprovalShortcut::from_line("what is this?"), None);
    }

    #[tokio::test]
    async fn test_shortcut_apply_resolves() {
        let (transport, coordinator, _rx) = setup(None);
        coordinator.offer(request("a")).await;

        let outcome = ApprovalShortcut::Deny.apply(&coordinator).await.unwrap();
        assert!(!outcome.decision.approved);
        assert!(!transport.decisions.lock().first().unwrap().approved);
    }
}

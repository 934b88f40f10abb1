//! Transport Traits
//!
//! The seam between the conversation engine and the network. Implementations
//! handle endpoint details (URLs, auth headers, error bodies); the engine only
//! sees raw response chunks.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::TransportError;
use crate::protocol::{ApprovalDecision, TurnRequest};

/// Raw response chunks in arrival order
///
/// The channel closes when the response body ends. A mid-stream failure is
/// delivered as a final `Err`.
pub type ChunkReceiver = mpsc::Receiver<Result<Vec<u8>, TransportError>>;

/// Agent service transport
///
/// Implement this trait to talk to the agent over something other than HTTP,
/// or to script responses in tests.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Transport name for logs (e.g. "http")
    fn name(&self) -> &str;

    /// Start a turn and stream the raw response body
    ///
    /// Fails before any chunk is produced if the service cannot be reached or
    /// answers with a non-success status. Dropping the receiver abandons the
    /// response.
    async fn open_turn(&self, request: &TurnRequest) -> Result<ChunkReceiver, TransportError>;

    /// Deliver an approval decision out-of-band
    ///
    /// Called once per decision, never retried.
    async fn submit_approval(&self, decision: &ApprovalDecision) -> Result<(), TransportError>;
}

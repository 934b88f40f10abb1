//! Console Core - Headless Agent Conversation Protocol for k13d
//!
//! This crate is the protocol handler behind the k13d agent console. It
//! talks to the agent service, decodes its multiplexed response stream and
//! gates outgoing messages, independent of any UI. It can drive a line
//! console, a TUI, or run headless for tests and automation.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Host Surface                            │
//! │        (line console, TUI, tests: renders ConsoleMessages)       │
//! └───────┬──────────────────────────▲──────────────────────┬────────┘
//!         │ send(text, confirm)      │ ConsoleMessage       │ resolve(approved)
//! ┌───────┼──────────────────────────┼──────────────────────┼────────┐
//! │       ▼                  CONSOLE CORE                   ▼        │
//! │  ┌──────────────────────────────────────┐   ┌─────────────────┐  │
//! │  │          ConversationEngine          │──►│    Approval     │  │
//! │  │  ┌───────────┐ ┌─────────┐ ┌───────┐ │   │   Coordinator   │  │
//! │  │  │ Guardrail │ │  Frame  │ │Session│ │   └────────┬────────┘  │
//! │  │  │Classifier │ │ Decoder │ │ Store │ │            │           │
//! │  │  └───────────┘ └────▲────┘ └───────┘ │            │           │
//! │  └─────────────────────┼────────────────┘            │           │
//! │                 ┌──────┴─────────────────────────────▼────────┐  │
//! │                 │   AgentTransport (open_turn / submit_approval)  │
//! │                 └─────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ConversationEngine`]: runs one turn at a time
//! - [`ConsoleMessage`]: messages sent from the core to the host
//! - [`ApprovalCoordinator`]: the single pending-approval slot
//! - [`GuardrailClassifier`]: pre-send safety gate
//! - [`StreamFrameDecoder`]: incremental `event:` / `data:` line decoder
//! - [`AgentTransport`]: network boundary, HTTP by default
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use console_core::{
//!     AlwaysConfirm, ConversationEngine, EngineConfig, FileSessionStore,
//!     HttpAgentTransport, load_config,
//! };
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config()?;
//!     let (tx, mut rx) = mpsc::channel(100);
//!
//!     let transport = Arc::new(HttpAgentTransport::from_config(&config.agent));
//!     let store = Arc::new(FileSessionStore::for_instance(&config.session.instance)?);
//!     let mut engine = ConversationEngine::new(transport, store, (&config).into(), tx);
//!
//!     tokio::spawn(async move {
//!         while let Some(msg) = rx.recv().await {
//!             // Render message
//!         }
//!     });
//!
//!     let reply = engine.send("why is my pod pending?", &AlwaysConfirm).await?;
//!     println!("{}", reply.text);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`guardrail`]: tiered risk classification of outgoing messages
//! - [`session_store`]: session id persistence (memory, file)
//! - [`frame`]: incremental stream frame decoder
//! - [`protocol`]: wire types and frame classification
//! - [`approval`]: pending approval slot and keyboard shortcuts
//! - [`transport`]: agent transport trait and HTTP implementation
//! - [`conversation`]: messages and the active session
//! - [`messages`]: messages from the core to the host
//! - [`engine`]: turn orchestration
//! - [`config`]: TOML/env/CLI configuration
//!
//! # No UI Dependencies
//!
//! This crate depends on no terminal or UI framework.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod approval;
pub mod config;
pub mod conversation;
pub mod engine;
pub mod frame;
pub mod guardrail;
pub mod messages;
pub mod protocol;
pub mod session_store;
pub mod transport;

// Re-exports for convenience
pub use approval::{ApprovalCoordinator, ApprovalError, ApprovalShortcut, ResolveOutcome};
pub use conversation::{ConversationSession, Message, MessageDraft};
pub use engine::{
    AlwaysConfirm, ConfirmOverride, ConversationEngine, EngineConfig, NeverConfirm,
    TurnCancellation, TurnError,
};
pub use frame::{Decoded, EventType, StreamFrame, StreamFrameDecoder};
pub use guardrail::{GuardrailClassifier, GuardrailVerdict, RiskLevel};
pub use messages::{
    ApprovalClearReason, ConsoleMessage, ConsoleState, MessageId, MessageRole, NotifyLevel,
};
pub use protocol::{
    AgentFrame, ApprovalCategory, ApprovalDecision, ApprovalRequest, ToolExecutionRecord,
    TurnRequest,
};
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore, SessionStoreError};
pub use transport::{
    AgentTransport, ApiErrorBody, ChunkReceiver, HttpAgentTransport, TransportError,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigOverrides,
    ConfigSource, ConsoleConfig, ConsoleToml,
};

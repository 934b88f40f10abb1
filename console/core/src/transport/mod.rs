//! Agent Transport
//!
//! Network boundary between the console and the agent service. A transport
//! opens one streaming turn at a time and submits approval decisions through
//! a separate request, outside the turn stream.
//!
//! # Available Transports
//!
//! - **HTTP**: `POST` to the agent endpoint, chunked response body (default)
//!
//! Tests and embedders can provide their own [`AgentTransport`] to script
//! responses without a server.
//!
//! # Usage
//!
//! ```ignore
//! use console_core::transport::{AgentTransport, HttpAgentTransport};
//! use console_core::protocol::TurnRequest;
//!
//! let transport = HttpAgentTransport::from_config(&config.agent);
//! let mut chunks = transport.open_turn(&request).await?;
//! while let Some(chunk) = chunks.recv().await { /* feed the decoder */ }
//! ```

mod http;
mod traits;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpAgentTransport;
pub use traits::{AgentTransport, ChunkReceiver};

/// Channel size for forwarded response chunks
pub const CHUNK_CHANNEL_SIZE: usize = 100;

/// Error body the agent service returns on non-2xx responses
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable code (e.g. `LLM_NOT_CONFIGURED`)
    #[serde(default)]
    pub code: String,
    /// Short user-facing message
    #[serde(default)]
    pub message: String,
    /// Technical detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// What the user can do about it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ApiErrorBody {
    /// Error code: the agent has no LLM provider configured
    pub const LLM_NOT_CONFIGURED: &'static str = "LLM_NOT_CONFIGURED";
    /// Error code: the configured model cannot call tools
    pub const LLM_NO_TOOL_CALLING: &'static str = "LLM_NO_TOOL_CALLING";

    /// Parse a response body, `None` if it is not a structured error
    #[must_use]
    pub fn parse(body: &str) -> Option<Self> {
        let parsed: Self = serde_json::from_str(body).ok()?;
        (!parsed.code.is_empty() || !parsed.message.is_empty()).then_some(parsed)
    }

    /// Suggestion from the body, or the standard one for known codes
    #[must_use]
    pub fn guidance(&self) -> Option<String> {
        if let Some(suggestion) = self.suggestion.as_ref().filter(|s| !s.is_empty()) {
            return Some(suggestion.clone());
        }
        match self.code.as_str() {
            Self::LLM_NOT_CONFIGURED => Some(
                "Configure an LLM provider and API key in the agent's AI/LLM settings.".to_string(),
            ),
            Self::LLM_NO_TOOL_CALLING => Some(
                "Enable JSON mode in the agent settings, or switch to a model that supports function calling."
                    .to_string(),
            ),
            _ => None,
        }
    }
}

/// Errors from the agent transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not reach the agent service
    #[error("Request failed: {0}")]
    Request(String),

    /// Agent service returned a non-success status
    #[error("Agent returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Message from the error body, or the raw body
        message: String,
        /// Structured error body, if the service sent one
        body: Option<ApiErrorBody>,
    },

    /// Agent service did not answer within the configured timeout
    #[error("Agent did not respond within {0} seconds")]
    Timeout(u64),

    /// Response stream failed after it started
    #[error("Stream interrupted: {0}")]
    Stream(String),

    /// Approval id unknown to the agent service
    #[error("Approval not found or expired")]
    ApprovalNotFound,
}

impl TransportError {
    /// Build a status error from a raw response body
    #[must_use]
    pub fn from_status(status: u16, raw_body: &str) -> Self {
        let body = ApiErrorBody::parse(raw_body);
        let message = match &body {
            Some(api) if !api.message.is_empty() => match &api.detail {
                Some(detail) if !detail.is_empty() => format!("{} ({detail})", api.message),
                _ => api.message.clone(),
            },
            Some(api) => api.code.clone(),
            None => raw_body.trim().to_string(),
        };
        Self::Status {
            status,
            message,
            body,
        }
    }

    /// What the user can do about this error, if anything useful is known
    #[must_use]
    pub fn guidance(&self) -> Option<String> {
        match self {
            Self::Status { body: Some(body), .. } => body.guidance(),
            Self::Status { status: 401, .. } => {
                Some("Check the configured auth token.".to_string())
            }
            Self::Request(_) | Self::Timeout(_) => Some(
                "Check that the agent service is running and the endpoint is correct.".to_string(),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_with_structured_body() {
        let err = TransportError::from_status(
            503,
            r#"{"code":"LLM_NOT_CONFIGURED","message":"AI assistant is not configured"}"#,
        );
        assert_eq!(
            err.to_string(),
            "Agent returned 503: AI assistant is not configured"
        );
        assert!(err.guidance().unwrap().contains("LLM provider"));
    }

    #[test]
    fn test_status_error_prefers_body_suggestion() {
        let err = TransportError::from_status(
            400,
            r#"{"code":"LLM_NO_TOOL_CALLING","message":"no tools","detail":"model x","suggestion":"Use model y"}"#,
        );
        assert_eq!(err.to_string(), "Agent returned 400: no tools (model x)");
        assert_eq!(err.guidance().as_deref(), Some("Use model y"));
    }

    #[test]
    fn test_status_error_with_plain_body() {
        let err = TransportError::from_status(500, "  boom \n");
        assert_eq!(err.to_string(), "Agent returned 500: boom");
        assert_eq!(err.guidance(), None);

        let unauthorized = TransportError::from_status(401, "");
        assert!(unauthorized.guidance().unwrap().contains("auth token"));
    }

    #[test]
    fn test_no_tool_calling_default_guidance() {
        let body = ApiErrorBody {
            code: ApiErrorBody::LLM_NO_TOOL_CALLING.to_string(),
            ..Default::default()
        };
        assert!(body.guidance().unwrap().contains("function calling"));
    }

    #[test]
    fn test_parse_rejects_unrelated_json() {
        assert_eq!(ApiErrorBody::parse(r#"{"ok":true}"#), None);
        assert_eq!(ApiErrorBody::parse("not json"), None);
    }
}

//! HTTP Transport
//!
//! Talks to the agent service over plain HTTP.
//!
//! - `POST <endpoint>` with `{message, session_id?, language?}` opens a turn;
//!   the chunked response body is the event stream.
//! - `POST <approval_endpoint>` with `{id, approved}` resolves an approval.
//!   A 404 means the backend no longer knows the id.
//!
//! Both calls carry an optional bearer token and `X-Username` header.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::traits::{AgentTransport, ChunkReceiver};
use super::{TransportError, CHUNK_CHANNEL_SIZE};
use crate::config::AgentConfig;
use crate::protocol::{ApprovalDecision, TurnRequest};

/// Connection establishment timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for the approval resolution call
const APPROVAL_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP agent client
#[derive(Clone)]
pub struct HttpAgentTransport {
    /// Turn endpoint URL
    endpoint: String,
    /// Approval endpoint URL
    approval_endpoint: String,
    /// Time to wait for response headers on a turn
    request_timeout: Duration,
    auth_token: Option<String>,
    username: Option<String>,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpAgentTransport {
    /// Create a transport for the given endpoints
    pub fn new(
        endpoint: impl Into<String>,
        approval_endpoint: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            approval_endpoint: approval_endpoint.into(),
            request_timeout,
            auth_token: None,
            username: None,
            // No overall timeout on turns
            http_client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .expect("Failed to create HTTP client"),
        }
    }

    /// Create from the `[agent]` configuration section
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        let mut transport = Self::new(
            config.endpoint.clone(),
            config.approval_endpoint(),
            config.request_timeout,
        );
        transport.auth_token = config.auth_token.clone();
        transport.username = config.username.clone();
        transport
    }

    /// Send `Authorization: Bearer <token>`
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Send `X-Username: <name>`
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Turn endpoint URL
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Approval endpoint URL
    #[must_use]
    pub fn approval_endpoint(&self) -> &str {
        &self.approval_endpoint
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http_client.post(url);
        if let Some(ref token) = self.auth_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref username) = self.username {
            builder = builder.header("X-Username", username);
        }
        builder
    }
}

impl std::fmt::Debug for HttpAgentTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpAgentTransport")
            .field("endpoint", &self.endpoint)
            .field("approval_endpoint", &self.approval_endpoint)
            .field("request_timeout", &self.request_timeout)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .finish()
    }
}

fn request_error(e: &reqwest::Error) -> TransportError {
    TransportError::Request(e.to_string())
}

#[async_trait]
impl AgentTransport for HttpAgentTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn open_turn(&self, request: &TurnRequest) -> Result<ChunkReceiver, TransportError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            has_session = request.session_id.is_some(),
            "Opening agent turn"
        );

        let send = self
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send();

        let response = tokio::time::timeout(self.request_timeout, send)
            .await
            .map_err(|_| TransportError::Timeout(self.request_timeout.as_secs()))?
            .map_err(|e| request_error(&e))?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, &body));
        }

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_SIZE);
        let mut stream = response.bytes_stream();

        // Spawn task to forward the body
        tokio::spawn(async move {
            while let Some(chunk) = stream.next().await {
                let item = chunk
                    .map(|bytes| bytes.to_vec())
                    .map_err(|e| TransportError::Stream(e.to_string()));
                let failed = item.is_err();

                if tx.send(item).await.is_err() {
                    // Receiver dropped, abandon the response
                    tracing::debug!("Turn receiver dropped, abandoning response body");
                    return;
                }
                if failed {
                    return;
                }
            }
        });

        Ok(rx)
    }

    async fn submit_approval(&self, decision: &ApprovalDecision) -> Result<(), TransportError> {
        let response = self
            .post(&self.approval_endpoint)
            .timeout(APPROVAL_TIMEOUT)
            .json(decision)
            .send()
            .await
            .map_err(|e| request_error(&e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(TransportError::ApprovalNotFound);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status.as_u16(), &body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_derives_approval_endpoint() {
        let config = AgentConfig {
            endpoint: "https://k13d.example.com/api/chat/agentic".to_string(),
            username: Some("alice".to_string()),
            ..AgentConfig::default()
        };

        let transport = HttpAgentTransport::from_config(&config);
        assert_eq!(
            transport.endpoint(),
            "https://k13d.example.com/api/chat/agentic"
        );
        assert_eq!(
            transport.approval_endpoint(),
            "https://k13d.example.com/api/tool/approve"
        );
        assert_eq!(transport.name(), "http");
    }

    #[test]
    fn test_debug_redacts_token() {
        let transport = HttpAgentTransport::new(
            "http://localhost:8080/api/chat/agentic",
            "http://localhost:8080/api/tool/approve",
            Duration::from_secs(5),
        )
        .with_auth_token("super-secret")
        .with_username("bob");

        let debug = format!("{transport:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
        assert!(debug.contains("bob"));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_request_error() {
        // Port 9 (discard) on localhost is expected to refuse connections
        let transport = HttpAgentTransport::new(
            "http://127.0.0.1:9/api/chat/agentic",
            "http://127.0.0.1:9/api/tool/approve",
            Duration::from_secs(5),
        );

        let request = TurnRequest {
            message: "hi".to_string(),
            session_id: None,
            language: None,
        };
        let result = transport.open_turn(&request).await;
        assert!(matches!(
            result,
            Err(TransportError::Request(_) | TransportError::Timeout(_))
        ));

        let decision = ApprovalDecision {
            id: "a".to_string(),
            approved: true,
        };
        assert!(transport.submit_approval(&decision).await.is_err());
    }
}

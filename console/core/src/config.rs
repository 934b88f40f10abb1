//! TOML Configuration File Support
//!
//! Centralized configuration loading for the console, from a TOML file at
//! `~/.config/k13d/console.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/k13d/console.toml` (typically `~/.config/k13d/console.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! [agent]
//! endpoint = "http://localhost:8080/api/chat/agentic"
//! approval_endpoint = "http://localhost:8080/api/tool/approve"
//! request_timeout_secs = 300
//! auth_token = "..."
//! username = "alice"
//! language = "en"
//!
//! [guardrail]
//! strict = false
//!
//! [session]
//! instance = "default"
//! persist = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default agent turn endpoint
pub const DEFAULT_AGENT_ENDPOINT: &str = "http://localhost:8080/api/chat/agentic";

/// Path of the approval endpoint relative to the agent's origin
pub const APPROVAL_PATH: &str = "/api/tool/approve";

/// Default time to wait for the agent to start responding
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Agent section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentToml {
    /// Agent turn endpoint URL
    pub endpoint: Option<String>,

    /// Approval resolution endpoint URL
    pub approval_endpoint: Option<String>,

    /// Seconds to wait for the agent to start responding
    pub request_timeout_secs: Option<u64>,

    /// Bearer token sent with every request
    pub auth_token: Option<String>,

    /// Value of the `X-Username` header
    pub username: Option<String>,

    /// Preferred response language
    pub language: Option<String>,
}

/// Guardrail section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailToml {
    /// Block critical messages instead of asking
    pub strict: Option<bool>,
}

/// Session section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionToml {
    /// Instance name keying the persisted session
    pub instance: Option<String>,

    /// Whether to persist the session id across restarts
    pub persist: Option<bool>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleToml {
    /// Agent configuration section
    pub agent: AgentToml,

    /// Guardrail configuration section
    pub guardrail: GuardrailToml,

    /// Session configuration section
    pub session: SessionToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Agent connection settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    /// Agent turn endpoint URL
    pub endpoint: String,

    /// Explicit approval endpoint; derived from `endpoint` when `None`
    pub approval_endpoint: Option<String>,

    /// Time to wait for the agent to start responding
    pub request_timeout: Duration,

    /// Bearer token
    pub auth_token: Option<String>,

    /// `X-Username` header value
    pub username: Option<String>,

    /// Preferred response language
    pub language: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_AGENT_ENDPOINT.to_string(),
            approval_endpoint: None,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            auth_token: None,
            username: None,
            language: None,
        }
    }
}

impl AgentConfig {
    /// Effective approval endpoint
    ///
    /// Defaults to the agent endpoint's origin plus `/api/tool/approve`.
    #[must_use]
    pub fn approval_endpoint(&self) -> String {
        match &self.approval_endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("{}{APPROVAL_PATH}", endpoint_origin(&self.endpoint)),
        }
    }
}

/// `scheme://host[:port]` part of a URL
fn endpoint_origin(url: &str) -> &str {
    let Some(scheme_end) = url.find("://") else {
        return url.trim_end_matches('/');
    };
    let authority_start = scheme_end + 3;
    match url[authority_start..].find('/') {
        Some(path_start) => &url[..authority_start + path_start],
        None => url,
    }
}

/// Whether `url` is an absolute http(s) URL with a host
fn is_http_url(url: &str) -> bool {
    ["http://", "https://"].iter().any(|scheme| {
        url.strip_prefix(scheme)
            .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'))
    })
}

/// Guardrail settings
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GuardrailConfig {
    /// Block critical messages instead of asking
    pub strict: bool,
}

/// Session persistence settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Instance name keying the persisted session
    pub instance: String,

    /// Whether to persist the session id across restarts
    pub persist: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            instance: "default".to_string(),
            persist: true,
        }
    }
}

/// Centralized configuration for the console
///
/// Consolidates configuration from multiple sources and tracks where it came
/// from. Use [`load_config`] to load configuration with proper priority.
#[derive(Clone, Debug, Default)]
pub struct ConsoleConfig {
    /// Agent connection
    pub agent: AgentConfig,

    /// Guardrail behavior
    pub guardrail: GuardrailConfig,

    /// Session persistence
    pub session: SessionConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl ConsoleConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check endpoint URLs and numeric limits
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_http_url(&self.agent.endpoint) {
            return Err(ConfigError::ValidationError(format!(
                "agent.endpoint must be an http(s) URL, got {:?}",
                self.agent.endpoint
            )));
        }
        if let Some(endpoint) = &self.agent.approval_endpoint {
            if !is_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "agent.approval_endpoint must be an http(s) URL, got {endpoint:?}"
                )));
            }
        }
        if self.agent.request_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "agent.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.session.instance.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "session.instance must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/k13d/console.toml` or
/// `~/.config/k13d/console.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("k13d").join("console.toml"))
}

/// Load configuration from all sources with proper priority
///
/// CLI arguments are not handled here; apply [`ConfigOverrides`] afterwards.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// merged values fail validation. A missing config file is not an error.
pub fn load_config() -> Result<ConsoleConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ConsoleConfig, ConfigError> {
    let mut config = ConsoleConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ConsoleToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    // Environment overrides file values
    apply_env_config(&mut config);

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ConsoleConfig, toml: &ConsoleToml) {
    if let Some(ref endpoint) = toml.agent.endpoint {
        config.agent.endpoint = endpoint.clone();
    }
    if let Some(ref endpoint) = toml.agent.approval_endpoint {
        config.agent.approval_endpoint = Some(endpoint.clone());
    }
    if let Some(secs) = toml.agent.request_timeout_secs {
        config.agent.request_timeout = Duration::from_secs(secs);
    }
    if let Some(ref token) = toml.agent.auth_token {
        config.agent.auth_token = Some(token.clone());
    }
    if let Some(ref username) = toml.agent.username {
        config.agent.username = Some(username.clone());
    }
    if let Some(ref language) = toml.agent.language {
        config.agent.language = Some(language.clone());
    }

    if let Some(strict) = toml.guardrail.strict {
        config.guardrail.strict = strict;
    }

    if let Some(ref instance) = toml.session.instance {
        config.session.instance = instance.clone();
    }
    if let Some(persist) = toml.session.persist {
        config.session.persist = persist;
    }
}

fn env_flag(value: &str) -> bool {
    value != "0" && value.to_lowercase() != "false"
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ConsoleConfig) {
    if let Ok(endpoint) = std::env::var("K13D_AGENT_ENDPOINT") {
        config.agent.endpoint = endpoint;
        config.source = ConfigSource::Env;
    }
    if let Ok(endpoint) = std::env::var("K13D_APPROVAL_ENDPOINT") {
        config.agent.approval_endpoint = Some(endpoint);
        config.source = ConfigSource::Env;
    }
    if let Ok(timeout) = std::env::var("K13D_REQUEST_TIMEOUT") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.agent.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(token) = std::env::var("K13D_AUTH_TOKEN") {
        config.agent.auth_token = Some(token);
        config.source = ConfigSource::Env;
    }
    if let Ok(username) = std::env::var("K13D_USERNAME") {
        config.agent.username = Some(username);
        config.source = ConfigSource::Env;
    }
    if let Ok(strict) = std::env::var("K13D_GUARDRAIL_STRICT") {
        config.guardrail.strict = env_flag(&strict);
        config.source = ConfigSource::Env;
    }
    if let Ok(instance) = std::env::var("K13D_SESSION_INSTANCE") {
        config.session.instance = instance;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`], then call [`ConsoleConfig::validate`].
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Agent endpoint override
    pub endpoint: Option<String>,

    /// Strict guardrail override
    pub strict: Option<bool>,

    /// Session instance override
    pub instance: Option<String>,

    /// Session persistence override
    pub persist: Option<bool>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set agent endpoint override
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set strict guardrail override
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    /// Set session instance override
    #[must_use]
    pub fn with_instance(mut self, instance: String) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Set session persistence override
    #[must_use]
    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ConsoleConfig) {
        if self.endpoint.is_some()
            || self.strict.is_some()
            || self.instance.is_some()
            || self.persist.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref endpoint) = self.endpoint {
            config.agent.endpoint = endpoint.clone();
        }
        if let Some(strict) = self.strict {
            config.guardrail.strict = strict;
        }
        if let Some(ref instance) = self.instance {
            config.session.instance = instance.clone();
        }
        if let Some(persist) = self.persist {
            config.session.persist = persist;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

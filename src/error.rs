//! Error types for the answer-checker harness

use std::io;

use thiserror::Error;

/// Result type alias for the harness
pub type Result<T> = std::result::Result<T, Error>;

/// Harness errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scenario (test case) loading or validation error
    #[error("Scenario error: {0}")]
    Scenario(String),

    /// Agent endpoint not reachable or request failed
    #[error("Agent transport error: {0}")]
    Transport(String),

    /// Agent answered with an HTTP error status
    #[error("Agent returned HTTP {status}: {body}")]
    AgentStatus {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// Stub server failed to start
    #[error("Stub server start failed: {0}")]
    StubStart(String),

    /// Report writing error
    #[error("Report error: {0}")]
    Report(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether a retry against the agent could succeed.
    ///
    /// Only connect-level failures are retried; HTTP status errors are
    /// answers, not transport faults.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Io(_) => true,
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

// Error types for the resolution engine

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::extractors::BlockingReason;

/// Classification that drives the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or malformed identifier/query, rejected before any attempt
    InvalidInput,

    /// Network error or timeout, another profile may succeed
    Transient,

    /// Upstream refused this particular client profile
    ClientRejected,

    /// Upstream anti-automation response
    BotDetected,

    /// Content permanently unresolvable, the chain stops
    Fatal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Transient => "transient",
            Self::ClientRejected => "client_rejected",
            Self::BotDetected => "bot_detected",
            Self::Fatal => "fatal",
        }
    }

    /// Whether the resolver should move on to the next profile
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transient | Self::ClientRejected | Self::BotDetected
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a single extraction attempt
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ExtractError {
    pub kind: FailureKind,
    pub reason: Option<BlockingReason>,
    pub message: String,
}

impl ExtractError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            reason: None,
            message: message.into(),
        }
    }

    pub fn with_reason(mut self, reason: BlockingReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            FailureKind::Transient,
            format!("Timed out after {:?}", after),
        )
        .with_reason(BlockingReason::NetworkTimeout)
    }

    pub fn no_playable_format() -> Self {
        Self::new(
            FailureKind::ClientRejected,
            "No playable format in extraction result",
        )
    }
}

/// Library-level errors surfaced before or around resolution
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{0}")]
    InvalidInput(String),
}

impl ResolveError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Invalid process configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("profile chain '{0}' is empty")]
    EmptyChain(&'static str),

    #[error("duplicate profile name '{0}' in chain '{1}'")]
    DuplicateProfile(String, &'static str),

    #[error("invalid classifier pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::Transient.is_retryable());
        assert!(FailureKind::ClientRejected.is_retryable());
        assert!(FailureKind::BotDetected.is_retryable());
        assert!(!FailureKind::Fatal.is_retryable());
        assert!(!FailureKind::InvalidInput.is_retryable());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::BotDetected).unwrap();
        assert_eq!(json, "\"bot_detected\"");
        assert_eq!(FailureKind::ClientRejected.to_string(), "client_rejected");
    }

    #[test]
    fn test_timeout_error_is_transient() {
        let err = ExtractError::timeout(Duration::from_secs(30));
        assert_eq!(err.kind, FailureKind::Transient);
        assert_eq!(err.reason, Some(BlockingReason::NetworkTimeout));
        assert!(err.to_string().contains("30s"));

        let err = ExtractError::timeout(Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
    }
}

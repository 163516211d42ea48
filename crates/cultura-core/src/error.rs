//! Error taxonomy for the AI interaction layer.
//!
//! Every failure that reaches a caller maps to one stable code plus a short
//! human-readable message. `Internal` keeps its detail for logs only.

use thiserror::Error;

/// Result alias used across the crate.
pub type AiResult<T> = Result<T, AiError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AiError {
    /// Malformed or missing required parameter.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Session or referenced entity is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Session existed but sat idle past its TTL. Distinct from `NotFound`
    /// so clients know to open a new session rather than fix the id.
    #[error("session expired: {0}")]
    SessionExpired(String),

    /// Session table full, or the rate-limit wait was cancelled / timed out.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Upstream reply failed the quality gate (only when it is enforced).
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Upstream call failure or unexpected fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AiError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AiError::InvalidInput(_) => "INVALID_INPUT",
            AiError::NotFound(_) => "NOT_FOUND",
            AiError::SessionExpired(_) => "SESSION_EXPIRED",
            AiError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            AiError::InvalidResponse(_) => "INVALID_RESPONSE",
            AiError::Internal(_) => "INTERNAL",
        }
    }

    /// Message safe to show to an end user. Internal detail never leaks.
    pub fn public_message(&self) -> String {
        match self {
            AiError::Internal(_) => "The assistant is temporarily unavailable. Please try again later.".to_string(),
            other => other.to_string(),
        }
    }

    /// True for the conditions a client may retry as-is (after backing off
    /// or re-creating the session).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AiError::ResourceExhausted(_)
                | AiError::NotFound(_)
                | AiError::SessionExpired(_)
                | AiError::InvalidResponse(_)
        )
    }
}

/// Failure reported by an external domain data source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("malformed source data: {0}")]
    Malformed(String),
}

impl From<SourceError> for AiError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound { entity, id } => AiError::NotFound(format!("{entity} {id}")),
            other => AiError::Internal(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for AiError {
    fn from(err: config::ConfigError) -> Self {
        AiError::InvalidInput(format!("configuration: {err}"))
    }
}

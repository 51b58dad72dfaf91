//! Error types for termagent
//!
//! Defines the crate-wide error enum plus a structured provider error
//! classification used by the retry layer. Uses `thiserror` for `Display`
//! and `Error` derivation.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured classification of LLM provider failures.
///
/// Categorizes transport and HTTP errors so the retry decorator can decide
/// without string matching. Only `RateLimit` and `Transient` are retried.
#[derive(Debug)]
pub enum ProviderError {
    /// 401/403 — invalid or rejected API key. Never retried.
    Auth(String),
    /// 429 — rate limit or quota pressure. Retried with backoff.
    RateLimit(String),
    /// 5xx, connection failures, read timeouts. Retried with backoff.
    Transient(String),
    /// Everything else (400, 404, malformed responses). Not retried.
    Other(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Transient(msg) => write!(f, "Transient error: {}", msg),
            ProviderError::Other(msg) => write!(f, "Provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if the request should be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_) | ProviderError::Transient(_)
        )
    }

    /// Classify an HTTP status code together with the response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let msg = format!("HTTP {}: {}", status, body);
        match status {
            401 | 403 => ProviderError::Auth(msg),
            429 => ProviderError::RateLimit(msg),
            500..=599 => ProviderError::Transient(msg),
            _ => ProviderError::Other(msg),
        }
    }
}

impl From<ProviderError> for AgentError {
    fn from(err: ProviderError) -> Self {
        AgentError::Provider(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for termagent operations.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Configuration errors (missing API key, bad flag values, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Classified provider failure, carried up from the gateway transport.
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// The session's cumulative spend reached the configured ceiling.
    #[error("Cost limit exceeded: ${used:.4} of ${limit:.2} spent")]
    CostLimitExceeded { used: f64, limit: f64 },

    /// Tool execution errors (bad arguments, runtime failures).
    #[error("Tool error: {0}")]
    Tool(String),

    /// A path argument resolved outside the session working directory.
    #[error("Path traversal: {0}")]
    PathTraversal(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A specialized `Result` type for termagent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::Config("missing API key".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing API key");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AgentError = io_err.into();
        assert!(matches!(err, AgentError::Io(_)));
    }

    #[test]
    fn test_cost_limit_display() {
        let err = AgentError::CostLimitExceeded {
            used: 100.1234,
            limit: 100.0,
        };
        assert_eq!(
            err.to_string(),
            "Cost limit exceeded: $100.1234 of $100.00 spent"
        );
    }

    #[test]
    fn test_provider_error_is_retryable() {
        assert!(ProviderError::RateLimit("429".into()).is_retryable());
        assert!(ProviderError::Transient("502".into()).is_retryable());

        assert!(!ProviderError::Auth("401".into()).is_retryable());
        assert!(!ProviderError::Other("400".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_from_status() {
        assert!(matches!(
            ProviderError::from_status(401, "bad key"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(403, "forbidden"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            ProviderError::from_status(429, "slow down"),
            ProviderError::RateLimit(_)
        ));
        assert!(matches!(
            ProviderError::from_status(500, "oops"),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, "busy"),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            ProviderError::from_status(400, "bad json"),
            ProviderError::Other(_)
        ));
        assert!(matches!(
            ProviderError::from_status(404, "no model"),
            ProviderError::Other(_)
        ));
    }

    #[test]
    fn test_provider_error_into_agent_error() {
        let pe = ProviderError::RateLimit("too fast".into());
        let ae: AgentError = pe.into();
        assert!(matches!(ae, AgentError::Provider(_)));
        assert!(ae.to_string().contains("Rate limit error"));
    }

    #[test]
    fn test_path_traversal_display() {
        let err = AgentError::PathTraversal("../../etc/passwd".to_string());
        assert_eq!(err.to_string(), "Path traversal: ../../etc/passwd");
    }
}

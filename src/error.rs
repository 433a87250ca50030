// src/error.rs
// Centralized error taxonomy for the orchestration engine.
// Retry policy hangs off `is_retryable`; callers never string-match messages.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Rate limit, timeout, or 5xx from the provider. Retried with backoff.
    #[error("transient provider error: {0}")]
    TransientProvider(String),

    /// Non-rate-limit 4xx from the provider. Surfaced immediately, no retry.
    #[error("permanent provider error: {0}")]
    PermanentProvider(String),

    /// A projected request cost would breach a daily or monthly ceiling.
    #[error("cost limit exceeded: {0}")]
    CostLimitExceeded(String),

    /// Dependency cycle in a workflow. Broken automatically, never fatal.
    #[error("dependency cycle detected in workflow {0}")]
    CycleDetected(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Operation attempted against a workflow whose current status forbids
    /// it (e.g. executing a cancelled workflow). Caller error, never retried.
    #[error("invalid workflow state: {0}")]
    InvalidWorkflowState(String),

    #[error("request not found: {0}")]
    RequestNotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether the retry loop in RequestClient should attempt again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TransientProvider(_))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        // Timeouts and connection drops are worth retrying; everything else
        // that reaches us without an HTTP status is a malformed request/response.
        if e.is_timeout() || e.is_connect() {
            EngineError::TransientProvider(e.to_string())
        } else if let Some(status) = e.status() {
            classify_status(status.as_u16(), e.to_string())
        } else {
            EngineError::PermanentProvider(e.to_string())
        }
    }
}

/// Map an HTTP status code onto the transient/permanent split.
/// 429 is the one 4xx that gets retried.
pub fn classify_status(status: u16, detail: String) -> EngineError {
    if status == 429 || status >= 500 {
        EngineError::TransientProvider(format!("HTTP {status}: {detail}"))
    } else {
        EngineError::PermanentProvider(format!("HTTP {status}: {detail}"))
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = classify_status(429, "rate limited".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        for status in [500, 502, 503, 504] {
            assert!(classify_status(status, String::new()).is_retryable());
        }
    }

    #[test]
    fn test_client_errors_are_permanent() {
        for status in [400, 401, 403, 404, 422] {
            let err = classify_status(status, String::new());
            assert!(!err.is_retryable(), "HTTP {status} must not be retried");
        }
    }

    #[test]
    fn test_cost_limit_not_retryable() {
        assert!(!EngineError::CostLimitExceeded("daily".into()).is_retryable());
    }
}

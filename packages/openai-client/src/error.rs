//! Error types for OpenAI client.

use thiserror::Error;

/// Result type for OpenAI client operations.
pub type Result<T> = std::result::Result<T, OpenAIError>;

/// OpenAI client errors.
#[derive(Debug, Error)]
pub enum OpenAIError {
    /// Configuration error (missing API key, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network error (connection failed, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete within the client timeout
    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Non-2xx response from the API
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The model declined to produce structured output
    #[error("Model refused: {0}")]
    Refusal(String),

    /// Parse error (invalid JSON, unexpected response format)
    #[error("Parse error: {0}")]
    Parse(String),
}

impl OpenAIError {
    /// Whether retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, rate limits and 5xx responses are
    /// transient; everything else is a caller or contract problem.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Config(_) | Self::Refusal(_) | Self::Parse(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(OpenAIError::Timeout { seconds: 60 }.is_transient());
        assert!(OpenAIError::Network("reset".into()).is_transient());
        assert!(OpenAIError::Api { status: 429, message: "slow down".into() }.is_transient());
        assert!(OpenAIError::Api { status: 503, message: "unavailable".into() }.is_transient());
        assert!(!OpenAIError::Api { status: 400, message: "bad schema".into() }.is_transient());
        assert!(!OpenAIError::Parse("eof".into()).is_transient());
        assert!(!OpenAIError::Config("no key".into()).is_transient());
    }
}

use crate::retry::Retryable;
use thiserror::Error;

/// Result alias used across the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors produced by the enrichment pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network failure that may succeed on another attempt
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// The remote side asked us to slow down
    #[error("Rate limited: {0}")]
    RateLimit(String),

    /// An LLM or provider reply that could not be parsed
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Nothing usable came back (no search hits, no URLs, every fetch failed)
    #[error("No results: {0}")]
    NoResults(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// WebDriver session could not be created or a command failed
    #[error("Browser error: {0}")]
    Browser(String),

    /// A record store line that is not a valid record
    #[error("Invalid record store: {0}")]
    InvalidStore(String),

    /// Provider rejected the request (4xx other than rate limiting)
    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Retryable for PipelineError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::TransientNetwork(_)
                | PipelineError::RateLimit(_)
                | PipelineError::Browser(_)
        )
    }

    fn backoff_multiplier(&self) -> u32 {
        match self {
            PipelineError::RateLimit(_) => 2,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) if status.as_u16() == 429 => PipelineError::RateLimit(e.to_string()),
            Some(status) if status.is_client_error() => PipelineError::Api(e.to_string()),
            _ if e.is_decode() => PipelineError::MalformedResponse(e.to_string()),
            _ => PipelineError::TransientNetwork(e.to_string()),
        }
    }
}

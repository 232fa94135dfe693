//! Error types for the extraction pipeline

use thiserror::Error;

/// Errors that can occur during extraction
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractorError {
    /// The text source produced no usable text
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The model call failed (network, provider, schema rejection)
    #[error("Model invocation failed: {0}")]
    ModelInvocation(String),

    /// The model output did not have the expected shape
    #[error("Invalid model output: {0}")]
    InvalidFormat(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// The model call exceeded the configured timeout
    #[error("Model invocation timed out after {0}s")]
    Timeout(u64),

    /// The run was cancelled by the caller
    #[error("Extraction cancelled")]
    Cancelled,

    /// No retries remain for the document
    #[error("Maximum retries exceeded ({0})")]
    RetriesExhausted(u32),

    /// No session exists for the document
    #[error("Unknown document: {0}")]
    UnknownDocument(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ExtractorError {
    /// Whether a manual retry could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ExtractorError::ModelInvocation(_)
                | ExtractorError::InvalidFormat(_)
                | ExtractorError::JsonParse(_)
                | ExtractorError::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::JsonParse(e.to_string())
    }
}

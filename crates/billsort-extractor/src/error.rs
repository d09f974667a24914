//! Error types for the Extractor

use thiserror::Error;

/// Errors that can occur inside an extraction strategy
///
/// These never cross the [`Extractor`](billsort_domain::traits::Extractor) trait:
/// strategies turn them into failure-tagged records.
#[derive(Error, Debug)]
pub enum ExtractorError {
    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Response did not contain a usable JSON object
    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ExtractorError {
    fn from(e: serde_json::Error) -> Self {
        ExtractorError::JsonParse(e.to_string())
    }
}

impl From<billsort_llm::LlmError> for ExtractorError {
    fn from(e: billsort_llm::LlmError) -> Self {
        ExtractorError::Llm(e.to_string())
    }
}

//! billsort LLM Provider Layer
//!
//! Pluggable LLM provider implementations.
//!
//! # Architecture
//!
//! This crate provides implementations of the `LlmProvider` trait from `billsort-domain`.
//! It supports multiple LLM backends with a common interface. Every provider is
//! synchronous: the pipeline calls them from blocking worker threads.
//!
//! # Providers
//!
//! - `MockProvider`: canned replies for tests, no network
//! - `OllamaProvider`: a local Ollama server
//! - `OpenAiCompatibleProvider`: OpenAI and DeepSeek chat-completions APIs
//! - `GeminiProvider`: the Google Gemini `generateContent` API
//!
//! # Examples
//!
//! ```
//! use billsort_llm::MockProvider;
//! use billsort_domain::traits::LlmProvider;
//!
//! let provider = MockProvider::new(r#"{"invoice_number": "24412000000000000001"}"#);
//! let reply = provider.generate("Extract the invoice fields").unwrap();
//! assert!(reply.contains("invoice_number"));
//! ```

#![warn(missing_docs)]

pub mod factory;
pub mod gemini;
mod image;
pub mod ollama;
pub mod openai;

use billsort_domain::traits::LlmProvider as LlmProviderTrait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

pub use factory::{build_provider, LlmSettings, ProviderKind, SharedProvider};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiCompatibleProvider;

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network or API communication error
    #[error("Communication error: {0}")]
    Communication(String),

    /// Invalid response from LLM
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Model not available
    #[error("Model not available: {0}")]
    ModelNotAvailable(String),

    /// Provider settings are unusable (missing key, bad URL)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Image could not be read for a vision request
    #[error("Image error: {0}")]
    Image(String),

    /// Generic error
    #[error("LLM error: {0}")]
    Other(String),
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<String, String>,
    errors: HashSet<String>,
    prompts: Vec<String>,
    call_count: usize,
}

/// Provider double that answers from a table of canned replies
///
/// Clones share state, so a test can keep a handle while an extractor owns another.
///
/// # Examples
///
/// ```
/// use billsort_llm::MockProvider;
/// use billsort_domain::traits::LlmProvider;
///
/// let provider = MockProvider::new("{}");
/// provider.add_response("invoice A", r#"{"seller_name": "Acme"}"#);
/// assert_eq!(provider.generate("invoice A").unwrap(), r#"{"seller_name": "Acme"}"#);
/// assert_eq!(provider.generate("invoice B").unwrap(), "{}");
/// ```
#[derive(Debug, Clone)]
pub struct MockProvider {
    default_response: String,
    image_response: Option<String>,
    available: bool,
    fail_all: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    /// Reply with `response` to every prompt without a specific entry
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: response.into(),
            image_response: None,
            available: true,
            fail_all: false,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Create a provider whose every call fails, as an unreachable backend would
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Use a distinct response for image requests
    pub fn with_image_response(mut self, response: impl Into<String>) -> Self {
        self.image_response = Some(response.into());
        self
    }

    /// Report the provider as unreachable from `is_available`
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reply to `prompt` with `response`
    pub fn add_response(&self, prompt: impl Into<String>, response: impl Into<String>) {
        self.state().responses.insert(prompt.into(), response.into());
    }

    /// Fail whenever `prompt` is sent
    pub fn add_error(&self, prompt: impl Into<String>) {
        self.state().errors.insert(prompt.into());
    }

    /// Requests served so far, text and image alike
    pub fn call_count(&self) -> usize {
        self.state().call_count
    }

    /// Every prompt received so far, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.state().prompts.clone()
    }

    fn respond(&self, prompt: &str, fallback: &str) -> Result<String, LlmError> {
        let mut state = self.state();
        state.call_count += 1;
        state.prompts.push(prompt.to_string());

        if self.fail_all || state.errors.contains(prompt) {
            return Err(LlmError::Communication(format!(
                "mock backend refused prompt ({} chars)",
                prompt.chars().count()
            )));
        }
        Ok(state
            .responses
            .get(prompt)
            .cloned()
            .unwrap_or_else(|| fallback.to_string()))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new("{}")
    }
}

impl LlmProviderTrait for MockProvider {
    type Error = LlmError;

    fn model_name(&self) -> &str {
        "mock"
    }

    fn generate(&self, prompt: &str) -> Result<String, Self::Error> {
        self.respond(prompt, &self.default_response)
    }

    fn generate_with_image(&self, prompt: &str, _image: &Path) -> Result<String, Self::Error> {
        let fallback = self
            .image_response
            .as_deref()
            .unwrap_or(&self.default_response);
        self.respond(prompt, fallback)
    }

    fn is_available(&self) -> bool {
        self.available && !self.fail_all
    }
}

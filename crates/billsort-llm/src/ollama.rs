//! Ollama Provider Implementation
//!
//! Provides integration with Ollama's local LLM API, for running local models
//! without sending documents to a third party.
//!
//! # Features
//!
//! - Blocking HTTP communication with the Ollama API
//! - Configurable endpoint, model and sampling options
//! - Vision requests with base64-encoded images
//! - Retry logic with exponential backoff
//!
//! # Examples
//!
//! ```no_run
//! use billsort_llm::OllamaProvider;
//! use billsort_domain::traits::LlmProvider;
//!
//! let provider = OllamaProvider::new("http://localhost:11434", "qwen2.5:7b").unwrap();
//! if provider.is_available() {
//!     let text = provider.generate("Say hello").unwrap();
//!     println!("{text}");
//! }
//! ```

use crate::{image, LlmError};
use billsort_domain::traits::LlmProvider as LlmProviderTrait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Default Ollama API endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b";

/// Default timeout for LLM requests; local models can be slow
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default number of attempts per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default cap on generated tokens
pub const DEFAULT_NUM_PREDICT: u32 = 2048;

const TAGS_TIMEOUT_SECS: u64 = 5;

/// Ollama API provider for local LLM inference
pub struct OllamaProvider {
    endpoint: String,
    model: String,
    client: reqwest::blocking::Client,
    max_retries: u32,
    temperature: f32,
    num_predict: u32,
}

/// Request body for Ollama generate API
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response from Ollama generate API
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelTag>,
}

#[derive(Deserialize)]
struct OllamaModelTag {
    #[serde(default)]
    name: String,
}

impl OllamaProvider {
    /// Create a new Ollama provider
    ///
    /// # Parameters
    ///
    /// - `endpoint`: Ollama API endpoint (e.g., "http://localhost:11434")
    /// - `model`: Model to use (e.g., "qwen2.5:7b", "llava")
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        Self::with_timeout(endpoint, model, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a new Ollama provider with an explicit request timeout
    pub fn with_timeout(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
            max_retries: DEFAULT_MAX_RETRIES,
            temperature: 0.1,
            num_predict: DEFAULT_NUM_PREDICT,
        })
    }

    /// Create a new Ollama provider against `http://localhost:11434`
    pub fn default_endpoint(model: impl Into<String>) -> Result<Self, LlmError> {
        Self::new(DEFAULT_ENDPOINT, model)
    }

    /// Set the maximum number of attempts per request
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Names of the models installed on the Ollama server; empty when unreachable
    pub fn list_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(TAGS_TIMEOUT_SECS))
            .send();

        match response {
            Ok(resp) if resp.status().is_success() => resp
                .json::<OllamaTagsResponse>()
                .map(|tags| tags.models.into_iter().map(|m| m.name).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn post_generate(&self, prompt: &str, images: Vec<String>) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.endpoint);
        let request_body = OllamaGenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            images,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.num_predict,
            },
        };

        // Retry logic with exponential backoff
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < self.max_retries {
            match self.client.post(&url).json(&request_body).send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<OllamaGenerateResponse>()
                            .map(|r| r.response)
                            .map_err(|e| {
                                LlmError::InvalidResponse(format!("Failed to parse response: {}", e))
                            });
                    } else if status == reqwest::StatusCode::NOT_FOUND {
                        return Err(LlmError::ModelNotAvailable(self.model.clone()));
                    } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(LlmError::RateLimitExceeded);
                    } else {
                        let error_text = response
                            .text()
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        last_error = Some(LlmError::Communication(format!(
                            "HTTP {}: {}",
                            status, error_text
                        )));
                    }
                }
                Err(e) => {
                    last_error = Some(LlmError::Communication(format!("Request failed: {}", e)));
                }
            }

            attempts += 1;
            if attempts < self.max_retries {
                // Exponential backoff: 1s, 2s, 4s, etc.
                let delay = Duration::from_secs(2u64.pow(attempts - 1));
                debug!(attempt = attempts, ?delay, "retrying Ollama request");
                std::thread::sleep(delay);
            }
        }

        let err = last_error
            .unwrap_or_else(|| LlmError::Communication("Max retries exceeded".to_string()));
        warn!(endpoint = %self.endpoint, error = %err, "Ollama request failed");
        Err(err)
    }
}

impl LlmProviderTrait for OllamaProvider {
    type Error = LlmError;

    fn model_name(&self) -> &str {
        &self.model
    }

    fn generate(&self, prompt: &str) -> Result<String, Self::Error> {
        self.post_generate(prompt, Vec::new())
    }

    fn generate_with_image(&self, prompt: &str, image_path: &Path) -> Result<String, Self::Error> {
        let encoded = image::encode_base64(image_path)?;
        self.post_generate(prompt, vec![encoded])
    }

    fn is_available(&self) -> bool {
        let models = self.list_models();
        if models.is_empty() {
            return false;
        }
        if model_matches(&self.model, &models) {
            return true;
        }
        warn!(model = %self.model, "model not pulled; run `ollama pull {}`", self.model);
        false
    }
}

/// True when `model` or its family (the part before `:`) is among `installed`
fn model_matches(model: &str, installed: &[String]) -> bool {
    let family = |name: &str| name.split(':').next().unwrap_or_default().to_string();
    let wanted = family(model);
    installed
        .iter()
        .any(|name| name == model || family(name) == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new("http://localhost:11434/", "qwen2.5:7b").unwrap();
        assert_eq!(provider.endpoint, "http://localhost:11434");
        assert_eq!(provider.model_name(), "qwen2.5:7b");
        assert_eq!(provider.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(provider.num_predict, DEFAULT_NUM_PREDICT);
    }

    #[test]
    fn test_ollama_provider_default_endpoint() {
        let provider = OllamaProvider::default_endpoint("mistral").unwrap();
        assert_eq!(provider.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(provider.model, "mistral");
    }

    #[test]
    fn test_ollama_provider_builders() {
        let provider = OllamaProvider::default_endpoint("llava")
            .unwrap()
            .with_max_retries(0)
            .with_temperature(0.5);
        assert_eq!(provider.max_retries, 1);
        assert_eq!(provider.temperature, 0.5);
    }

    #[test]
    fn test_model_matches_family() {
        let installed = vec!["qwen2.5:14b".to_string(), "llava:latest".to_string()];
        assert!(model_matches("qwen2.5:7b", &installed));
        assert!(model_matches("llava", &installed));
        assert!(!model_matches("mistral:7b", &installed));
    }

    #[test]
    fn test_request_serialization_omits_empty_images() {
        let body = OllamaGenerateRequest {
            model: "m",
            prompt: "p",
            stream: false,
            images: Vec::new(),
            options: OllamaOptions {
                temperature: 0.1,
                num_predict: 2048,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("images").is_none());
        assert_eq!(json["options"]["num_predict"], 2048);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_ollama_error_handling() {
        // Nothing listens on port 9; the request fails fast
        let provider = OllamaProvider::new("http://127.0.0.1:9", "qwen2.5:7b")
            .unwrap()
            .with_max_retries(1);

        let result = provider.generate("test");
        assert!(matches!(result, Err(LlmError::Communication(_))));
        assert!(!provider.is_available());
        assert!(provider.list_models().is_empty());
    }

    #[test]
    #[ignore] // Only run when Ollama is available
    fn test_ollama_generate_integration() {
        let provider = OllamaProvider::default_endpoint(DEFAULT_MODEL).unwrap();
        if let Ok(response) = provider.generate("Say 'hello' and nothing else") {
            assert!(!response.is_empty());
        }
    }
}

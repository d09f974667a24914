//! Provider selection from explicit settings

use crate::{
    gemini, ollama, openai, GeminiProvider, LlmError, OllamaProvider, OpenAiCompatibleProvider,
};
use billsort_domain::traits::LlmProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// A provider shared between the extractor and worker threads
pub type SharedProvider = Arc<dyn LlmProvider<Error = LlmError> + Send + Sync>;

/// Supported LLM backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Local Ollama server
    #[default]
    Ollama,
    /// OpenAI hosted API
    OpenAi,
    /// DeepSeek hosted API
    DeepSeek,
    /// Google Gemini API
    Gemini,
}

impl ProviderKind {
    /// Model used when none is configured
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Ollama => ollama::DEFAULT_MODEL,
            Self::OpenAi => "gpt-4o-mini",
            Self::DeepSeek => "deepseek-chat",
            Self::Gemini => gemini::DEFAULT_MODEL,
        }
    }

    /// Request timeout used when none is configured
    pub fn default_timeout_secs(self) -> u64 {
        match self {
            Self::Ollama => ollama::DEFAULT_TIMEOUT_SECS,
            Self::OpenAi | Self::DeepSeek => openai::DEFAULT_TIMEOUT_SECS,
            Self::Gemini => gemini::DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Base URL used when none is configured
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => ollama::DEFAULT_ENDPOINT,
            Self::OpenAi => openai::OPENAI_BASE_URL,
            Self::DeepSeek => openai::DEEPSEEK_BASE_URL,
            Self::Gemini => gemini::GEMINI_BASE_URL,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
            Self::DeepSeek => "deepseek",
            Self::Gemini => "gemini",
        };
        f.write_str(name)
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            "gemini" => Ok(Self::Gemini),
            other => Err(format!(
                "unknown LLM provider '{}' (expected ollama, openai, deepseek or gemini)",
                other
            )),
        }
    }
}

/// Settings for constructing an LLM provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Which backend to talk to
    pub provider: ProviderKind,
    /// Model name; the provider's default when unset
    pub model: Option<String>,
    /// API key for hosted providers
    pub api_key: Option<String>,
    /// Override for the provider's base URL
    pub base_url: Option<String>,
    /// Request timeout in seconds; the provider's default when unset
    pub timeout_secs: Option<u64>,
    /// Attempts per request
    pub max_retries: u32,
    /// Sampling temperature
    pub temperature: f32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: None,
            api_key: None,
            base_url: None,
            timeout_secs: None,
            max_retries: 3,
            temperature: 0.1,
        }
    }
}

impl LlmSettings {
    /// The configured model, or the provider default
    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// The configured base URL, or the provider default
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
    }

    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(
            self.timeout_secs
                .unwrap_or_else(|| self.provider.default_timeout_secs()),
        )
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err("max_retries must be greater than 0".to_string());
        }
        if self.timeout_secs == Some(0) {
            return Err("timeout_secs must be greater than 0".to_string());
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err("temperature must be between 0.0 and 2.0".to_string());
        }
        Ok(())
    }
}

/// Build the provider described by `settings`
///
/// # Errors
///
/// Returns `LlmError::Configuration` when a hosted provider has no API key or the
/// HTTP client cannot be constructed. Reachability is not checked here; callers
/// use `is_available()` for that.
pub fn build_provider(settings: &LlmSettings) -> Result<SharedProvider, LlmError> {
    settings.validate().map_err(LlmError::Configuration)?;

    let model = settings.effective_model();
    let base_url = settings.effective_base_url();
    info!(provider = %settings.provider, model, base_url, "creating LLM provider");

    let provider: SharedProvider = match settings.provider {
        ProviderKind::Ollama => Arc::new(
            OllamaProvider::with_timeout(base_url, model, settings.timeout())?
                .with_max_retries(settings.max_retries)
                .with_temperature(settings.temperature),
        ),
        ProviderKind::OpenAi | ProviderKind::DeepSeek => Arc::new(
            OpenAiCompatibleProvider::new(base_url, api_key(settings)?, model, settings.timeout())?
                .with_max_retries(settings.max_retries)
                .with_temperature(settings.temperature),
        ),
        ProviderKind::Gemini => Arc::new(
            GeminiProvider::new(base_url, api_key(settings)?, model, settings.timeout())?
                .with_max_retries(settings.max_retries)
                .with_temperature(settings.temperature),
        ),
    };
    Ok(provider)
}

fn api_key(settings: &LlmSettings) -> Result<String, LlmError> {
    settings
        .api_key
        .clone()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| {
            LlmError::Configuration(format!("{} requires an API key", settings.provider))
        })
}

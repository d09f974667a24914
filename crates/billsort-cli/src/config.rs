//! Configuration management for the CLI.
//!
//! Settings are layered: the TOML file, then environment variables, then
//! command-line flags.

use crate::error::{CliError, Result};
use billsort_extractor::{ExtractionMode, ExtractorConfig};
use billsort_llm::{LlmSettings, ProviderKind};
use billsort_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable selecting the LLM provider
pub const ENV_PROVIDER: &str = "BILLSORT_LLM_PROVIDER";
/// Environment variable selecting the model
pub const ENV_MODEL: &str = "BILLSORT_LLM_MODEL";
/// Environment variable selecting the extraction mode
pub const ENV_MODE: &str = "BILLSORT_EXTRACTION_MODE";

/// CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// LLM provider settings
    pub llm: LlmSettings,

    /// Extraction strategy settings
    pub extractor: ExtractorConfig,

    /// Batch pipeline settings
    pub pipeline: PipelineConfig,

    /// Log filter used when `RUST_LOG` is unset
    pub log_level: String,

    /// Output settings
    pub settings: Settings,
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,

    /// Default output format
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format
    Table,
    /// JSON format
    Json,
    /// Quiet (minimal) format
    Quiet,
}

impl AppConfig {
    /// Get the default configuration file path.
    pub fn path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| CliError::Config("Could not find home directory".into()))?;
        Ok(home.join(".billsort").join("config.toml"))
    }

    /// Load configuration from `explicit`, or from the default path.
    ///
    /// A missing default file yields the defaults; a missing explicit file is an
    /// error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => match Self::path() {
                Ok(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };
        Self::from_toml(&fs::read_to_string(&path)?)
    }

    /// Parse a TOML document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    ///
    /// The provider is resolved first so that the matching API key variable is
    /// consulted.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(provider) = get(ENV_PROVIDER) {
            self.llm.provider = provider
                .parse::<ProviderKind>()
                .map_err(|e| CliError::Config(format!("{}: {}", ENV_PROVIDER, e)))?;
        }
        if let Some(model) = get(ENV_MODEL) {
            self.llm.model = Some(model);
        }
        if let Some(mode) = get(ENV_MODE) {
            self.extractor.mode = mode
                .parse::<ExtractionMode>()
                .map_err(|e| CliError::Config(format!("{}: {}", ENV_MODE, e)))?;
        }

        self.apply_credentials(&lookup);
        Ok(())
    }

    /// Fill the API key or base URL for the selected provider from `lookup`.
    ///
    /// Runs again after command-line flags change the provider.
    pub fn apply_credentials<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        match self.llm.provider {
            ProviderKind::OpenAi => {
                if let Some(key) = get("OPENAI_API_KEY") {
                    self.llm.api_key = Some(key);
                }
            }
            ProviderKind::DeepSeek => {
                if let Some(key) = get("DEEPSEEK_API_KEY") {
                    self.llm.api_key = Some(key);
                }
            }
            ProviderKind::Gemini => {
                if let Some(key) = get("GEMINI_API_KEY") {
                    self.llm.api_key = Some(key);
                }
            }
            ProviderKind::Ollama => {
                if let Some(url) = get("OLLAMA_BASE_URL") {
                    self.llm.base_url = Some(url);
                }
            }
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.llm
            .validate()
            .map_err(|e| CliError::Config(format!("llm: {}", e)))?;
        self.extractor
            .validate()
            .map_err(|e| CliError::Config(format!("extractor: {}", e)))?;
        self.pipeline
            .validate()
            .map_err(|e| CliError::Config(format!("pipeline: {}", e)))?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            extractor: ExtractorConfig::default(),
            pipeline: PipelineConfig::default(),
            log_level: "info".to_string(),
            settings: Settings::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            color: true,
            format: OutputFormat::Table,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_format() -> OutputFormat {
    OutputFormat::Table
}

//! Configuration for the Extractor

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which extraction strategy to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// LLM only
    Llm,
    /// LLM plus rule-based validation and completion
    #[default]
    Hybrid,
    /// Multimodal LLM reading images directly
    Vision,
    /// Regular expressions only; no backend required
    RegexFallback,
}

impl ExtractionMode {
    /// Whether this mode needs a reachable LLM provider
    pub fn needs_provider(self) -> bool {
        !matches!(self, Self::RegexFallback)
    }

    /// Stable lower-case name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Hybrid => "hybrid",
            Self::Vision => "vision",
            Self::RegexFallback => "regex_fallback",
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtractionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "llm" => Ok(Self::Llm),
            "hybrid" => Ok(Self::Hybrid),
            "vision" => Ok(Self::Vision),
            "regex" | "regex_fallback" => Ok(Self::RegexFallback),
            other => Err(format!(
                "unknown extraction mode '{}' (expected llm, hybrid, vision or regex_fallback)",
                other
            )),
        }
    }
}

/// Configuration for the Extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Strategy to build
    pub mode: ExtractionMode,

    /// Maximum document text embedded in a prompt (characters)
    pub max_text_length: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            mode: ExtractionMode::Hybrid,
            max_text_length: 10_000,
        }
    }
}

impl ExtractorConfig {
    /// Configuration for a specific mode with default limits
    pub fn with_mode(mode: ExtractionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_text_length == 0 {
            return Err("max_text_length must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize to TOML: {}", e))
    }
}

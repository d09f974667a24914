//! Cheap checks that keep obvious non-invoices away from the extractor

use crate::config::PipelineConfig;
use tracing::debug;

/// Size and keyword gate applied before any extraction
#[derive(Debug, Clone)]
pub struct PreFilter {
    max_file_size_bytes: u64,
    keywords: Vec<String>,
    min_hits: usize,
}

impl PreFilter {
    /// Create a filter
    pub fn new(max_file_size_bytes: u64, keywords: Vec<String>, min_hits: usize) -> Self {
        Self {
            max_file_size_bytes,
            keywords,
            min_hits,
        }
    }

    /// Filter with the thresholds of `config`
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.max_file_size_bytes(),
            config.invoice_keywords.clone(),
            config.min_keyword_hits,
        )
    }

    /// Whether a file of `size` bytes exceeds the limit
    pub fn is_oversized(&self, size: u64) -> bool {
        size > self.max_file_size_bytes
    }

    /// Number of distinct keywords present in `text`
    pub fn keyword_hits(&self, text: &str) -> usize {
        self.keywords
            .iter()
            .filter(|keyword| !keyword.is_empty() && text.contains(keyword.as_str()))
            .count()
    }

    /// Whether `text` carries enough invoice signal to be worth extracting
    pub fn looks_like_invoice(&self, text: &str) -> bool {
        let hits = self.keyword_hits(text);
        debug!(hits, required = self.min_hits, "keyword pre-filter");
        hits >= self.min_hits
    }

    /// Human-readable skip reason for an oversized file
    pub fn oversized_reason(&self, size: u64) -> String {
        format!(
            "file too large ({:.1} MB, limit {} MB)",
            size as f64 / (1024.0 * 1024.0),
            self.max_file_size_bytes / (1024 * 1024)
        )
    }
}

impl Default for PreFilter {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

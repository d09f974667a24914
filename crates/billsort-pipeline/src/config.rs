//! Configuration for pipeline runs
//!
//! Batch sizing, worker count, pre-filter thresholds and output naming.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The keywords whose presence marks text as invoice-like
pub const DEFAULT_INVOICE_KEYWORDS: [&str; 8] = [
    "发票",
    "税号",
    "纳税人识别号",
    "价税合计",
    "税额",
    "开票日期",
    "发票代码",
    "发票号码",
];

/// Configuration for the batch pipeline
///
/// # Examples
///
/// ```
/// use billsort_pipeline::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.batch_size, 10);
/// assert_eq!(config.max_workers, 1);
///
/// let config = PipelineConfig::throughput();
/// assert!(config.max_workers > 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Files per batch; reports and copies are committed after every batch
    /// Default: 10
    pub batch_size: usize,

    /// Concurrent extractions within a batch
    /// Default: 1 (sequential)
    pub max_workers: usize,

    /// Files larger than this are skipped without extraction
    /// Default: 5
    pub max_file_size_mb: u64,

    /// Keywords used by the text pre-filter
    pub invoice_keywords: Vec<String>,

    /// Distinct keywords a text must contain to reach the extractor
    /// Default: 2
    pub min_keyword_hits: usize,

    /// Shortest identifier accepted into the report and the file tree
    /// Default: 6
    pub min_identifier_len: usize,

    /// How often a locked report is re-checked when no callback is supplied
    /// Default: 1000
    pub lock_poll_interval_ms: u64,

    /// Merge successful records into the report after each batch
    pub generate_report: bool,

    /// Copy successful files into the seller/buyer tree after each batch
    pub classify_files: bool,

    /// Report file name inside the output folder
    pub report_file_name: String,

    /// Output folder name used when none is given; also never scanned for input
    pub output_dir_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_workers: 1,
            max_file_size_mb: 5,
            invoice_keywords: DEFAULT_INVOICE_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            min_keyword_hits: 2,
            min_identifier_len: 6,
            lock_poll_interval_ms: 1000,
            generate_report: true,
            classify_files: true,
            report_file_name: "invoice_report.csv".to_string(),
            output_dir_name: "processed".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Small batches, one worker
    ///
    /// Suited to slow local models and to folders on network shares, where
    /// committing often matters more than speed.
    pub fn conservative() -> Self {
        Self {
            batch_size: 5,
            max_workers: 1,
            ..Self::default()
        }
    }

    /// Larger batches, several workers
    ///
    /// Suited to hosted APIs that tolerate parallel requests.
    pub fn throughput() -> Self {
        Self {
            batch_size: 20,
            max_workers: 4,
            ..Self::default()
        }
    }

    /// Size limit in bytes
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    /// Lock poll interval as Duration
    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".to_string());
        }
        if self.max_file_size_mb == 0 {
            return Err("max_file_size_mb must be greater than 0".to_string());
        }
        if self.min_keyword_hits > self.invoice_keywords.len() {
            return Err(format!(
                "min_keyword_hits ({}) exceeds the number of keywords ({})",
                self.min_keyword_hits,
                self.invoice_keywords.len()
            ));
        }
        if self.report_file_name.trim().is_empty() {
            return Err("report_file_name must not be empty".to_string());
        }
        if self.output_dir_name.trim().is_empty() {
            return Err("output_dir_name must not be empty".to_string());
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

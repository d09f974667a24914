//! Terminal per-file results

use crate::Record;
use std::path::{Path, PathBuf};

/// How processing of a single file ended
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    /// A record was extracted
    Success(Record),
    /// Processing failed with a human-readable reason
    Failed(String),
    /// The file was deliberately not processed (too large, not an invoice)
    Skipped(String),
}

/// The single terminal result for one file in one run
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutcome {
    file_path: PathBuf,
    status: OutcomeStatus,
}

impl ProcessingOutcome {
    /// Successful extraction
    pub fn success(file_path: impl Into<PathBuf>, record: Record) -> Self {
        Self {
            file_path: file_path.into(),
            status: OutcomeStatus::Success(record),
        }
    }

    /// Failed processing
    pub fn failed(file_path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            status: OutcomeStatus::Failed(reason.into()),
        }
    }

    /// Skipped file
    pub fn skipped(file_path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            status: OutcomeStatus::Skipped(reason.into()),
        }
    }

    /// Path of the processed file
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Terminal status
    pub fn status(&self) -> &OutcomeStatus {
        &self.status
    }

    /// True only for `Success`
    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success(_))
    }

    /// True only for `Skipped`
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped(_))
    }

    /// The extracted record, when successful
    pub fn record(&self) -> Option<&Record> {
        match &self.status {
            OutcomeStatus::Success(record) => Some(record),
            _ => None,
        }
    }

    /// Failure or skip reason
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Failed(reason) | OutcomeStatus::Skipped(reason) => Some(reason),
            OutcomeStatus::Success(_) => None,
        }
    }

    /// Short status label (`success`, `failed`, `skipped`)
    pub fn label(&self) -> &'static str {
        match self.status {
            OutcomeStatus::Success(_) => "success",
            OutcomeStatus::Failed(_) => "failed",
            OutcomeStatus::Skipped(_) => "skipped",
        }
    }
}

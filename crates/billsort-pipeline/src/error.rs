//! Error types for the pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a run
///
/// Per-file problems never surface here; they become text on the file's
/// `ProcessingOutcome`.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source folder could not be enumerated
    #[error("Cannot read source folder {path}: {source}")]
    SourceUnreadable {
        /// Folder that was requested
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The output folder could not be created
    #[error("Cannot create output folder {path}: {source}")]
    OutputUncreatable {
        /// Folder that was requested
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error outside the per-file boundary
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from merging a batch into the report store
#[derive(Error, Debug)]
pub enum ReportError {
    /// The batch contained no rows that qualify for the report
    #[error("No valid records to write")]
    NoValidRecords,

    /// The lock callback gave up while the report was held by another program
    #[error("User cancelled, file still locked: {0}")]
    Cancelled(PathBuf),

    /// Reading or writing the CSV document failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Replacing the report with the merged rows failed
    #[error("Failed to replace report: {0}")]
    Persist(String),

    /// Other I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tempfile::PersistError> for ReportError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Persist(err.error.to_string())
    }
}

//! billsort Pipeline
//!
//! The resumable, concurrent batch pipeline that turns a folder of invoices
//! into a deduplicated report and a classified file tree.
//!
//! # Overview
//!
//! - **Discovery**: every supported file under the source folder, sorted, with
//!   the output folder excluded
//! - **Progress ledger**: a JSON document recording each attempted file, so an
//!   interrupted run can be resumed without repeating finished work
//! - **Batches**: pending files are processed in fixed-size batches on a
//!   bounded worker pool; reports and copies are committed after every batch
//! - **Report merger**: a CSV report deduplicated by invoice number, where the
//!   latest record for a number wins; waits out locks held by other programs
//! - **Classifier**: copies each invoice into `output/<seller>/<buyer>/`
//!
//! # Architecture
//!
//! ```text
//! discover ─► ledger.pending ─► batch ─┬─► worker ─► FileProcessor ─► ledger.record
//!                                      ├─► worker ─► ...
//!                                      └─► (batch done) ─► classify ─► report.append
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use billsort_domain::traits::Extractor;
//! use billsort_extractor::RegexFallbackExtractor;
//! use billsort_pipeline::{Orchestrator, PipelineConfig, RunOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let extractor: Arc<dyn Extractor> = Arc::new(RegexFallbackExtractor::new());
//!     let orchestrator = Orchestrator::new(PipelineConfig::default(), extractor)?;
//!
//!     let result = orchestrator
//!         .run(RunOptions::new("invoices").with_resume(true))
//!         .await?;
//!     println!("{}", result.stats.summary());
//!     Ok(())
//! }
//! ```
//!
//! # Configuration
//!
//! ```toml
//! batch_size = 10
//! max_workers = 1
//! max_file_size_mb = 5
//! min_keyword_hits = 2
//! min_identifier_len = 6
//! lock_poll_interval_ms = 1000
//! generate_report = true
//! classify_files = true
//! report_file_name = "invoice_report.csv"
//! output_dir_name = "processed"
//! ```

#![warn(missing_docs)]

mod classifier;
mod config;
mod decode;
mod error;
mod ledger;
mod orchestrator;
mod prefilter;
mod report;
mod stats;

pub use classifier::{
    copy_preserving_metadata, sanitize_folder_name, unique_destination, ClassifyTotals, Classifier,
    UNKNOWN_BUYER, UNKNOWN_SELLER,
};
pub use config::{PipelineConfig, DEFAULT_INVOICE_KEYWORDS};
pub use decode::{DecoderRegistry, OfdDecoder, PdfDecoder, XmlDecoder};
pub use error::{PipelineError, ReportError};
pub use ledger::{
    canonical_key, ProgressInfo, ProgressLedger, ProgressState, RunSettings, LEDGER_FILE_NAME,
};
pub use orchestrator::{
    FileProcessor, Orchestrator, ProgressCallback, ReportTotals, RunOptions, RunResult, StopFlag,
};
pub use prefilter::PreFilter;
pub use report::{
    count_rows, is_reportable_identifier, read_rows, AppendProbe, LockCallback, LockProbe,
    ReportMerger, ReportRow, REPORT_COLUMNS,
};
pub use stats::RunStats;

//! Batch orchestrator: discover, batch, extract, merge, classify
//!
//! A run walks the source folder, asks the ledger which files are still
//! pending, and works through them in fixed-size batches. Files in a batch
//! are extracted on a bounded pool of blocking workers; each outcome is written
//! to the ledger the moment it resolves. Once the whole batch is in, its
//! records are merged into the report and copied into the classified tree
//! before the next batch starts.

use crate::classifier::{ClassifyTotals, Classifier};
use crate::config::PipelineConfig;
use crate::decode::DecoderRegistry;
use crate::error::PipelineError;
use crate::ledger::{canonical_key, ProgressLedger, RunSettings};
use crate::prefilter::PreFilter;
use crate::report::{count_rows, LockCallback, LockProbe, ReportMerger};
use crate::stats::RunStats;
use billsort_domain::traits::Extractor;
use billsort_domain::{FileKind, ProcessingOutcome};
use serde::Serialize;
use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

/// Called after every batch with `(files done, files pending at start, message)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &str) + Send + Sync>;

/// Cooperative cancellation shared between a run and whoever wants to stop it
///
/// Checked before each batch; files already in flight always finish.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// A flag that is not set
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop after the current batch
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run inputs
#[derive(Clone)]
pub struct RunOptions {
    /// Folder to scan
    pub source_root: PathBuf,
    /// Output folder; defaults to `<source>/<output_dir_name>`
    pub output_root: Option<PathBuf>,
    /// Continue an unfinished run when its ledger exists
    pub resume: bool,
    /// Extraction mode recorded in the ledger
    pub mode_label: String,
    /// Progress callback
    pub progress_cb: Option<ProgressCallback>,
    /// Asked whether to keep waiting while the report is locked
    pub lock_cb: Option<LockCallback>,
    /// Cooperative stop flag
    pub stop: StopFlag,
}

impl RunOptions {
    /// Options for scanning `source_root` with every default
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: None,
            resume: false,
            mode_label: String::new(),
            progress_cb: None,
            lock_cb: None,
            stop: StopFlag::new(),
        }
    }

    /// Write results to `output_root`
    pub fn with_output(mut self, output_root: impl Into<PathBuf>) -> Self {
        self.output_root = Some(output_root.into());
        self
    }

    /// Continue an unfinished run if there is one
    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }

    /// Record the extraction mode in the ledger
    pub fn with_mode_label(mut self, mode: impl Into<String>) -> Self {
        self.mode_label = mode.into();
        self
    }

    /// Report progress after every batch
    pub fn with_progress(mut self, cb: ProgressCallback) -> Self {
        self.progress_cb = Some(cb);
        self
    }

    /// Decide what to do while the report is locked
    pub fn with_lock_callback(mut self, cb: LockCallback) -> Self {
        self.lock_cb = Some(cb);
        self
    }

    /// Share a stop flag with the caller
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("source_root", &self.source_root)
            .field("output_root", &self.output_root)
            .field("resume", &self.resume)
            .field("mode_label", &self.mode_label)
            .field("stop", &self.stop.is_stopped())
            .finish_non_exhaustive()
    }
}

/// Size of the report after a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportTotals {
    /// Report location
    pub path: PathBuf,
    /// Rows in the report
    pub record_count: usize,
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunResult {
    /// One outcome per attempted file, by batch then position in batch
    pub outcomes: Vec<ProcessingOutcome>,
    /// Aggregate counts
    pub stats: RunStats,
    /// Classification counters, when classification is enabled
    pub classify_totals: Option<ClassifyTotals>,
    /// Final report size, when a report exists
    pub report_totals: Option<ReportTotals>,
    /// Output folder used
    pub output_root: PathBuf,
    /// False when the run was stopped before the pending set was exhausted
    pub completed: bool,
    /// Whether an unfinished run was continued
    pub resumed: bool,
    /// Files skipped because an earlier run already processed them
    pub previously_processed: usize,
}

/// Turns one file into one outcome; runs on a blocking worker thread
pub struct FileProcessor {
    extractor: Arc<dyn Extractor>,
    decoders: DecoderRegistry,
    prefilter: PreFilter,
}

impl FileProcessor {
    /// Create a processor
    pub fn new(extractor: Arc<dyn Extractor>, decoders: DecoderRegistry, prefilter: PreFilter) -> Self {
        Self {
            extractor,
            decoders,
            prefilter,
        }
    }

    /// Process a single file
    ///
    /// Never fails: every problem is described by the returned outcome.
    pub fn process(&self, path: &Path) -> ProcessingOutcome {
        if !path.exists() {
            return ProcessingOutcome::failed(path, format!("file not found: {}", path.display()));
        }
        let Some(kind) = FileKind::from_path(path) else {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            return ProcessingOutcome::failed(path, format!("unsupported file type: .{ext}"));
        };
        let size = match fs::metadata(path) {
            Ok(metadata) => metadata.len(),
            Err(e) => return ProcessingOutcome::failed(path, format!("cannot read file: {e}")),
        };
        if self.prefilter.is_oversized(size) {
            let reason = self.prefilter.oversized_reason(size);
            info!(file = %path.display(), "{}", reason);
            return ProcessingOutcome::skipped(path, reason);
        }

        info!(file = %path.display(), kind = %kind, "processing file");
        let record = if kind.is_image() {
            self.extractor.extract_from_image(path)
        } else {
            let Some(text) = self.decoders.decode(kind, path) else {
                return ProcessingOutcome::failed(path, "could not extract text");
            };
            if !self.prefilter.looks_like_invoice(&text) {
                info!(file = %path.display(), "no invoice keywords found, skipping");
                return ProcessingOutcome::skipped(path, "no invoice keywords found");
            }
            let file_name = path.file_name().map(|n| n.to_string_lossy());
            self.extractor.extract(&text, file_name.as_deref())
        };

        debug!(file = %path.display(), record = %record, "extracted");
        ProcessingOutcome::success(path, record)
    }
}

fn panic_reason(err: JoinError) -> String {
    if err.is_cancelled() {
        return "worker cancelled".to_string();
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("worker panicked: {message}")
}

/// Runs the pipeline over a folder
pub struct Orchestrator {
    config: PipelineConfig,
    processor: Arc<FileProcessor>,
    merger: ReportMerger,
    classifier: Classifier,
}

impl Orchestrator {
    /// Create an orchestrator using the standard decoders
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` when `config` fails validation.
    pub fn new(config: PipelineConfig, extractor: Arc<dyn Extractor>) -> Result<Self, PipelineError> {
        Self::with_decoders(config, extractor, DecoderRegistry::standard())
    }

    /// Create an orchestrator with a custom decoder registry
    pub fn with_decoders(
        config: PipelineConfig,
        extractor: Arc<dyn Extractor>,
        decoders: DecoderRegistry,
    ) -> Result<Self, PipelineError> {
        config.validate().map_err(PipelineError::Config)?;
        let processor = FileProcessor::new(extractor, decoders, PreFilter::from_config(&config));
        Ok(Self {
            merger: ReportMerger::new(config.min_identifier_len, config.lock_poll_interval()),
            classifier: Classifier::new(config.min_identifier_len),
            processor: Arc::new(processor),
            config,
        })
    }

    /// Replace how the report lock is detected
    pub fn with_lock_probe(mut self, probe: Arc<dyn LockProbe>) -> Self {
        self.merger = self.merger.with_probe(probe);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Output folder used for `options`
    pub fn output_root(&self, options: &RunOptions) -> PathBuf {
        options
            .output_root
            .clone()
            .unwrap_or_else(|| options.source_root.join(&self.config.output_dir_name))
    }

    /// Every supported file under `source_root`, sorted
    ///
    /// `output_root` and any folder named like the default output folder are
    /// never entered.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::SourceUnreadable` when `source_root` itself
    /// cannot be listed. Unreadable subfolders are logged and skipped.
    pub fn discover(&self, source_root: &Path, output_root: &Path) -> Result<Vec<PathBuf>, PipelineError> {
        let entries = fs::read_dir(source_root).map_err(|source| PipelineError::SourceUnreadable {
            path: source_root.to_path_buf(),
            source,
        })?;

        let excluded = canonical_key(output_root);
        let mut files = Vec::new();
        let mut pending_dirs = Vec::new();
        self.collect_entries(entries, &excluded, &mut files, &mut pending_dirs);

        while let Some(dir) = pending_dirs.pop() {
            match fs::read_dir(&dir) {
                Ok(entries) => self.collect_entries(entries, &excluded, &mut files, &mut pending_dirs),
                Err(e) => warn!(dir = %dir.display(), error = %e, "cannot read folder, skipping"),
            }
        }

        files.sort();
        info!(
            source = %source_root.display(),
            count = files.len(),
            "found supported files (including subfolders)"
        );
        Ok(files)
    }

    fn collect_entries(
        &self,
        entries: fs::ReadDir,
        excluded: &str,
        files: &mut Vec<PathBuf>,
        dirs: &mut Vec<PathBuf>,
    ) {
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "cannot read folder entry");
                    continue;
                }
            };
            let path = entry.path();
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

            if is_dir {
                let is_output = entry.file_name() == self.config.output_dir_name.as_str()
                    || canonical_key(&path) == excluded;
                if is_output {
                    debug!(dir = %path.display(), "skipping output folder");
                } else {
                    dirs.push(path);
                }
            } else if path.is_file() && FileKind::from_path(&path).is_some() {
                debug!(file = %path.display(), "found file");
                files.push(path);
            }
        }
    }

    /// Run the pipeline
    ///
    /// # Errors
    ///
    /// Only when the source folder cannot be listed or the output folder
    /// cannot be created. Everything else is reported per file or logged per
    /// batch.
    pub async fn run(&self, options: RunOptions) -> Result<RunResult, PipelineError> {
        let started = Instant::now();
        let output_root = self.output_root(&options);
        let all_files = self.discover(&options.source_root, &output_root)?;

        fs::create_dir_all(&output_root).map_err(|source| PipelineError::OutputUncreatable {
            path: output_root.clone(),
            source,
        })?;

        let ledger = Arc::new(ProgressLedger::new(&output_root));
        let resumed = options.resume && self.load_prior_run(&ledger, &options.source_root);
        let pending = if resumed && ledger.is_completed() {
            let pending = ledger.untried(&all_files);
            info!(new_files = pending.len(), "previous run finished, looking for new files only");
            if !pending.is_empty() {
                ledger.reopen(pending.len());
            }
            pending
        } else if resumed {
            let pending = ledger.pending(&all_files);
            info!(
                done = all_files.len() - pending.len(),
                pending = pending.len(),
                "resuming previous run"
            );
            pending
        } else {
            ledger.init(
                &options.source_root,
                all_files.len(),
                RunSettings {
                    extraction_mode: options.mode_label.clone(),
                    batch_size: self.config.batch_size,
                    max_workers: self.config.max_workers,
                    generate_report: self.config.generate_report,
                    classify_files: self.config.classify_files,
                },
            );
            all_files.clone()
        };
        let previously_processed = all_files.len() - pending.len();

        let mut result = RunResult {
            outcomes: Vec::new(),
            stats: RunStats::default(),
            classify_totals: self.config.classify_files.then(ClassifyTotals::default),
            report_totals: None,
            output_root: output_root.clone(),
            completed: true,
            resumed,
            previously_processed,
        };

        if pending.is_empty() {
            info!("no files to process");
            ledger.mark_complete();
            result.stats = RunStats::from_outcomes(&[], started.elapsed());
            if self.config.generate_report {
                result.report_totals = self.report_totals(&output_root);
            }
            return Ok(result);
        }

        let report_path = output_root.join(&self.config.report_file_name);
        let total = pending.len();
        let total_batches = total.div_ceil(self.config.batch_size);

        for (batch_index, batch) in pending.chunks(self.config.batch_size).enumerate() {
            if options.stop.is_stopped() {
                warn!(
                    done = result.outcomes.len(),
                    total,
                    "stop requested, leaving the run resumable"
                );
                result.completed = false;
                break;
            }

            let batch_num = batch_index + 1;
            info!("Processing batch {}/{} ({} files)", batch_num, total_batches, batch.len());

            let outcomes = self.run_batch(batch, &ledger).await;
            let batch_success = outcomes.iter().filter(|o| o.is_success()).count();

            if batch_success > 0 {
                if let Some(totals) = result.classify_totals.as_mut() {
                    let classified = self.classifier.classify(&outcomes, &output_root);
                    info!("Batch {}: copied {} files", batch_num, classified.copied);
                    totals.absorb(classified);
                }
                if self.config.generate_report {
                    match self
                        .merger
                        .append(&outcomes, &report_path, options.lock_cb.as_ref())
                        .await
                    {
                        Ok(rows) => info!("Batch {}: report now holds {} rows", batch_num, rows),
                        Err(e) => warn!("Batch {}: report not updated: {}", batch_num, e),
                    }
                }
            }

            result.outcomes.extend(outcomes);
            let done = result.outcomes.len();
            if let Some(cb) = &options.progress_cb {
                let message = format!("batch {batch_num}/{total_batches} complete");
                if catch_unwind(AssertUnwindSafe(|| cb(done, total, &message))).is_err() {
                    warn!("progress callback panicked, ignoring");
                }
            }
            info!(
                "Progress: {}/{} ({:.1}%)",
                done,
                total,
                done as f64 / total as f64 * 100.0
            );
        }

        if result.completed {
            ledger.mark_complete();
        }

        result.stats = RunStats::from_outcomes(&result.outcomes, started.elapsed());
        if self.config.generate_report {
            result.report_totals = self.report_totals(&output_root);
        }
        info!("Run finished:\n{}", result.stats.summary());
        Ok(result)
    }

    /// Load the ledger of an earlier run over the same source folder
    fn load_prior_run(&self, ledger: &ProgressLedger, source_root: &Path) -> bool {
        if !ledger.path().exists() || !ledger.load() {
            return false;
        }
        let recorded = ledger.snapshot().source_folder;
        let requested = canonical_key(source_root);
        if !recorded.is_empty() && recorded != requested {
            warn!(
                recorded = %recorded,
                requested = %requested,
                "ledger belongs to another source folder, starting fresh"
            );
            return false;
        }
        true
    }

    fn report_totals(&self, output_root: &Path) -> Option<ReportTotals> {
        let path = output_root.join(&self.config.report_file_name);
        if !path.exists() {
            return None;
        }
        count_rows(&path).map(|record_count| ReportTotals { path, record_count })
    }

    /// Extract one batch on the worker pool, recording every outcome as it lands
    async fn run_batch(&self, batch: &[PathBuf], ledger: &Arc<ProgressLedger>) -> Vec<ProcessingOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers));
        let mut tasks = JoinSet::new();

        for (index, path) in batch.iter().cloned().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let processor = Arc::clone(&self.processor);
            let ledger = Arc::clone(ledger);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    let outcome = ProcessingOutcome::failed(&path, "worker pool closed");
                    ledger.record(&path, false);
                    return (index, outcome);
                };

                let worker_path = path.clone();
                let worker_ledger = Arc::clone(&ledger);
                let joined = tokio::task::spawn_blocking(move || {
                    let outcome = processor.process(&worker_path);
                    worker_ledger.record(&worker_path, outcome.is_success());
                    outcome
                })
                .await;

                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        let reason = panic_reason(e);
                        error!(file = %path.display(), "{}", reason);
                        ledger.record(&path, false);
                        ProcessingOutcome::failed(&path, reason)
                    }
                };
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<ProcessingOutcome>> = vec![None; batch.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!(error = %e, "worker task failed"),
            }
        }

        slots
            .into_iter()
            .zip(batch)
            .map(|(slot, path)| {
                slot.unwrap_or_else(|| {
                    ledger.record(path, false);
                    ProcessingOutcome::failed(path, "worker task failed")
                })
            })
            .collect()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("merger", &self.merger)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billsort_domain::{Record, RecordFields};
    use tempfile::TempDir;

    struct EchoExtractor;

    impl Extractor for EchoExtractor {
        fn extract(&self, text: &str, _file_name: Option<&str>) -> Record {
            let number = text.lines().last().unwrap_or_default().trim().to_string();
            let fields = RecordFields {
                invoice_number: Some(number),
                ..RecordFields::default()
            };
            Record::new(fields, "echo")
        }

        fn extract_from_image(&self, _path: &Path) -> Record {
            panic!("image decoding exploded");
        }
    }

    fn processor() -> FileProcessor {
        FileProcessor::new(Arc::new(EchoExtractor), DecoderRegistry::standard(), PreFilter::default())
    }

    #[test]
    fn test_process_missing_and_unsupported() {
        let dir = TempDir::new().unwrap();
        let missing = processor().process(&dir.path().join("gone.pdf"));
        assert!(missing.error().unwrap().starts_with("file not found"));

        let txt = dir.path().join("notes.txt");
        fs::write(&txt, "x").unwrap();
        let outcome = processor().process(&txt);
        assert_eq!(outcome.error(), Some("unsupported file type: .txt"));
        assert!(!outcome.is_skipped());
    }

    #[test]
    fn test_process_text_paths() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.xml");
        fs::write(&good, "<i><a>发票</a><b>开票日期</b><n>A00001</n></i>").unwrap();
        let outcome = processor().process(&good);
        assert_eq!(outcome.record().unwrap().identifier(), Some("A00001"));

        let memo = dir.path().join("memo.xml");
        fs::write(&memo, "<i><a>会议纪要</a></i>").unwrap();
        let outcome = processor().process(&memo);
        assert!(outcome.is_skipped());

        let empty = dir.path().join("empty.xml");
        fs::write(&empty, "<i/>").unwrap();
        assert_eq!(processor().process(&empty).error(), Some("could not extract text"));
    }

    #[test]
    fn test_discover_skips_output_and_unsupported() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("2024/05")).unwrap();
        fs::create_dir_all(root.join("processed/乙公司")).unwrap();
        fs::create_dir_all(root.join("custom_out")).unwrap();
        for file in ["b.pdf", "a.XML", "2024/05/c.png", "notes.txt", "processed/乙公司/a.pdf", "custom_out/d.pdf"] {
            fs::write(root.join(file), "x").unwrap();
        }

        let orchestrator = Orchestrator::new(PipelineConfig::default(), Arc::new(EchoExtractor)).unwrap();
        let files = orchestrator.discover(root, &root.join("custom_out")).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["2024/05/c.png", "a.XML", "b.pdf"]);
    }

    #[test]
    fn test_discover_unreadable_source_is_fatal() {
        let orchestrator = Orchestrator::new(PipelineConfig::default(), Arc::new(EchoExtractor)).unwrap();
        let err = orchestrator
            .discover(Path::new("/nonexistent/in"), Path::new("/nonexistent/out"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnreadable { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            Orchestrator::new(config, Arc::new(EchoExtractor)),
            Err(PipelineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_worker_panic_becomes_failed_outcome() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("in");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("scan.png"), "png").unwrap();

        let orchestrator = Orchestrator::new(PipelineConfig::default(), Arc::new(EchoExtractor)).unwrap();
        let result = orchestrator.run(RunOptions::new(&source)).await.unwrap();

        assert_eq!(result.outcomes.len(), 1);
        let reason = result.outcomes[0].error().unwrap();
        assert!(reason.contains("image decoding exploded"), "{reason}");
        assert!(result.completed);
        assert_eq!(result.stats.failed, 1);
    }

    #[test]
    fn test_stop_flag() {
        let flag = StopFlag::new();
        let shared = flag.clone();
        assert!(!flag.is_stopped());
        shared.stop();
        assert!(flag.is_stopped());
    }
}

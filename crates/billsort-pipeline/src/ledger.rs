//! Progress ledger: durable record of which files a run has attempted
//!
//! The ledger is a single JSON document in the output folder. Every mutation
//! rewrites it through a temporary sibling that is then renamed over the
//! target, so a crash never leaves a torn file behind. Write failures are
//! logged and swallowed: a broken ledger degrades resume, never the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// File name of the ledger inside the output folder
pub const LEDGER_FILE_NAME: &str = ".processing_progress.json";

/// Settings a run was started with, kept for the audit trail
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Effective extraction mode
    pub extraction_mode: String,
    /// Files per batch
    pub batch_size: usize,
    /// Concurrent extractions
    pub max_workers: usize,
    /// Whether the report was generated
    pub generate_report: bool,
    /// Whether files were classified
    pub classify_files: bool,
}

/// On-disk state of the ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressState {
    /// Identifier of the run that created this state
    pub run_id: Option<Uuid>,
    /// Folder that was scanned
    pub source_folder: String,
    /// Folder holding the ledger, report and classified tree
    pub output_folder: String,
    /// Files pending when the run started
    pub total_files: usize,
    /// Files that produced a record, in completion order
    pub processed_files: Vec<String>,
    /// Files that failed or were skipped, in completion order
    pub failed_files: Vec<String>,
    /// When the run started
    pub start_time: Option<DateTime<Utc>>,
    /// When the ledger last changed
    pub last_update: Option<DateTime<Utc>>,
    /// Whether the pending set was exhausted
    pub completed: bool,
    /// Settings of the run
    pub settings: RunSettings,
}

/// Snapshot of a ledger for status displays
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressInfo {
    /// Files pending when the run started
    pub total: usize,
    /// Files that produced a record
    pub processed: usize,
    /// Files that failed or were skipped
    pub failed: usize,
    /// Files not yet attempted
    pub remaining: usize,
    /// Whether the run finished
    pub completed: bool,
    /// When the run started
    pub started_at: Option<DateTime<Utc>>,
    /// When the ledger last changed
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct LedgerInner {
    state: ProgressState,
    processed: HashSet<String>,
    failed: HashSet<String>,
}

impl LedgerInner {
    fn from_state(state: ProgressState) -> Self {
        let processed = state.processed_files.iter().cloned().collect();
        let failed = state.failed_files.iter().cloned().collect();
        Self {
            state,
            processed,
            failed,
        }
    }
}

/// Canonical key for a path: absolute, lexically normalised, `/`-separated
///
/// Relative paths are resolved against the working directory. Symlinks are not
/// followed, so the key of a file that no longer exists is still stable.
pub fn canonical_key(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

    let mut normalised = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalised.pop();
            }
            other => normalised.push(other.as_os_str()),
        }
    }
    normalised.to_string_lossy().replace('\\', "/")
}

/// Durable, idempotent tracking of attempted files
///
/// Safe to share between worker threads: every mutation takes one lock around
/// the in-memory state and the flush to disk.
pub struct ProgressLedger {
    path: PathBuf,
    inner: Mutex<LedgerInner>,
}

impl ProgressLedger {
    /// Ledger stored in `output_root`; nothing is read until [`load`](Self::load)
    pub fn new(output_root: impl AsRef<Path>) -> Self {
        Self {
            path: output_root.as_ref().join(LEDGER_FILE_NAME),
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Location of the ledger file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether an unfinished ledger exists on disk
    ///
    /// Unreadable or unparsable files count as "no ledger". A document without
    /// a `completed` flag is treated as finished.
    pub fn has_incomplete(&self) -> bool {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return false;
        };
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(doc) => !doc.get("completed").and_then(|v| v.as_bool()).unwrap_or(true),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable ledger");
                false
            }
        }
    }

    /// Replace the in-memory state with the ledger on disk
    ///
    /// Returns false, leaving the current state untouched, when the file cannot
    /// be read or parsed.
    pub fn load(&self) -> bool {
        let state = std::fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_json::from_str::<ProgressState>(&content).map_err(|e| e.to_string())
            });

        match state {
            Ok(state) => {
                info!(
                    path = %self.path.display(),
                    processed = state.processed_files.len(),
                    failed = state.failed_files.len(),
                    "loaded progress ledger"
                );
                *self.lock() = LedgerInner::from_state(state);
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot load progress ledger");
                false
            }
        }
    }

    /// Start a fresh run and persist it immediately
    pub fn init(&self, source_root: &Path, total_files: usize, settings: RunSettings) {
        let now = Utc::now();
        let state = ProgressState {
            run_id: Some(Uuid::now_v7()),
            source_folder: canonical_key(source_root),
            output_folder: self
                .path
                .parent()
                .map(canonical_key)
                .unwrap_or_default(),
            total_files,
            start_time: Some(now),
            last_update: Some(now),
            settings,
            ..ProgressState::default()
        };

        let mut inner = self.lock();
        *inner = LedgerInner::from_state(state);
        self.flush(&inner.state);
    }

    /// Whether `path` already produced a record
    pub fn is_processed(&self, path: &Path) -> bool {
        self.lock().processed.contains(&canonical_key(path))
    }

    /// Whether `path` has failed or been skipped
    pub fn is_failed(&self, path: &Path) -> bool {
        self.lock().failed.contains(&canonical_key(path))
    }

    /// Record the outcome of one file and persist before returning
    ///
    /// Recording the same path twice with the same result is a no-op apart
    /// from the timestamp.
    pub fn record(&self, path: &Path, success: bool) {
        let key = canonical_key(path);
        let mut inner = self.lock();
        let inner = &mut *inner;

        if success {
            if inner.processed.insert(key.clone()) {
                inner.state.processed_files.push(key);
            }
        } else if inner.failed.insert(key.clone()) {
            inner.state.failed_files.push(key);
        }
        inner.state.last_update = Some(Utc::now());
        self.flush(&inner.state);
    }

    /// `all_paths` minus everything already processed, in input order
    ///
    /// Failed files stay pending so a resumed run retries them.
    pub fn pending(&self, all_paths: &[PathBuf]) -> Vec<PathBuf> {
        let inner = self.lock();
        all_paths
            .iter()
            .filter(|path| !inner.processed.contains(&canonical_key(path)))
            .cloned()
            .collect()
    }

    /// `all_paths` minus everything already attempted, in input order
    ///
    /// Used when extending a finished run: only files it never saw are new.
    pub fn untried(&self, all_paths: &[PathBuf]) -> Vec<PathBuf> {
        let inner = self.lock();
        all_paths
            .iter()
            .filter(|path| {
                let key = canonical_key(path);
                !inner.processed.contains(&key) && !inner.failed.contains(&key)
            })
            .cloned()
            .collect()
    }

    /// Whether the loaded run had finished
    pub fn is_completed(&self) -> bool {
        self.lock().state.completed
    }

    /// Mark a finished run as in progress again, adding `new_files` to its total
    pub fn reopen(&self, new_files: usize) {
        let mut inner = self.lock();
        inner.state.completed = false;
        inner.state.total_files += new_files;
        inner.state.last_update = Some(Utc::now());
        self.flush(&inner.state);
    }

    /// Mark the run finished and persist
    pub fn mark_complete(&self) {
        let mut inner = self.lock();
        inner.state.completed = true;
        inner.state.last_update = Some(Utc::now());
        self.flush(&inner.state);
        info!(
            processed = inner.processed.len(),
            failed = inner.failed.len(),
            "run marked complete"
        );
    }

    /// Summary counts for status displays
    pub fn progress_info(&self) -> ProgressInfo {
        let inner = self.lock();
        let state = &inner.state;
        ProgressInfo {
            total: state.total_files,
            processed: inner.processed.len(),
            failed: inner.failed.len(),
            remaining: state
                .total_files
                .saturating_sub(inner.processed.len() + inner.failed.len()),
            completed: state.completed,
            started_at: state.start_time,
            updated_at: state.last_update,
        }
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ProgressState {
        self.lock().state.clone()
    }

    /// Delete the ledger file and reset the in-memory state
    pub fn clear(&self) -> std::io::Result<()> {
        let mut inner = self.lock();
        *inner = LedgerInner::default();
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "progress ledger cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn flush(&self, state: &ProgressState) {
        if let Err(e) = self.write_atomically(state) {
            warn!(path = %self.path.display(), error = %e, "failed to persist progress ledger");
        } else {
            debug!(path = %self.path.display(), "progress ledger saved");
        }
    }

    fn write_atomically(&self, state: &ProgressState) -> std::io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let json = serde_json::to_vec_pretty(state)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl std::fmt::Debug for ProgressLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressLedger")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

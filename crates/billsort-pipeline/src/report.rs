//! Report merger: the deduplicated CSV summary of every extracted invoice
//!
//! Each batch is merged into the report by reading the existing document,
//! concatenating old and new rows, dropping earlier rows whose identifier
//! reappears, and atomically replacing the file. A report held open by another
//! program (typically a spreadsheet) is waited out rather than skipped.
//!
//! An existing report that no longer parses (for example after a spreadsheet
//! re-saved it in another encoding) is renamed aside and the merge starts a new
//! document.

use crate::error::ReportError;
use billsort_domain::ProcessingOutcome;
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Column order of the report
pub const REPORT_COLUMNS: [&str; 14] = [
    "file_name",
    "invoice_number",
    "invoice_type",
    "issue_date",
    "buyer_name",
    "buyer_tax_id",
    "seller_name",
    "seller_tax_id",
    "amount",
    "tax_amount",
    "total_amount",
    "confidence",
    "method",
    "file_path",
];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

static RE_CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0b\x0c\x0e-\x1f\x7f]").expect("valid control character regex")
});

/// Called while the report is locked; returns false to stop waiting
pub type LockCallback = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Whether an identifier is long enough to count as a real invoice number
pub fn is_reportable_identifier(identifier: Option<&str>, min_len: usize) -> bool {
    match identifier.map(str::trim) {
        Some(id) => !id.is_empty() && id != "None" && id.chars().count() >= min_len,
        None => false,
    }
}

/// One line of the report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportRow {
    /// Source file name
    pub file_name: String,
    /// Invoice number; the natural key
    pub invoice_number: String,
    /// Invoice type
    pub invoice_type: String,
    /// Issue date
    pub issue_date: String,
    /// Buyer name
    pub buyer_name: String,
    /// Buyer tax identifier
    pub buyer_tax_id: String,
    /// Seller name
    pub seller_name: String,
    /// Seller tax identifier
    pub seller_tax_id: String,
    /// Amount before tax
    pub amount: String,
    /// Tax amount
    pub tax_amount: String,
    /// Amount including tax
    pub total_amount: String,
    /// Confidence as a whole percentage, e.g. `88%`
    pub confidence: String,
    /// Strategy that produced the record
    pub method: String,
    /// Source file path with `/` separators
    pub file_path: String,
}

impl ReportRow {
    /// Project a successful outcome into a row
    pub fn from_outcome(outcome: &ProcessingOutcome) -> Option<Self> {
        let record = outcome.record()?;
        let fields = record.fields();
        let text = |value: &Option<String>| value.as_deref().unwrap_or_default().trim().to_string();
        let path = outcome.file_path();

        Some(Self {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            invoice_number: text(&fields.invoice_number),
            invoice_type: text(&fields.invoice_type),
            issue_date: text(&fields.issue_date),
            buyer_name: text(&fields.buyer_name),
            buyer_tax_id: text(&fields.buyer_tax_id),
            seller_name: text(&fields.seller_name),
            seller_tax_id: text(&fields.seller_tax_id),
            amount: text(&fields.amount),
            tax_amount: text(&fields.tax_amount),
            total_amount: text(&fields.total_amount),
            confidence: format!("{:.0}%", record.confidence() * 100.0),
            method: record.method().to_string(),
            file_path: path.to_string_lossy().into_owned(),
        })
    }

    /// The natural key
    pub fn key(&self) -> &str {
        self.invoice_number.trim()
    }

    /// Strip control characters and normalise path separators
    pub fn sanitized(self) -> Self {
        let clean = |s: String| -> String {
            if RE_CONTROL_CHARS.is_match(&s) {
                RE_CONTROL_CHARS.replace_all(&s, "").into_owned()
            } else {
                s
            }
        };
        Self {
            file_name: clean(self.file_name),
            invoice_number: clean(self.invoice_number),
            invoice_type: clean(self.invoice_type),
            issue_date: clean(self.issue_date),
            buyer_name: clean(self.buyer_name),
            buyer_tax_id: clean(self.buyer_tax_id),
            seller_name: clean(self.seller_name),
            seller_tax_id: clean(self.seller_tax_id),
            amount: clean(self.amount),
            tax_amount: clean(self.tax_amount),
            total_amount: clean(self.total_amount),
            confidence: clean(self.confidence),
            method: clean(self.method),
            file_path: clean(self.file_path).replace('\\', "/"),
        }
    }
}

/// Keep only the last row for every non-empty key, preserving relative order
fn dedup_keep_last(rows: Vec<ReportRow>) -> Vec<ReportRow> {
    let mut last_index: HashMap<String, usize> = HashMap::new();
    for (index, row) in rows.iter().enumerate() {
        if !row.key().is_empty() {
            last_index.insert(row.key().to_string(), index);
        }
    }
    rows.into_iter()
        .enumerate()
        .filter(|(index, row)| row.key().is_empty() || last_index.get(row.key()) == Some(index))
        .map(|(_, row)| row)
        .collect()
}

/// Decides whether another program holds the report
pub trait LockProbe: Send + Sync {
    /// True when `path` exists and cannot be written right now
    fn is_locked(&self, path: &Path) -> bool;
}

/// Tries to open the file for appending; any failure means "locked"
#[derive(Debug, Clone, Copy, Default)]
pub struct AppendProbe;

impl LockProbe for AppendProbe {
    fn is_locked(&self, path: &Path) -> bool {
        if !path.exists() {
            return false;
        }
        std::fs::OpenOptions::new().append(true).open(path).is_err()
    }
}

/// Merges batches of outcomes into the report document
#[derive(Clone)]
pub struct ReportMerger {
    min_identifier_len: usize,
    poll_interval: Duration,
    probe: Arc<dyn LockProbe>,
}

impl ReportMerger {
    /// Create a merger with the append-open lock probe
    pub fn new(min_identifier_len: usize, poll_interval: Duration) -> Self {
        Self {
            min_identifier_len,
            poll_interval,
            probe: Arc::new(AppendProbe),
        }
    }

    /// Replace the lock probe
    pub fn with_probe(mut self, probe: Arc<dyn LockProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Rows for the successful outcomes with a reportable identifier
    ///
    /// Within one batch the first row for an identifier wins.
    pub fn rows_for(&self, outcomes: &[ProcessingOutcome]) -> Vec<ReportRow> {
        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        for outcome in outcomes {
            let Some(record) = outcome.record() else {
                continue;
            };
            if !is_reportable_identifier(record.identifier(), self.min_identifier_len) {
                debug!(file = %outcome.file_path().display(), "not an invoice, left out of report");
                continue;
            }
            let Some(row) = ReportRow::from_outcome(outcome) else {
                continue;
            };
            if seen.insert(row.key().to_string()) {
                rows.push(row);
            } else {
                debug!(invoice = row.key(), "duplicate invoice within batch");
            }
        }
        rows
    }

    /// Merge a batch into the report at `report_path`
    ///
    /// Returns the number of rows in the report afterwards. While the report is
    /// locked, `lock_cb` is asked whether to keep waiting; without a callback
    /// the lock is polled until it clears, with no timeout.
    ///
    /// # Errors
    ///
    /// - `ReportError::NoValidRecords` when nothing in the batch qualifies
    /// - `ReportError::Cancelled` when the callback gives up
    /// - I/O and CSV errors reading or replacing the report
    pub async fn append(
        &self,
        outcomes: &[ProcessingOutcome],
        report_path: &Path,
        lock_cb: Option<&LockCallback>,
    ) -> Result<usize, ReportError> {
        let new_rows = self.rows_for(outcomes);
        if new_rows.is_empty() {
            return Err(ReportError::NoValidRecords);
        }
        let added = new_rows.len();

        self.wait_until_writable(report_path, lock_cb).await?;

        let mut rows: Vec<ReportRow> = existing_rows(report_path)?
            .into_iter()
            .map(ReportRow::sanitized)
            .collect();
        rows.extend(new_rows.into_iter().map(ReportRow::sanitized));
        let merged = dedup_keep_last(rows);
        write_rows(report_path, &merged)?;

        info!(
            path = %report_path.display(),
            added,
            total = merged.len(),
            "report updated"
        );
        Ok(merged.len())
    }

    async fn wait_until_writable(
        &self,
        path: &Path,
        lock_cb: Option<&LockCallback>,
    ) -> Result<(), ReportError> {
        let mut warned = false;
        while self.probe.is_locked(path) {
            let message = format!(
                "{} is open in another program; close it to continue",
                path.display()
            );
            match lock_cb {
                Some(cb) => {
                    let cb = Arc::clone(cb);
                    // the callback may block on user input
                    let keep_waiting = tokio::task::spawn_blocking(move || cb(&message))
                        .await
                        .unwrap_or(false);
                    if !keep_waiting {
                        warn!(path = %path.display(), "lock wait cancelled");
                        return Err(ReportError::Cancelled(path.to_path_buf()));
                    }
                }
                None => {
                    if !warned {
                        warn!(path = %path.display(), "report is locked, waiting");
                        warned = true;
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ReportMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportMerger")
            .field("min_identifier_len", &self.min_identifier_len)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

/// Read every row of an existing report
pub fn read_rows(path: &Path) -> Result<Vec<ReportRow>, ReportError> {
    let bytes = std::fs::read(path)?;
    let content = bytes.strip_prefix(UTF8_BOM).unwrap_or(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content);
    let mut rows = Vec::new();
    for row in reader.deserialize::<ReportRow>() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Rows already in the report at `path`
///
/// A report that cannot be parsed is renamed to a timestamped sibling and
/// treated as empty, so later batches keep landing in a readable document.
fn existing_rows(path: &Path) -> Result<Vec<ReportRow>, ReportError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    match read_rows(path) {
        Ok(rows) => Ok(rows),
        Err(ReportError::Csv(e)) => {
            let lost = data_line_count(path);
            let aside = unreadable_path(path);
            std::fs::rename(path, &aside)?;
            warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                rows_not_carried_over = lost,
                error = %e,
                "existing report is unreadable, starting a new one"
            );
            Ok(Vec::new())
        }
        Err(e) => Err(e),
    }
}

/// Non-empty lines after the header
fn data_line_count(path: &Path) -> usize {
    std::fs::read(path)
        .map(|bytes| {
            bytes
                .split(|b| *b == b'\n')
                .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
                .count()
                .saturating_sub(1)
        })
        .unwrap_or(0)
}

/// `report.csv` becomes `report.unreadable-20240101T120000.csv`
fn unreadable_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let name = match path.extension() {
        Some(ext) => format!("{}.unreadable-{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}.unreadable-{}", stem, stamp),
    };
    path.with_file_name(name)
}

/// Number of rows in a report, or `None` when it cannot be read
pub fn count_rows(path: &Path) -> Option<usize> {
    read_rows(path).ok().map(|rows| rows.len())
}

fn write_rows(path: &Path, rows: &[ReportRow]) -> Result<(), ReportError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    // spreadsheet programs need the BOM to detect UTF-8
    tmp.write_all(UTF8_BOM)?;
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp.as_file_mut());
        writer.write_record(REPORT_COLUMNS)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    tmp.persist(path)?;
    Ok(())
}

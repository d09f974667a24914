//! Classifier: copies invoices into a `seller/buyer` folder tree

use crate::report::is_reportable_identifier;
use billsort_domain::{ProcessingOutcome, Record};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File, FileTimes};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Folder used when the seller name is missing
pub const UNKNOWN_SELLER: &str = "Unknown Seller";

/// Folder used when the buyer name is missing
pub const UNKNOWN_BUYER: &str = "Unknown Buyer";

/// Longest folder name produced from a party name (characters)
pub const MAX_FOLDER_NAME_LEN: usize = 50;

const ILLEGAL_PATH_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Counters from one or more classification passes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassifyTotals {
    /// Files copied
    pub copied: usize,
    /// Copies that failed
    pub failed: usize,
    /// Files left out because their invoice was already classified
    pub skipped: usize,
    /// Folders created
    pub folders_created: usize,
}

impl ClassifyTotals {
    /// Add another pass's counters to these
    pub fn absorb(&mut self, other: ClassifyTotals) {
        self.copied += other.copied;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.folders_created += other.folders_created;
    }
}

/// Turn a party name into a safe folder name
///
/// Characters illegal in a path segment are removed, whitespace runs collapse
/// to one space and the result is cut to [`MAX_FOLDER_NAME_LEN`] characters.
/// An empty result becomes `fallback`.
pub fn sanitize_folder_name(name: Option<&str>, fallback: &str) -> String {
    let cleaned: String = name
        .unwrap_or_default()
        .chars()
        .filter(|c| !ILLEGAL_PATH_CHARS.contains(c) && !c.is_control())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated: String = collapsed.chars().take(MAX_FOLDER_NAME_LEN).collect();
    let trimmed = truncated.trim();
    // "." and ".." would escape the tree
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// First free path for `file_name` in `dir`: `name.ext`, then `name_1.ext`, ...
pub fn unique_destination(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let original = Path::new(file_name);
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let ext = original
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    (1..)
        .map(|n| dir.join(format!("{stem}_{n}{ext}")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// Copy a file, carrying over its permissions and timestamps
pub fn copy_preserving_metadata(source: &Path, target: &Path) -> std::io::Result<()> {
    fs::copy(source, target)?;
    let metadata = fs::metadata(source)?;

    let mut times = FileTimes::new();
    if let Ok(modified) = metadata.modified() {
        times = times.set_modified(modified);
    }
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    File::options().write(true).open(target)?.set_times(times)
}

/// Copies successfully extracted files into `output/<seller>/<buyer>/`
#[derive(Debug, Clone)]
pub struct Classifier {
    min_identifier_len: usize,
}

impl Classifier {
    /// Create a classifier that ignores identifiers shorter than `min_identifier_len`
    pub fn new(min_identifier_len: usize) -> Self {
        Self { min_identifier_len }
    }

    /// Folder a record's file belongs in
    pub fn target_folder(&self, record: &Record, output_root: &Path) -> PathBuf {
        let fields = record.fields();
        output_root
            .join(sanitize_folder_name(fields.seller_name.as_deref(), UNKNOWN_SELLER))
            .join(sanitize_folder_name(fields.buyer_name.as_deref(), UNKNOWN_BUYER))
    }

    /// Copy every successful outcome with a real invoice number
    ///
    /// An invoice number seen earlier in the same call is skipped. Copy errors
    /// are counted and logged, never returned.
    pub fn classify(&self, outcomes: &[ProcessingOutcome], output_root: &Path) -> ClassifyTotals {
        let mut totals = ClassifyTotals::default();
        let mut seen = HashSet::new();

        for outcome in outcomes {
            let Some(record) = outcome.record() else {
                continue;
            };
            let source = outcome.file_path();
            if !source.exists() {
                debug!(file = %source.display(), "source vanished before classification");
                continue;
            }
            if !is_reportable_identifier(record.identifier(), self.min_identifier_len) {
                if billsort_domain::FileKind::from_path(source).is_some_and(|k| k.is_image()) {
                    warn!(
                        file = %source.display(),
                        invoice = record.identifier().unwrap_or_default(),
                        method = record.method(),
                        "image result has no usable invoice number"
                    );
                } else {
                    debug!(file = %source.display(), "not an invoice, not classified");
                }
                continue;
            }

            let identifier = record.identifier().unwrap_or_default().to_string();
            if !seen.insert(identifier.clone()) {
                info!(invoice = %identifier, file = %source.display(), "duplicate invoice skipped");
                totals.skipped += 1;
                continue;
            }

            match self.copy_one(record, source, output_root) {
                Ok((target, created)) => {
                    totals.copied += 1;
                    if created {
                        totals.folders_created += 1;
                    }
                    debug!(from = %source.display(), to = %target.display(), "file classified");
                }
                Err(e) => {
                    totals.failed += 1;
                    error!(file = %source.display(), error = %e, "failed to classify file");
                }
            }
        }

        totals
    }

    fn copy_one(
        &self,
        record: &Record,
        source: &Path,
        output_root: &Path,
    ) -> std::io::Result<(PathBuf, bool)> {
        let folder = self.target_folder(record, output_root);
        let created = !folder.exists();
        if created {
            fs::create_dir_all(&folder)?;
            info!(folder = %folder.display(), "created folder");
        }

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| std::io::Error::other("source has no file name"))?;
        let target = unique_destination(&folder, &file_name);
        copy_preserving_metadata(source, &target)?;
        Ok((target, created))
    }
}

//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use billsort_domain::ProcessingOutcome;
use billsort_pipeline::{ProgressInfo, ProgressState, RunResult};
use chrono::{DateTime, Utc};
use colored::*;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

/// Output formatter.
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Format the result of a run.
    pub fn format_run(&self, result: &RunResult, mode: &str) -> Result<String> {
        match self.format {
            OutputFormat::Json => self.format_run_json(result, mode),
            OutputFormat::Table => Ok(self.format_run_table(result, mode)),
            OutputFormat::Quiet => Ok(match &result.report_totals {
                Some(report) => report.path.display().to_string(),
                None => result.output_root.display().to_string(),
            }),
        }
    }

    fn format_run_json(&self, result: &RunResult, mode: &str) -> Result<String> {
        let failures: Vec<serde_json::Value> = problem_outcomes(&result.outcomes)
            .map(|o| {
                serde_json::json!({
                    "file": o.file_path().display().to_string(),
                    "status": o.label(),
                    "reason": o.error(),
                })
            })
            .collect();

        let value = serde_json::json!({
            "mode": mode,
            "output_root": result.output_root.display().to_string(),
            "completed": result.completed,
            "resumed": result.resumed,
            "previously_processed": result.previously_processed,
            "stats": result.stats,
            "classify": result.classify_totals,
            "report": result.report_totals.as_ref().map(|r| serde_json::json!({
                "path": r.path.display().to_string(),
                "records": r.record_count,
            })),
            "problems": failures,
        });
        Ok(serde_json::to_string_pretty(&value)?)
    }

    fn format_run_table(&self, result: &RunResult, mode: &str) -> String {
        let stats = &result.stats;
        let mut builder = Builder::default();
        builder.push_record(["Metric", "Value"]);
        builder.push_record(["Mode".to_string(), mode.to_string()]);
        if result.resumed {
            builder.push_record([
                "Previously processed".to_string(),
                result.previously_processed.to_string(),
            ]);
        }
        builder.push_record(["Files".to_string(), stats.total.to_string()]);
        builder.push_record(["Succeeded".to_string(), stats.success.to_string()]);
        builder.push_record(["Failed".to_string(), stats.failed.to_string()]);
        builder.push_record(["Skipped".to_string(), stats.skipped.to_string()]);
        builder.push_record([
            "Success rate".to_string(),
            format!("{:.1}%", stats.success_rate),
        ]);
        builder.push_record(["Elapsed".to_string(), format!("{:.1}s", stats.elapsed_secs)]);
        if let Some(classify) = &result.classify_totals {
            builder.push_record([
                "Copied".to_string(),
                format!("{} ({} folders)", classify.copied, classify.folders_created),
            ]);
        }
        if let Some(report) = &result.report_totals {
            builder.push_record([
                "Report".to_string(),
                format!("{} ({} rows)", report.path.display(), report.record_count),
            ]);
        }
        builder.push_record(["Output".to_string(), result.output_root.display().to_string()]);

        let mut lines = vec![styled(builder)];

        let mut problems = Builder::default();
        problems.push_record(["File", "Status", "Reason"]);
        let mut any = false;
        for outcome in problem_outcomes(&result.outcomes) {
            any = true;
            problems.push_record([
                outcome.file_path().display().to_string(),
                outcome.label().to_string(),
                outcome.error().unwrap_or_default().to_string(),
            ]);
        }
        if any {
            lines.push(styled(problems));
        }

        if result.completed {
            lines.push(self.success("Run complete"));
        } else {
            lines.push(self.warning("Run stopped early; rerun with --resume to continue"));
        }
        lines.join("\n")
    }

    /// Format a ledger for the status command.
    ///
    /// `resumable` marks an unfinished run that `run --resume` would continue.
    pub fn format_status(
        &self,
        info: &ProgressInfo,
        state: &ProgressState,
        resumable: bool,
    ) -> Result<String> {
        match self.format {
            OutputFormat::Json => {
                let value = serde_json::json!({
                    "progress": info,
                    "resumable": resumable,
                    "run_id": state.run_id.map(|id| id.to_string()),
                    "source_folder": state.source_folder,
                    "output_folder": state.output_folder,
                    "settings": state.settings,
                });
                Ok(serde_json::to_string_pretty(&value)?)
            }
            OutputFormat::Quiet => Ok(format!(
                "{}/{}",
                info.processed + info.failed,
                info.total
            )),
            OutputFormat::Table => {
                let mut builder = Builder::default();
                builder.push_record(["Field", "Value"]);
                builder.push_record(["Source".to_string(), state.source_folder.clone()]);
                builder.push_record(["Output".to_string(), state.output_folder.clone()]);
                builder.push_record(["Mode".to_string(), state.settings.extraction_mode.clone()]);
                builder.push_record(["Total".to_string(), info.total.to_string()]);
                builder.push_record(["Processed".to_string(), info.processed.to_string()]);
                builder.push_record(["Failed".to_string(), info.failed.to_string()]);
                builder.push_record(["Remaining".to_string(), info.remaining.to_string()]);
                builder.push_record(["Started".to_string(), format_timestamp(info.started_at)]);
                builder.push_record(["Updated".to_string(), format_timestamp(info.updated_at)]);

                let status = if resumable {
                    self.warning("Incomplete; resume with `billsort run --resume`")
                } else {
                    self.success("Completed")
                };
                Ok(format!("{}\n{}", styled(builder), status))
            }
        }
    }

    /// One line of batch progress.
    pub fn progress_line(&self, done: usize, total: usize, message: &str) -> String {
        let percent = if total > 0 {
            done as f64 / total as f64 * 100.0
        } else {
            100.0
        };
        self.colorize(
            &format!("[{}/{} {:5.1}%] {}", done, total, percent, message),
            "cyan",
        )
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            "cyan" => text.cyan().to_string(),
            _ => text.to_string(),
        }
    }
}

fn problem_outcomes(outcomes: &[ProcessingOutcome]) -> impl Iterator<Item = &ProcessingOutcome> {
    outcomes.iter().filter(|o| !o.is_success())
}

fn format_timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn styled(builder: Builder) -> String {
    let mut table = builder.build();
    table
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()));
    table.to_string()
}

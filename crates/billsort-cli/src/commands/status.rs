//! Status command implementation.

use crate::cli::StatusArgs;
use crate::error::Result;
use crate::output::Formatter;
use billsort_pipeline::ProgressLedger;

/// Execute the status command.
pub fn execute_status(args: StatusArgs, formatter: &Formatter) -> Result<()> {
    match status_report(&args, formatter)? {
        Some(report) => println!("{}", report),
        None => println!(
            "{}",
            formatter.info(&format!("No progress ledger in {}", args.output.display()))
        ),
    }
    Ok(())
}

/// Render the ledger under `args.output`, or `None` when there is none.
fn status_report(args: &StatusArgs, formatter: &Formatter) -> Result<Option<String>> {
    let ledger = ProgressLedger::new(&args.output);
    let resumable = ledger.has_incomplete();
    if !ledger.load() {
        return Ok(None);
    }
    let report =
        formatter.format_status(&ledger.progress_info(), &ledger.snapshot(), resumable)?;
    Ok(Some(report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;
    use billsort_pipeline::RunSettings;
    use std::path::Path;

    #[test]
    fn test_missing_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let args = StatusArgs {
            output: dir.path().to_path_buf(),
        };
        let formatter = Formatter::new(OutputFormat::Table, false);
        assert!(status_report(&args, &formatter).unwrap().is_none());
    }

    #[test]
    fn test_reports_saved_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ProgressLedger::new(dir.path());
        ledger.init(Path::new("/in"), 4, RunSettings::default());
        ledger.record(Path::new("/in/a.pdf"), true);
        ledger.record(Path::new("/in/b.pdf"), false);

        let args = StatusArgs {
            output: dir.path().to_path_buf(),
        };
        let formatter = Formatter::new(OutputFormat::Quiet, false);
        let report = status_report(&args, &formatter).unwrap().unwrap();
        assert_eq!(report, "2/4");
    }

    #[test]
    fn test_unfinished_run_is_resumable() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ProgressLedger::new(dir.path());
        ledger.init(Path::new("/in"), 2, RunSettings::default());
        ledger.record(Path::new("/in/a.pdf"), true);

        let args = StatusArgs {
            output: dir.path().to_path_buf(),
        };
        let formatter = Formatter::new(OutputFormat::Json, false);
        let report = status_report(&args, &formatter).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(value["resumable"], true);

        ledger.mark_complete();
        let report = status_report(&args, &formatter).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(value["resumable"], false);
    }
}

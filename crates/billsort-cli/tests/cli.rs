//! End-to-end command tests using the regex strategy (no LLM required).

use billsort_cli::cli::{ResetArgs, RunArgs, StatusArgs};
use billsort_cli::commands::{execute_reset, execute_run, execute_status};
use billsort_cli::config::OutputFormat;
use billsort_cli::{AppConfig, Formatter};
use billsort_extractor::ExtractionMode;
use billsort_pipeline::{read_rows, ProgressLedger};
use std::fs;
use std::path::Path;

const INVOICE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Invoice>
  <Number>发票号码：24400000</Number>
  <Buyer>购买方名称：甲公司</Buyer>
  <Seller>销售方名称：乙公司</Seller>
  <Total>价税合计 100.00</Total>
</Invoice>
"#;

fn regex_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.extractor.mode = ExtractionMode::RegexFallback;
    config
}

fn run_args(source: &Path) -> RunArgs {
    RunArgs {
        source: source.to_path_buf(),
        output: None,
        mode: None,
        provider: None,
        model: None,
        batch_size: None,
        workers: None,
        resume: false,
        no_report: false,
        no_classify: false,
        no_wait: true,
    }
}

fn quiet() -> Formatter {
    Formatter::new(OutputFormat::Quiet, false)
}

#[test]
fn test_run_then_status_then_reset() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("a.xml"), INVOICE_XML).unwrap();
    fs::write(source.join("notes.txt"), "not an invoice").unwrap();

    execute_run(run_args(&source), regex_config(), &quiet()).unwrap();

    let output = source.join("processed");
    let rows = read_rows(&output.join("invoice_report.csv")).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].invoice_number, "24400000");
    assert_eq!(rows[0].method, "regex_fallback");
    assert!(output.join("乙公司").join("甲公司").join("a.xml").exists());

    let ledger = ProgressLedger::new(&output);
    assert!(ledger.load());
    let info = ledger.progress_info();
    assert_eq!((info.total, info.processed, info.failed), (1, 1, 0));
    assert!(info.completed);

    execute_status(
        StatusArgs {
            output: output.clone(),
        },
        &quiet(),
    )
    .unwrap();

    execute_reset(
        ResetArgs {
            output: output.clone(),
            yes: true,
        },
        &quiet(),
    )
    .unwrap();
    assert!(!ledger.path().exists());
}

#[test]
fn test_run_with_flags_and_custom_output() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir_all(&source).unwrap();
    fs::write(source.join("a.xml"), INVOICE_XML).unwrap();

    let mut args = run_args(&source);
    args.output = Some(output.clone());
    args.no_report = true;
    args.no_classify = true;
    execute_run(args, regex_config(), &quiet()).unwrap();

    assert!(!output.join("invoice_report.csv").exists());
    assert!(!output.join("乙公司").exists());
    assert!(ProgressLedger::new(&output).path().exists());
}

#[test]
fn test_missing_source_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = run_args(&dir.path().join("missing"));
    args.output = Some(dir.path().join("out"));
    assert!(execute_run(args, regex_config(), &quiet()).is_err());
}

#[test]
fn test_invalid_flags_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = run_args(dir.path());
    args.workers = Some(0);
    let err = execute_run(args, regex_config(), &quiet()).unwrap_err();
    assert!(err.to_string().contains("max_workers"));
}

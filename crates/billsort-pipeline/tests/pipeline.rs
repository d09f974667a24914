//! End-to-end runs of the orchestrator over scratch folders

use billsort_domain::traits::Extractor;
use billsort_domain::{Record, RecordFields};
use billsort_extractor::{build_extractor, ExtractionMode, ExtractorConfig};
use billsort_llm::{MockProvider, SharedProvider};
use billsort_pipeline::{
    read_rows, LockCallback, LockProbe, Orchestrator, PipelineConfig, ProgressLedger, ReportError,
    RunOptions, StopFlag, LEDGER_FILE_NAME,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Reads `number=` and `seller=` lines out of the decoded text
#[derive(Default)]
struct LineExtractor {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl LineExtractor {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn field(text: &str, key: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.strip_prefix(key))
        .map(|v| v.trim().to_string())
}

impl Extractor for LineExtractor {
    fn extract(&self, text: &str, file_name: Option<&str>) -> Record {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(name) = file_name {
            self.seen.lock().unwrap().push(name.to_string());
        }
        let fields = RecordFields {
            invoice_number: field(text, "number="),
            seller_name: field(text, "seller="),
            buyer_name: Some("甲科技有限公司".to_string()),
            ..RecordFields::default()
        };
        Record::new(fields, "line")
    }

    fn extract_from_image(&self, _path: &Path) -> Record {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Record::new(RecordFields::default(), "line_vision")
    }
}

fn invoice_xml(number: &str, seller: &str) -> String {
    format!(
        "<Invoice><Title>发票</Title><Label>开票日期</Label>\
         <N>number={number}</N><S>seller={seller}</S></Invoice>"
    )
}

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

fn orchestrator(config: PipelineConfig) -> (Orchestrator, Arc<LineExtractor>) {
    let extractor = Arc::new(LineExtractor::default());
    let shared: Arc<dyn Extractor> = extractor.clone();
    (Orchestrator::new(config, shared).unwrap(), extractor)
}

fn short_ids() -> PipelineConfig {
    PipelineConfig {
        min_identifier_len: 4,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn empty_folder_completes_immediately() {
    let source = TempDir::new().unwrap();
    let (orchestrator, extractor) = orchestrator(PipelineConfig::default());

    let result = orchestrator.run(RunOptions::new(source.path())).await.unwrap();

    assert!(result.outcomes.is_empty());
    assert!(result.completed);
    assert_eq!(result.stats.total, 0);
    assert_eq!(extractor.calls(), 0);

    let ledger = ProgressLedger::new(source.path().join("processed"));
    assert!(ledger.load());
    assert!(ledger.progress_info().completed);
}

#[tokio::test]
async fn oversized_file_is_skipped() {
    let source = TempDir::new().unwrap();
    let big = "发票 开票日期 ".repeat(80_000);
    write(source.path(), "huge.xml", &format!("<a>{big}</a>"));
    let config = PipelineConfig {
        max_file_size_mb: 1,
        ..PipelineConfig::default()
    };
    let (orchestrator, extractor) = orchestrator(config);

    let result = orchestrator.run(RunOptions::new(source.path())).await.unwrap();

    assert_eq!(result.outcomes.len(), 1);
    let outcome = &result.outcomes[0];
    assert!(!outcome.is_success());
    assert!(outcome.is_skipped());
    assert!(outcome.error().unwrap().starts_with("file too large"));
    assert_eq!(result.stats.skipped, 1);
    assert_eq!(result.stats.failed, 0);
    assert_eq!(extractor.calls(), 0);
}

#[tokio::test]
async fn keyword_prefilter_never_reaches_extractor() {
    let source = TempDir::new().unwrap();
    write(source.path(), "memo.xml", "<Memo><T>发票</T><N>number=A00001</N></Memo>");
    let (orchestrator, extractor) = orchestrator(PipelineConfig::default());

    let result = orchestrator.run(RunOptions::new(source.path())).await.unwrap();

    assert!(result.outcomes[0].is_skipped());
    assert_eq!(result.outcomes[0].error(), Some("no invoice keywords found"));
    assert_eq!(extractor.calls(), 0);
    assert!(result.report_totals.is_none());
}

#[tokio::test]
async fn batch_with_one_failure() {
    let source = TempDir::new().unwrap();
    write(source.path(), "a.xml", &invoice_xml("A001", "乙贸易有限公司"));
    write(source.path(), "b.xml", &invoice_xml("A002", "丙贸易有限公司"));
    write(source.path(), "c.xml", "<Invoice><Empty/></Invoice>");
    let (orchestrator, _) = orchestrator(short_ids());

    let result = orchestrator.run(RunOptions::new(source.path())).await.unwrap();

    assert_eq!(result.outcomes.len(), 3);
    assert_eq!(result.stats.success, 2);
    assert_eq!(result.stats.failed, 1);
    assert_eq!(result.outcomes[2].error(), Some("could not extract text"));

    let report = result.report_totals.unwrap();
    assert_eq!(report.record_count, 2);
    let rows = read_rows(&report.path).unwrap();
    let numbers: Vec<_> = rows.iter().map(|r| r.invoice_number.as_str()).collect();
    assert_eq!(numbers, vec!["A001", "A002"]);

    let ledger = ProgressLedger::new(&result.output_root);
    assert!(ledger.load());
    let info = ledger.progress_info();
    assert_eq!((info.processed, info.failed), (2, 1));

    let classified = result.classify_totals.unwrap();
    assert_eq!(classified.copied, 2);
    assert!(result
        .output_root
        .join("乙贸易有限公司")
        .join("甲科技有限公司")
        .join("a.xml")
        .exists());
}

#[tokio::test]
async fn later_batch_wins_in_report() {
    let source = TempDir::new().unwrap();
    write(source.path(), "1.xml", &invoice_xml("A001", "old seller"));
    write(source.path(), "2.xml", &invoice_xml("A001", "new seller"));
    let config = PipelineConfig {
        batch_size: 1,
        ..short_ids()
    };
    let (orchestrator, _) = orchestrator(config);

    let result = orchestrator.run(RunOptions::new(source.path())).await.unwrap();

    let rows = read_rows(&result.report_totals.unwrap().path).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].invoice_number, "A001");
    assert_eq!(rows[0].seller_name, "new seller");
    assert_eq!(rows[0].file_name, "2.xml");

    // both batches classified independently, so the second copy lands beside the first
    assert_eq!(result.classify_totals.unwrap().copied, 2);
}

#[tokio::test]
async fn rerun_with_resume_is_a_no_op() {
    let source = TempDir::new().unwrap();
    write(source.path(), "a.xml", &invoice_xml("A00001", "乙"));
    write(source.path(), "b.xml", &invoice_xml("A00002", "丙"));
    let (orchestrator, extractor) = orchestrator(PipelineConfig::default());

    let first = orchestrator.run(RunOptions::new(source.path())).await.unwrap();
    assert_eq!(first.stats.success, 2);
    assert_eq!(extractor.calls(), 2);

    let second = orchestrator
        .run(RunOptions::new(source.path()).with_resume(true))
        .await
        .unwrap();
    assert!(second.outcomes.is_empty());
    assert!(second.completed);
    assert!(second.resumed);
    assert_eq!(second.previously_processed, 2);
    assert_eq!(extractor.calls(), 2);
    assert_eq!(second.report_totals.unwrap().record_count, 2);
}

#[tokio::test]
async fn resume_after_finished_run_picks_up_new_files_only() {
    let source = TempDir::new().unwrap();
    write(source.path(), "a.xml", &invoice_xml("A00001", "乙"));
    let (orchestrator, extractor) = orchestrator(PipelineConfig::default());
    orchestrator.run(RunOptions::new(source.path())).await.unwrap();

    write(source.path(), "later/b.xml", &invoice_xml("A00002", "丙"));
    let result = orchestrator
        .run(RunOptions::new(source.path()).with_resume(true))
        .await
        .unwrap();

    assert_eq!(result.outcomes.len(), 1);
    assert!(result.outcomes[0].file_path().ends_with("later/b.xml"));
    assert_eq!(extractor.calls(), 2);
    assert_eq!(result.report_totals.unwrap().record_count, 2);
}

#[tokio::test]
async fn without_resume_everything_is_reprocessed() {
    let source = TempDir::new().unwrap();
    write(source.path(), "a.xml", &invoice_xml("A00001", "乙"));
    let (orchestrator, extractor) = orchestrator(PipelineConfig::default());

    orchestrator.run(RunOptions::new(source.path())).await.unwrap();
    orchestrator.run(RunOptions::new(source.path())).await.unwrap();

    assert_eq!(extractor.calls(), 2);
}

#[tokio::test]
async fn stopped_run_resumes_where_it_left_off() {
    let source = TempDir::new().unwrap();
    for i in 0..5 {
        write(source.path(), &format!("{i}.xml"), &invoice_xml(&format!("A0000{i}"), "乙"));
    }
    let config = PipelineConfig {
        batch_size: 2,
        ..PipelineConfig::default()
    };
    let (orchestrator, extractor) = orchestrator(config);

    // stop as soon as the first batch reports progress
    let stop = StopFlag::new();
    let trigger = stop.clone();
    let options = RunOptions::new(source.path())
        .with_stop_flag(stop)
        .with_progress(Arc::new(move |_: usize, _: usize, _: &str| trigger.stop()));
    let first = orchestrator.run(options).await.unwrap();

    assert!(!first.completed);
    assert_eq!(first.outcomes.len(), 2);
    let ledger = ProgressLedger::new(&first.output_root);
    assert!(ledger.has_incomplete());

    let second = orchestrator
        .run(RunOptions::new(source.path()).with_resume(true))
        .await
        .unwrap();
    assert!(second.completed);
    assert!(second.resumed);
    assert_eq!(second.previously_processed, 2);
    assert_eq!(second.outcomes.len(), 3);
    assert_eq!(extractor.calls(), 5);

    let seen = extractor.seen.lock().unwrap().clone();
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), seen.len(), "a file was extracted twice: {seen:?}");
    assert_eq!(read_rows(&second.report_totals.unwrap().path).unwrap().len(), 5);
}

#[tokio::test]
async fn resume_retries_failed_files() {
    let source = TempDir::new().unwrap();
    let broken = write(source.path(), "a.xml", "<Invoice/>");
    let (orchestrator, _) = orchestrator(PipelineConfig::default());

    let first = orchestrator.run(RunOptions::new(source.path())).await.unwrap();
    assert_eq!(first.stats.failed, 1);

    // simulate an interruption by reopening the finished ledger by hand
    let ledger_path = first.output_root.join(LEDGER_FILE_NAME);
    let content = fs::read_to_string(&ledger_path).unwrap();
    fs::write(&ledger_path, content.replace("\"completed\": true", "\"completed\": false")).unwrap();
    fs::write(&broken, invoice_xml("A00001", "乙")).unwrap();

    let second = orchestrator
        .run(RunOptions::new(source.path()).with_resume(true))
        .await
        .unwrap();
    assert_eq!(second.stats.success, 1);
}

#[tokio::test]
async fn concurrent_workers_keep_batch_order() {
    let source = TempDir::new().unwrap();
    for i in 0..8 {
        write(source.path(), &format!("{i}.xml"), &invoice_xml(&format!("B0000{i}"), "乙"));
    }
    let config = PipelineConfig {
        batch_size: 3,
        max_workers: 4,
        ..PipelineConfig::default()
    };
    let (orchestrator, _) = orchestrator(config);
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&progress);

    let result = orchestrator
        .run(
            RunOptions::new(source.path()).with_progress(Arc::new(move |done: usize, total: usize, _: &str| {
                sink.lock().unwrap().push((done, total));
            })),
        )
        .await
        .unwrap();

    let names: Vec<_> = result
        .outcomes
        .iter()
        .map(|o| o.file_path().file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    let expected: Vec<_> = (0..8).map(|i| format!("{i}.xml")).collect();
    assert_eq!(names, expected);
    assert_eq!(*progress.lock().unwrap(), vec![(3, 8), (6, 8), (8, 8)]);
    assert_eq!(result.report_totals.unwrap().record_count, 8);
}

#[tokio::test]
async fn panicking_progress_callback_is_ignored() {
    let source = TempDir::new().unwrap();
    write(source.path(), "a.xml", &invoice_xml("A00001", "乙"));
    let (orchestrator, _) = orchestrator(PipelineConfig::default());

    let result = orchestrator
        .run(RunOptions::new(source.path()).with_progress(Arc::new(|_: usize, _: usize, _: &str| panic!("ui gone"))))
        .await
        .unwrap();
    assert!(result.completed);
    assert_eq!(result.stats.success, 1);
}

struct AlwaysLocked;

impl LockProbe for AlwaysLocked {
    fn is_locked(&self, _path: &Path) -> bool {
        true
    }
}

#[tokio::test]
async fn cancelled_lock_wait_does_not_stop_the_run() {
    let source = TempDir::new().unwrap();
    write(source.path(), "a.xml", &invoice_xml("A00001", "乙"));
    write(source.path(), "b.xml", &invoice_xml("A00002", "丙"));
    let config = PipelineConfig {
        batch_size: 1,
        ..PipelineConfig::default()
    };
    let extractor: Arc<dyn Extractor> = Arc::new(LineExtractor::default());
    let orchestrator = Orchestrator::new(config, extractor)
        .unwrap()
        .with_lock_probe(Arc::new(AlwaysLocked));

    let prompts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&prompts);
    let cancel: LockCallback = Arc::new(move |_: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        false
    });

    let result = orchestrator
        .run(RunOptions::new(source.path()).with_lock_callback(cancel))
        .await
        .unwrap();

    assert!(result.completed);
    assert_eq!(result.stats.success, 2);
    assert_eq!(prompts.load(Ordering::SeqCst), 2);
    assert!(result.report_totals.is_none());
    assert_eq!(result.classify_totals.unwrap().copied, 2);

    let err = ReportError::Cancelled(PathBuf::from("r.csv"));
    assert!(err.to_string().contains("still locked"));
}

#[tokio::test]
async fn custom_output_folder_is_not_rescanned() {
    let source = TempDir::new().unwrap();
    write(source.path(), "a.xml", &invoice_xml("A00001", "乙"));
    let output = source.path().join("out");
    let (orchestrator, extractor) = orchestrator(PipelineConfig::default());

    orchestrator
        .run(RunOptions::new(source.path()).with_output(&output))
        .await
        .unwrap();
    assert!(output.join("乙").join("甲科技有限公司").join("a.xml").exists());

    let second = orchestrator
        .run(RunOptions::new(source.path()).with_output(&output))
        .await
        .unwrap();
    assert_eq!(second.outcomes.len(), 1);
    assert_eq!(extractor.calls(), 2);
}

#[tokio::test]
async fn llm_strategy_runs_through_the_pipeline() {
    let source = TempDir::new().unwrap();
    write(source.path(), "a.xml", &invoice_xml("24412000000000000001", "乙"));
    let mock = MockProvider::new(
        r#"```json
{"invoice_number": "24412000000000000001", "seller_name": "乙贸易有限公司",
 "buyer_name": "甲科技有限公司", "total_amount": "¥1,130.00"}
```"#,
    );
    let provider: SharedProvider = Arc::new(mock.clone());
    let config = ExtractorConfig {
        mode: ExtractionMode::Llm,
        ..ExtractorConfig::default()
    };
    let built = build_extractor(&config, Some(provider)).unwrap();
    assert!(!built.degraded);
    let orchestrator = Orchestrator::new(PipelineConfig::default(), built.extractor).unwrap();

    let result = orchestrator.run(RunOptions::new(source.path())).await.unwrap();

    assert_eq!(result.stats.success, 1);
    assert_eq!(mock.call_count(), 1);
    assert!(mock.prompts()[0].contains("a.xml"));

    let rows = read_rows(&result.report_totals.unwrap().path).unwrap();
    assert_eq!(rows[0].invoice_number, "24412000000000000001");
    assert_eq!(rows[0].method, "llm");
    assert!(result
        .output_root
        .join("乙贸易有限公司")
        .join("甲科技有限公司")
        .join("a.xml")
        .exists());
}

#[tokio::test]
async fn unreachable_llm_degrades_to_regex() {
    let source = TempDir::new().unwrap();
    write(
        source.path(),
        "a.xml",
        "<Invoice><T>发票号码：24400000</T><D>开票日期</D></Invoice>",
    );
    let mock = MockProvider::default().unavailable();
    let provider: SharedProvider = Arc::new(mock.clone());
    let built = build_extractor(&ExtractorConfig::default(), Some(provider)).unwrap();
    assert!(built.degraded);
    assert_eq!(built.mode, ExtractionMode::RegexFallback);
    let orchestrator = Orchestrator::new(PipelineConfig::default(), built.extractor).unwrap();

    let result = orchestrator.run(RunOptions::new(source.path())).await.unwrap();

    assert_eq!(mock.call_count(), 0);
    assert_eq!(result.outcomes[0].record().unwrap().method(), "regex_fallback");
}

#[tokio::test]
async fn unreadable_source_is_fatal() {
    let (orchestrator, _) = orchestrator(PipelineConfig::default());
    let result = orchestrator
        .run(RunOptions::new("/nonexistent/billsort/source"))
        .await;
    assert!(result.is_err());
}

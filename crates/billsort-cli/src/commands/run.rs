//! Run command implementation.

use crate::cli::RunArgs;
use crate::config::AppConfig;
use crate::error::Result;
use crate::output::Formatter;
use billsort_extractor::{build_extractor, BuiltExtractor, ExtractionMode};
use billsort_llm::build_provider;
use billsort_pipeline::{
    LockCallback, Orchestrator, ProgressCallback, RunOptions, RunResult, StopFlag,
};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing::{info, warn};

/// Execute the run command.
pub fn execute_run(args: RunArgs, config: AppConfig, formatter: &Formatter) -> Result<()> {
    let config = apply_args(config, &args);
    config.validate()?;

    let built = prepare_extractor(&config)?;
    if built.degraded {
        eprintln!(
            "{}",
            formatter.warning(&format!(
                "{} mode needs an LLM that is not reachable; continuing with {}",
                config.extractor.mode, built.mode
            ))
        );
    }

    let result = run_pipeline(&args, &config, &built, *formatter)?;
    println!("{}", formatter.format_run(&result, built.mode.as_str())?);
    Ok(())
}

/// Layer command-line flags over the loaded configuration.
pub fn apply_args(mut config: AppConfig, args: &RunArgs) -> AppConfig {
    if let Some(mode) = args.mode {
        config.extractor.mode = mode.into();
    }
    if let Some(provider) = args.provider {
        config.llm.provider = provider.into();
        config.apply_credentials(|key| std::env::var(key).ok());
    }
    if let Some(model) = &args.model {
        config.llm.model = Some(model.clone());
    }
    if let Some(batch_size) = args.batch_size {
        config.pipeline.batch_size = batch_size;
    }
    if let Some(workers) = args.workers {
        config.pipeline.max_workers = workers;
    }
    if args.no_report {
        config.pipeline.generate_report = false;
    }
    if args.no_classify {
        config.pipeline.classify_files = false;
    }
    config
}

/// Build the provider (when the mode needs one) and the extraction strategy.
///
/// Provider construction failures degrade the run instead of aborting it.
/// Must run outside the async runtime: availability probes use blocking HTTP.
fn prepare_extractor(config: &AppConfig) -> Result<BuiltExtractor> {
    let provider = if config.extractor.mode.needs_provider() {
        match build_provider(&config.llm) {
            Ok(provider) => Some(provider),
            Err(e) => {
                warn!("LLM provider could not be created: {}", e);
                None
            }
        }
    } else {
        None
    };
    Ok(build_extractor(&config.extractor, provider)?)
}

fn run_pipeline(
    args: &RunArgs,
    config: &AppConfig,
    built: &BuiltExtractor,
    formatter: Formatter,
) -> Result<RunResult> {
    let orchestrator = Orchestrator::new(config.pipeline.clone(), Arc::clone(&built.extractor))?;
    let stop = StopFlag::new();
    let options = build_options(args, built.mode, stop.clone(), formatter);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current batch");
                stop.stop();
            }
        });
        info!(source = %args.source.display(), mode = %built.mode, "starting run");
        orchestrator.run(options).await
    })?;
    Ok(result)
}

fn build_options(
    args: &RunArgs,
    mode: ExtractionMode,
    stop: StopFlag,
    formatter: Formatter,
) -> RunOptions {
    let progress: ProgressCallback = Arc::new(move |done: usize, total: usize, message: &str| {
        eprintln!("{}", formatter.progress_line(done, total, message));
    });

    let no_wait = args.no_wait;
    let lock: LockCallback = Arc::new(move |message: &str| {
        if no_wait {
            eprintln!(
                "{}",
                formatter.warning(&format!("{}; skipping this report update", message))
            );
            return false;
        }
        let stdin = io::stdin();
        prompt_lock(message, &mut stdin.lock(), &mut io::stderr())
    });

    let mut options = RunOptions::new(args.source.clone())
        .with_resume(args.resume)
        .with_mode_label(mode.as_str())
        .with_progress(progress)
        .with_lock_callback(lock)
        .with_stop_flag(stop);
    if let Some(output) = &args.output {
        options = options.with_output(output.clone());
    }
    options
}

/// Ask whether to keep waiting on a locked report; Enter retries, `q` cancels.
///
/// End of input or a broken terminal counts as cancel.
fn prompt_lock<R: BufRead, W: Write>(message: &str, input: &mut R, output: &mut W) -> bool {
    let asked = write!(output, "{}\nPress Enter to retry, q to cancel: ", message)
        .and_then(|_| output.flush());
    if asked.is_err() {
        return false;
    }

    let mut response = String::new();
    match input.read_line(&mut response) {
        Ok(0) | Err(_) => false,
        Ok(_) => !response.trim().eq_ignore_ascii_case("q"),
    }
}

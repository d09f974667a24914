//! CLI command definitions and argument parsing.

use billsort_extractor::ExtractionMode;
use billsort_llm::ProviderKind;
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// billsort - Extract, deduplicate and file folders of invoices.
#[derive(Debug, Parser)]
#[command(name = "billsort")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(short, long, value_enum, global = true)]
    pub format: Option<CliFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BILLSORT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Output format options.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliFormat {
    /// Table format (default)
    Table,
    /// JSON format
    Json,
    /// Quiet format (paths only)
    Quiet,
}

/// CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process every invoice under a folder
    Run(RunArgs),

    /// Show the progress ledger of an output folder
    Status(StatusArgs),

    /// Delete the progress ledger so the next run starts fresh
    Reset(ResetArgs),
}

/// Arguments for the run command.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Folder to scan for invoices
    pub source: PathBuf,

    /// Output folder (default: <SOURCE>/processed)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Extraction strategy
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// LLM backend
    #[arg(short, long, value_enum)]
    pub provider: Option<ProviderArg>,

    /// Model name for the LLM backend
    #[arg(long)]
    pub model: Option<String>,

    /// Files per batch
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Concurrent workers per batch
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Continue an interrupted run instead of starting over
    #[arg(short, long)]
    pub resume: bool,

    /// Do not write the CSV report
    #[arg(long)]
    pub no_report: bool,

    /// Do not copy files into seller/buyer folders
    #[arg(long)]
    pub no_classify: bool,

    /// Skip report updates that would wait on a locked file
    #[arg(long)]
    pub no_wait: bool,
}

/// Arguments for the status command.
#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output folder holding the ledger
    pub output: PathBuf,
}

/// Arguments for the reset command.
#[derive(Debug, Parser)]
pub struct ResetArgs {
    /// Output folder holding the ledger
    pub output: PathBuf,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Extraction mode argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ModeArg {
    /// LLM only
    Llm,
    /// LLM with rule-based validation
    Hybrid,
    /// Multimodal LLM over images
    Vision,
    /// Regular expressions only
    #[value(name = "regex_fallback", alias = "regex")]
    RegexFallback,
}

/// LLM provider argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderArg {
    /// Local Ollama server
    Ollama,
    /// OpenAI API
    Openai,
    /// DeepSeek API
    Deepseek,
    /// Google Gemini API
    Gemini,
}

impl From<CliFormat> for crate::config::OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Table => crate::config::OutputFormat::Table,
            CliFormat::Json => crate::config::OutputFormat::Json,
            CliFormat::Quiet => crate::config::OutputFormat::Quiet,
        }
    }
}

impl From<ModeArg> for ExtractionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Llm => ExtractionMode::Llm,
            ModeArg::Hybrid => ExtractionMode::Hybrid,
            ModeArg::Vision => ExtractionMode::Vision,
            ModeArg::RegexFallback => ExtractionMode::RegexFallback,
        }
    }
}

impl From<ProviderArg> for ProviderKind {
    fn from(provider: ProviderArg) -> Self {
        match provider {
            ProviderArg::Ollama => ProviderKind::Ollama,
            ProviderArg::Openai => ProviderKind::OpenAi,
            ProviderArg::Deepseek => ProviderKind::DeepSeek,
            ProviderArg::Gemini => ProviderKind::Gemini,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from([
            "billsort",
            "run",
            "invoices",
            "--mode",
            "regex",
            "--workers",
            "4",
            "--resume",
        ]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.source, PathBuf::from("invoices"));
                assert_eq!(args.mode, Some(ModeArg::RegexFallback));
                assert_eq!(args.workers, Some(4));
                assert!(args.resume);
                assert!(!args.no_wait);
                assert!(args.output.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["billsort", "status", "out", "--format", "json", "-vv"]);
        assert!(matches!(cli.format, Some(CliFormat::Json)));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Status(_)));
    }

    #[test]
    fn test_run_requires_source() {
        assert!(Cli::try_parse_from(["billsort", "run"]).is_err());
    }

    #[test]
    fn test_reset_yes() {
        let cli = Cli::parse_from(["billsort", "reset", "out", "-y"]);
        match cli.command {
            Command::Reset(args) => assert!(args.yes),
            _ => panic!("Expected Reset command"),
        }
    }

    #[test]
    fn test_argument_conversions() {
        let mode: ExtractionMode = ModeArg::Vision.into();
        assert_eq!(mode, ExtractionMode::Vision);
        let provider: ProviderKind = ProviderArg::Deepseek.into();
        assert_eq!(provider, ProviderKind::DeepSeek);
    }

    #[test]
    fn test_gemini_provider_flag() {
        let cli = Cli::parse_from(["billsort", "run", "in", "--provider", "gemini"]);
        match cli.command {
            Command::Run(args) => {
                let provider: ProviderKind = args.provider.unwrap().into();
                assert_eq!(provider, ProviderKind::Gemini);
            }
            _ => panic!("Expected Run command"),
        }
    }
}

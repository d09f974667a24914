//! billsort CLI - Command-line interface for the invoice batch pipeline.

use billsort_cli::commands;
use billsort_cli::{AppConfig, Cli, Command, Formatter};
use clap::Parser;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> billsort_cli::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // File, then environment
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_env()?;

    // Determine output format
    let format = cli
        .format
        .map(Into::into)
        .unwrap_or(config.settings.format);

    // Determine color setting
    let color_enabled = !cli.no_color && config.settings.color;

    billsort_cli::logging::init(cli.verbose, &config.log_level, color_enabled);

    let formatter = Formatter::new(format, color_enabled);

    match cli.command {
        Command::Run(args) => commands::execute_run(args, config, &formatter),
        Command::Status(args) => commands::execute_status(args, &formatter),
        Command::Reset(args) => commands::execute_reset(args, &formatter),
    }
}

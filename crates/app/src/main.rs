mod config;
mod pipeline;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use config::Config;
use pipeline::RunOptions;

/// Links exchange and transfer legs across yearly ledger exports and writes
/// the combined tables.
#[derive(Parser)]
#[command(name = "saldo", version)]
struct Cli {
    /// Path to the run configuration
    #[arg(short, long, default_value = "saldo.toml")]
    config: PathBuf,

    /// Reconcile everything but write no files
    #[arg(long)]
    dry_run: bool,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)?;
    tracing::info!(
        config = %cli.config.display(),
        periods = config.periods.len(),
        output = %config.output_dir.display(),
        "starting reconciliation"
    );
    let summary = pipeline::run(&config, RunOptions { dry_run: cli.dry_run })?;
    pipeline::log_summary(&summary);
    Ok(())
}

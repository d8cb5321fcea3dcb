// ABOUTME: Entry point for the dockhand CLI application.
// ABOUTME: Sets up logging and interrupts, resolves configuration, and maps errors to exit codes.

mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use dockhand::config::{FileConfig, RunConfig, RunMode};
use dockhand::error::{Result, exit};
use dockhand::interrupt::Interrupt;
use dockhand::output::Output;
use std::env;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_path = init_logging(cli.verbose, &cli.log_file);

    let mut output = Output::new(cli.output_mode());
    output.start_timer();

    let interrupt = Interrupt::new();
    interrupt.listen();

    let code = match run(cli, &output, &interrupt).await {
        Ok(()) => exit::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            output.error(&e.to_string());
            if let Some(path) = &log_path {
                eprintln!("See {} for details", path.display());
            }
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Stderr at `warn` (or `debug` with --verbose), plus an ANSI-free run log.
fn init_logging(verbose: bool, log_file: &Path) -> Option<PathBuf> {
    let level = if verbose { "debug" } else { "warn" };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(EnvFilter::new(level));

    let file = OpenOptions::new().create(true).append(true).open(log_file);
    let (file_layer, log_path, open_error) = match file {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new("info,dockhand=debug")),
            ),
            Some(log_file.to_path_buf()),
            None,
        ),
        Err(e) => (None, None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();

    if let Some(e) = open_error {
        tracing::warn!("cannot open log file {}: {}", log_file.display(), e);
    }
    log_path
}

async fn run(cli: Cli, output: &Output, interrupt: &Interrupt) -> Result<()> {
    let cwd = env::current_dir()?;
    let file = match &cli.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => FileConfig::discover(&cwd)?,
    };
    let home = env::var_os("HOME").map(PathBuf::from);
    let config = RunConfig::resolve(file, cli.overrides(), &cwd, home.as_deref())?;

    tracing::info!(
        "{} {} ({}) on {}:{} as {}",
        config.mode,
        config.source.url,
        config.source.branch,
        config.target.host,
        config.target.port,
        config.target.user
    );

    match config.mode {
        RunMode::Deploy => commands::deploy(&config, output, interrupt).await,
        RunMode::Cleanup => commands::cleanup(&config, output, interrupt).await,
    }
}

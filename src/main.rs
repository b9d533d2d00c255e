//! rapids-control: remote control for a conferencing app
//!
//! This is the entry point for the rapids-control binary. It handles CLI argument
//! parsing, configuration loading and telemetry initialization, then hands the
//! subcommand to [`rapids_control::cli_handler`].
//!
//! # I/O Architecture
//!
//! - **Audit logging**: Goes to syslog, never to stdout/stderr
//! - **Debug logging**: `tracing` to stderr, controlled by `-v` or `RUST_LOG`
//! - **Command output**: Status lines and replies go to stdout

use anyhow::{Context, Result};
use clap::Parser;
use rapids_control::{
    cli::{Cli, Commands},
    cli_handler,
    config::ConfigLoader,
    telemetry,
};
use tracing::{debug, warn};

fn main() -> Result<()> {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    debug!("Parsed CLI arguments: {:?}", cli);

    // Only the server writes an audit trail. A missing syslog daemon is not
    // fatal; events are dropped instead.
    if matches!(cli.command, Commands::Serve { .. })
        && let Err(e) = telemetry::init_logger()
    {
        warn!("Audit logging disabled: {}", e);
    }

    let config = ConfigLoader::new()
        .load(&cli)
        .context("Failed to load configuration")?;

    debug!("Loaded configuration: {:?}", config);

    cli_handler::handle_command(cli.command, config)
}

/// Initialize the tracing subscriber for debug/development logging.
///
/// This is separate from the audit telemetry which goes to syslog.
///
/// # Verbosity Levels
/// - 0 (default): Only warnings and errors
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

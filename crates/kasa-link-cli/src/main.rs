//! kasa-link - command-line host for the Kasa discovery and control engine.
//!
//! Runs discovery bursts, watches the live device set and exposes the
//! actuation entry points for scripts and headless use.

mod cli;
mod commands;
mod error;
mod output;
mod settings;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use error::{exit_codes, CliError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;

    match result {
        Ok(()) => std::process::exit(exit_codes::SUCCESS),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Log to stderr so stdout stays clean for `--json`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = settings::engine_config(&cli)?;

    match cli.command {
        Commands::Discover(args) => commands::run_discover(args, config, cli.json).await,
        Commands::Watch(args) => commands::run_watch(args, config, cli.json).await,
        Commands::Relay(args) => commands::run_relay(args, config, cli.json).await,
        Commands::Brightness(args) => commands::run_brightness(args, config, cli.json).await,
        Commands::Countdown(args) => commands::run_countdown(args, config, cli.json).await,
        Commands::Alias(args) => commands::run_alias(args, config, cli.json).await,
        Commands::Status(args) => commands::run_status(args, config, cli.json).await,
    }
}

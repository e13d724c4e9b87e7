mod commands;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use testbed_core::SessionConfig;
use testbed_ledger::EnvironmentPolicy;
use tracing_subscriber::EnvFilter;

use crate::commands::Commands;
use crate::error::{CliError, Result};

#[derive(Parser)]
#[command(name = "testbed")]
#[command(version = env!("TESTBED_VERSION"))]
#[command(about = "Provision test environments and tear them down in order", long_about = None)]
struct Cli {
    /// Session configuration file (TOML)
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Keep created resources for inspection instead of deleting them
    #[arg(long, global = true)]
    skip_cleanup: bool,

    /// Do not capture state when a failure is handled
    #[arg(long, global = true)]
    skip_save_state: bool,

    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = load_config(&cli).and_then(|config| cli.command.execute(&config));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(&e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// File settings, then `TESTBED_*` variables, then flags. A toggle set
/// anywhere stays set.
fn load_config(cli: &Cli) -> Result<SessionConfig> {
    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    let flags = EnvironmentPolicy::default()
        .with_skip_cleanup(cli.skip_cleanup)
        .with_skip_save_state(cli.skip_save_state);
    Ok(config
        .with_env_policy(EnvironmentPolicy::from_env())
        .with_env_policy(flags))
}

fn print_error(error: &CliError) {
    eprintln!("error: {error}");

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("caused by: {cause}");
        source = std::error::Error::source(cause);
    }

    if let Some(record) = error.record() {
        for line in output::failure_details(record) {
            eprintln!("{line}");
        }
    }
}

//! Spectrail CLI
//!
//! Drives the timeline engine headlessly: simulate frames against a location,
//! print tile keys, and manage `~/.spectrail/config.ini`.

mod commands;
mod error;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::key::KeyArgs;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "spectrail", version = spectrail::VERSION, about = "Gap-compressed spectrogram timeline engine")]
struct Cli {
    /// Log filter, e.g. `info` or `spectrail=debug`. RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run frames against a location and report tile streaming progress
    Simulate(SimulateArgs),

    /// Print the resource key (and URL) of the tile covering a time
    Key(KeyArgs),

    /// Manage configuration settings
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn run(cli: Cli) -> Result<(), CliError> {
    let _guard = logging::init(&cli.log_level, cli.log_file.as_deref())?;
    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Key(args) => commands::key::run(args),
        Commands::Config(command) => commands::config::run(command),
    }
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

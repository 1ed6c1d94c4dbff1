//! Configuration management commands.
//!
//! `config get`, `config set`, `config list` and `config path` read and edit
//! `~/.spectrail/config.ini`.

use std::path::Path;

use clap::Subcommand;
use spectrail::config::{config_file_path, ConfigFile, ConfigKey};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Get a configuration value
    Get {
        /// Configuration key as section.key (e.g. tiles.prefetch_ceiling)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key as section.key (e.g. tiles.prefetch_ceiling)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    let path = config_file_path();
    match command {
        ConfigCommands::Get { key } => println!("{}", get_value(&path, &key)?),
        ConfigCommands::Set { key, value } => {
            let stored = set_value(&path, &key, &value)?;
            println!("Set {} = {}", key.trim(), stored);
        }
        ConfigCommands::List => {
            let config = ConfigFile::load_from(&path)?;
            println!("# {}", path.display());
            for line in list_lines(&config) {
                println!("{line}");
            }
        }
        ConfigCommands::Path => println!("{}", path.display()),
    }
    Ok(())
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'spectrail config list' to see available keys.",
            key
        ))
    })
}

fn get_value(path: &Path, key: &str) -> Result<String, CliError> {
    let config_key = parse_key(key)?;
    let config = ConfigFile::load_from(path)?;
    Ok(config_key.get(&config))
}

/// Validate and persist one setting; returns the value as stored.
fn set_value(path: &Path, key: &str, value: &str) -> Result<String, CliError> {
    let config_key = parse_key(key)?;
    let mut config = ConfigFile::load_from(path)?;
    config_key.set(&mut config, value)?;
    config.save_to(path)?;
    Ok(config_key.get(&config))
}

/// One `section.key  value` line per setting, names padded to a column.
fn list_lines(config: &ConfigFile) -> Vec<String> {
    let width = ConfigKey::all()
        .iter()
        .map(|k| k.name().len())
        .max()
        .unwrap_or(0);
    ConfigKey::all()
        .iter()
        .map(|k| format!("{:<width$}  {}", k.name(), k.get(config)))
        .collect()
}

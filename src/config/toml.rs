//! TOML configuration file parsing

use super::*;
use crate::config::cli::Cli;
use crate::config::cli_convert::{convert_environment, parse_duration_ms};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Result<Config> {
    if let Some(env) = cli.env {
        config.env = convert_environment(env);
    }

    // Coordinator
    if let Some(ref addr) = cli.listen_addr {
        config.coordinator.listen_addr = addr.clone();
    }
    if let Some(ref backoff) = cli.idle_backoff {
        config.coordinator.idle_backoff_ms = parse_duration_ms(backoff)?;
    }

    // Worker
    if let Some(ref addr) = cli.coordinator_addr {
        config.worker.coordinator_addr = addr.clone();
    }
    if let Some(power) = cli.computing_power {
        config.worker.computing_power = power;
    }
    if let Some(ref tick) = cli.tick_interval {
        config.worker.tick_interval_ms = parse_duration_ms(tick)?;
    }
    if let Some(ref timeout) = cli.connect_timeout {
        config.worker.connect_timeout_ms = parse_duration_ms(timeout)?;
    }

    // Latencies
    let latency = &mut config.worker.latency;
    if let Some(ref t) = cli.addition_time {
        latency.addition_ms = parse_duration_ms(t)?;
    }
    if let Some(ref t) = cli.subtraction_time {
        latency.subtraction_ms = parse_duration_ms(t)?;
    }
    if let Some(ref t) = cli.multiplication_time {
        latency.multiplication_ms = parse_duration_ms(t)?;
    }
    if let Some(ref t) = cli.division_time {
        latency.division_ms = parse_duration_ms(t)?;
    }

    // Storage
    if let Some(ref db) = cli.db {
        config.storage.path = db.clone();
    }

    Ok(config)
}

/// Build the effective configuration for a CLI invocation
///
/// Reads the file named by `--config` (or `CALCFARM_CONFIG`) when given,
/// applies CLI overrides, then validates the result.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };

    let config = merge_cli_with_config(cli, base)?;
    super::validator::validate_config(&config)?;

    Ok(config)
}

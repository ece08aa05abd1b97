//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.

pub mod cli;
pub mod cli_convert;
pub mod toml;
pub mod validator;

use crate::postfix::Operator;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment (drives the default log level)
    #[serde(default)]
    pub env: Environment,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Dev,
    Prod,
}

impl Environment {
    /// Log filter used when `RUST_LOG` is not set
    pub fn default_log_level(self) -> &'static str {
        match self {
            Environment::Local | Environment::Dev => "debug",
            Environment::Prod => "info",
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Address the task service listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Wait between polls when no expression is pending
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,
}

fn default_listen_addr() -> String {
    "0.0.0.0:50051".to_string()
}

fn default_idle_backoff_ms() -> u64 {
    10_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            idle_backoff_ms: default_idle_backoff_ms(),
        }
    }
}

impl CoordinatorConfig {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Task service address (host:port)
    #[serde(default = "default_coordinator_addr")]
    pub coordinator_addr: String,
    /// Number of concurrent worker loops
    #[serde(default = "default_computing_power")]
    pub computing_power: usize,
    /// Polling interval of each worker loop
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Bound on establishing a connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Simulated per-operator compute time
    #[serde(default)]
    pub latency: LatencyConfig,
}

fn default_coordinator_addr() -> String {
    "127.0.0.1:50051".to_string()
}

fn default_computing_power() -> usize {
    num_cpus::get()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            coordinator_addr: default_coordinator_addr(),
            computing_power: default_computing_power(),
            tick_interval_ms: default_tick_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            latency: LatencyConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Per-operator latency in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyConfig {
    #[serde(default = "default_latency_ms")]
    pub addition_ms: u64,
    #[serde(default = "default_latency_ms")]
    pub subtraction_ms: u64,
    #[serde(default = "default_latency_ms")]
    pub multiplication_ms: u64,
    #[serde(default = "default_latency_ms")]
    pub division_ms: u64,
}

fn default_latency_ms() -> u64 {
    1000
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            addition_ms: default_latency_ms(),
            subtraction_ms: default_latency_ms(),
            multiplication_ms: default_latency_ms(),
            division_ms: default_latency_ms(),
        }
    }
}

impl LatencyConfig {
    /// Same latency for every operator
    pub fn uniform(ms: u64) -> Self {
        Self {
            addition_ms: ms,
            subtraction_ms: ms,
            multiplication_ms: ms,
            division_ms: ms,
        }
    }

    pub fn for_operator(&self, op: Operator) -> Duration {
        let ms = match op {
            Operator::Add => self.addition_ms,
            Operator::Subtract => self.subtraction_ms,
            Operator::Multiply => self.multiplication_ms,
            Operator::Divide => self.division_ms,
        };
        Duration::from_millis(ms)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("calcfarm.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Local => write!(f, "local"),
            Environment::Dev => write!(f, "dev"),
            Environment::Prod => write!(f, "prod"),
        }
    }
}

impl fmt::Display for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} worker(s) -> {}, tick={}ms",
            self.computing_power, self.coordinator_addr, self.tick_interval_ms
        )?;
        write!(
            f,
            ", latency +{}ms -{}ms *{}ms /{}ms",
            self.latency.addition_ms,
            self.latency.subtraction_ms,
            self.latency.multiplication_ms,
            self.latency.division_ms
        )
    }
}

//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Standalone mode (default) - coordinator, task service and workers in one process
    Standalone,
    /// Coordinator mode - run the scheduler and task service over the database
    Coordinator,
    /// Worker mode - compute sub-tasks handed out by a coordinator
    Worker,
    /// Submit expressions to the database
    Submit,
    /// Print stored expressions
    Status,
    /// Create the database schema
    InitDb,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Local,
    Dev,
    Prod,
}

/// calcfarm - distributed arithmetic expression evaluation
#[derive(Parser, Debug)]
#[command(name = "calcfarm")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode
    #[arg(long, value_enum, default_value = "standalone")]
    pub mode: ExecutionMode,

    /// TOML configuration file
    #[arg(long, env = "CALCFARM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Deployment environment (overrides the config file)
    #[arg(long, value_enum)]
    pub env: Option<Environment>,

    /// Infix expressions (standalone and submit modes)
    #[arg(value_name = "EXPRESSION")]
    pub expressions: Vec<String>,

    // === Coordinator Options ===
    /// Address the task service listens on (e.g., 0.0.0.0:50051)
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Wait between polls when nothing is pending (e.g., 10s, 500ms)
    #[arg(long)]
    pub idle_backoff: Option<String>,

    // === Worker Options ===
    /// Coordinator address for worker mode (host:port)
    #[arg(long)]
    pub coordinator_addr: Option<String>,

    /// Number of concurrent worker loops
    #[arg(short = 'n', long)]
    pub computing_power: Option<usize>,

    /// Worker polling interval (e.g., 1s, 250ms)
    #[arg(long)]
    pub tick_interval: Option<String>,

    /// Connection timeout for workers (e.g., 5s)
    #[arg(long)]
    pub connect_timeout: Option<String>,

    /// Simulated time per addition (e.g., 200ms)
    #[arg(long)]
    pub addition_time: Option<String>,

    /// Simulated time per subtraction
    #[arg(long)]
    pub subtraction_time: Option<String>,

    /// Simulated time per multiplication
    #[arg(long)]
    pub multiplication_time: Option<String>,

    /// Simulated time per division
    #[arg(long)]
    pub division_time: Option<String>,

    // === Storage Options ===
    /// SQLite database file
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Only show this expression (status mode)
    #[arg(long)]
    pub id: Option<i64>,

    /// Drop existing data before creating the schema (init-db mode)
    #[arg(long)]
    pub reset: bool,
}

impl Cli {
    /// Check that positional arguments and flags fit the selected mode
    pub fn validate(&self) -> anyhow::Result<()> {
        match self.mode {
            ExecutionMode::Standalone | ExecutionMode::Submit => {
                if self.expressions.is_empty() {
                    anyhow::bail!("at least one EXPRESSION is required in {:?} mode", self.mode);
                }
            }
            ExecutionMode::Coordinator | ExecutionMode::Worker | ExecutionMode::Status | ExecutionMode::InitDb => {
                if !self.expressions.is_empty() {
                    anyhow::bail!("EXPRESSION arguments are not accepted in {:?} mode", self.mode);
                }
            }
        }

        if self.id.is_some() && self.mode != ExecutionMode::Status {
            anyhow::bail!("--id is only valid in status mode");
        }
        if self.reset && self.mode != ExecutionMode::InitDb {
            anyhow::bail!("--reset is only valid in init-db mode");
        }
        if self.computing_power == Some(0) {
            anyhow::bail!("computing_power must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mode_is_standalone() {
        let cli = Cli::try_parse_from(["calcfarm", "2 + 3"]).unwrap();
        assert_eq!(cli.mode, ExecutionMode::Standalone);
        assert_eq!(cli.expressions, vec!["2 + 3".to_string()]);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_worker_flags() {
        let cli = Cli::try_parse_from([
            "calcfarm",
            "--mode", "worker",
            "--coordinator-addr", "10.0.0.5:50051",
            "-n", "8",
            "--division-time", "2s",
        ])
        .unwrap();
        assert_eq!(cli.mode, ExecutionMode::Worker);
        assert_eq!(cli.computing_power, Some(8));
        assert_eq!(cli.division_time.as_deref(), Some("2s"));
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_init_db_mode_name() {
        let cli = Cli::try_parse_from(["calcfarm", "--mode", "init-db", "--reset"]).unwrap();
        assert_eq!(cli.mode, ExecutionMode::InitDb);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_mode_argument_checks() {
        let cli = Cli::try_parse_from(["calcfarm", "--mode", "submit"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["calcfarm", "--mode", "coordinator", "1 + 1"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["calcfarm", "--mode", "worker", "--reset"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["calcfarm", "-n", "0", "1 + 1"]).unwrap();
        assert!(cli.validate().is_err());
    }
}

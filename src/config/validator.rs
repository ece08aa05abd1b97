//! Configuration validation

use super::*;
use anyhow::{Context, Result};
use std::net::SocketAddr;

/// Largest accepted number of worker loops per process
pub const MAX_COMPUTING_POWER: usize = 1024;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_coordinator(&config.coordinator)?;
    validate_worker(&config.worker)?;
    validate_storage(&config.storage)?;

    Ok(())
}

/// Validate coordinator configuration
pub fn validate_coordinator(coordinator: &CoordinatorConfig) -> Result<()> {
    coordinator.listen_addr.parse::<SocketAddr>()
        .with_context(|| format!("coordinator.listen_addr is not a socket address: {}", coordinator.listen_addr))?;

    if coordinator.idle_backoff_ms == 0 {
        anyhow::bail!("coordinator.idle_backoff_ms must be greater than 0");
    }

    Ok(())
}

/// Validate worker configuration
pub fn validate_worker(worker: &WorkerConfig) -> Result<()> {
    validate_host_port(&worker.coordinator_addr)
        .context("Invalid worker.coordinator_addr")?;

    if worker.computing_power == 0 || worker.computing_power > MAX_COMPUTING_POWER {
        anyhow::bail!(
            "worker.computing_power must be between 1 and {} (got {})",
            MAX_COMPUTING_POWER,
            worker.computing_power
        );
    }

    if worker.tick_interval_ms == 0 {
        anyhow::bail!("worker.tick_interval_ms must be greater than 0");
    }

    if worker.connect_timeout_ms == 0 {
        anyhow::bail!("worker.connect_timeout_ms must be greater than 0");
    }

    Ok(())
}

/// Validate storage configuration
pub fn validate_storage(storage: &StorageConfig) -> Result<()> {
    if storage.path.as_os_str().is_empty() {
        anyhow::bail!("storage.path must not be empty");
    }

    Ok(())
}

/// Check a `host:port` address without resolving the host
fn validate_host_port(addr: &str) -> Result<()> {
    let (host, port) = addr.rsplit_once(':')
        .with_context(|| format!("missing port in {:?}", addr))?;

    if host.is_empty() {
        anyhow::bail!("missing host in {:?}", addr);
    }

    let port: u16 = port.parse()
        .with_context(|| format!("invalid port in {:?}", addr))?;
    if port == 0 {
        anyhow::bail!("port must be greater than 0 in {:?}", addr);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_listen_addr_must_parse() {
        let mut coordinator = CoordinatorConfig::default();
        coordinator.listen_addr = "localhost".to_string();
        assert!(validate_coordinator(&coordinator).is_err());

        coordinator.listen_addr = "[::1]:7000".to_string();
        assert!(validate_coordinator(&coordinator).is_ok());
    }

    #[test]
    fn test_zero_backoff_rejected() {
        let mut coordinator = CoordinatorConfig::default();
        coordinator.idle_backoff_ms = 0;
        assert!(validate_coordinator(&coordinator).is_err());
    }

    #[test]
    fn test_coordinator_addr_needs_port() {
        let mut worker = WorkerConfig::default();
        for bad in ["", "coordinator", ":50051", "host:http", "host:0"] {
            worker.coordinator_addr = bad.to_string();
            assert!(validate_worker(&worker).is_err(), "{:?} should be rejected", bad);
        }

        worker.coordinator_addr = "calc-coordinator.internal:50051".to_string();
        assert!(validate_worker(&worker).is_ok());
    }

    #[test]
    fn test_computing_power_bounds() {
        let mut worker = WorkerConfig::default();
        worker.computing_power = 0;
        assert!(validate_worker(&worker).is_err());

        worker.computing_power = MAX_COMPUTING_POWER + 1;
        assert!(validate_worker(&worker).is_err());

        worker.computing_power = MAX_COMPUTING_POWER;
        assert!(validate_worker(&worker).is_ok());
    }

    #[test]
    fn test_zero_tick_rejected() {
        let mut worker = WorkerConfig::default();
        worker.tick_interval_ms = 0;
        assert!(validate_worker(&worker).is_err());
    }

    #[test]
    fn test_empty_storage_path_rejected() {
        let storage = StorageConfig { path: PathBuf::new() };
        assert!(validate_storage(&storage).is_err());
    }
}

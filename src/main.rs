//! calcfarm CLI entry point

use anyhow::{Context, Result};
use calcfarm::config::cli::{Cli, ExecutionMode};
use calcfarm::config::{toml::load_config, Config};
use calcfarm::coordinator::Coordinator;
use calcfarm::postfix::infix::to_postfix;
use calcfarm::storage::{ExpressionRecord, ExpressionStatus, MemoryStore, SqliteStore};
use calcfarm::worker::WorkerPool;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.validate()?;

    let config = load_config(&cli)
        .context("Configuration validation failed")?;

    init_tracing(&config);

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        match cli.mode {
            ExecutionMode::Standalone => run_standalone(&cli, &config).await,
            ExecutionMode::Coordinator => run_coordinator(&config).await,
            ExecutionMode::Worker => run_worker(&config).await,
            ExecutionMode::Submit => run_submit(&cli, &config).await,
            ExecutionMode::Status => run_status(&cli, &config).await,
            ExecutionMode::InitDb => run_init_db(&cli, &config).await,
        }
    })
}

/// Log to stderr; `RUST_LOG` wins over the environment's default level
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.env.default_log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run coordinator, task service and workers in one process (in-memory store)
async fn run_standalone(cli: &Cli, config: &Config) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let mut rejected = 0usize;

    for expr in &cli.expressions {
        match to_postfix(expr) {
            Ok(postfix) => {
                store.insert(expr, &postfix)?;
            }
            Err(e) => {
                println!("{}: error: {}", expr, e);
                rejected += 1;
            }
        }
    }

    // Use the coordinator on an ephemeral localhost port (same path as distributed mode)
    let coordinator = Coordinator::bind("127.0.0.1:0", store.clone(), config.coordinator.idle_backoff())
        .await
        .context("Failed to start coordinator")?;

    let mut worker_config = config.worker.clone();
    worker_config.coordinator_addr = coordinator.local_addr()?.to_string();
    info!(%worker_config, "Starting local workers");
    let pool = WorkerPool::spawn(&worker_config);

    let outcome = tokio::select! {
        result = coordinator.run_until_idle() => result.map(Some),
        _ = shutdown_signal() => Ok(None),
    };
    pool.shutdown().await;

    if outcome?.is_none() {
        warn!("Interrupted before all expressions were evaluated");
    }

    let mut failed = rejected;
    for record in store.list() {
        print_record(&record);
        if record.status != ExpressionStatus::Done {
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} expression(s) could not be evaluated", failed);
    }
    Ok(())
}

fn print_record(record: &ExpressionRecord) {
    match (record.status, record.result, record.error.as_deref()) {
        (ExpressionStatus::Done, Some(value), _) => println!("{} = {}", record.expression, value),
        (_, _, Some(error)) => println!("{}: error: {}", record.expression, error),
        (status, _, None) => println!("{}: {}", record.expression, status),
    }
}

/// Serve workers and reduce stored expressions until interrupted
async fn run_coordinator(config: &Config) -> Result<()> {
    let store = open_store(config).await?;

    let coordinator = Coordinator::bind(
        config.coordinator.listen_addr.as_str(),
        store,
        config.coordinator.idle_backoff(),
    )
    .await
    .with_context(|| format!("Failed to start coordinator on {}", config.coordinator.listen_addr))?;

    tokio::select! {
        result = coordinator.run_forever() => result,
        _ = shutdown_signal() => {
            info!("Coordinator shutting down");
            Ok(())
        }
    }
}

/// Run the worker pool until interrupted
async fn run_worker(config: &Config) -> Result<()> {
    info!(worker_config = %config.worker, "Starting workers");
    let pool = WorkerPool::spawn(&config.worker);

    shutdown_signal().await;
    info!("Workers shutting down");
    pool.shutdown().await;

    Ok(())
}

async fn run_submit(cli: &Cli, config: &Config) -> Result<()> {
    let store = open_store(config).await?;

    for expr in &cli.expressions {
        let postfix = to_postfix(expr)
            .with_context(|| format!("Invalid expression: {}", expr))?;
        let id = store.submit(expr, &postfix).await?;
        println!("{}", id);
    }

    Ok(())
}

async fn run_status(cli: &Cli, config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.storage.path).await?;

    let json = match cli.id {
        Some(id) => serde_json::to_string_pretty(&store.get(id).await?)?,
        None => serde_json::to_string_pretty(&store.list().await?)?,
    };
    println!("{}", json);

    Ok(())
}

async fn run_init_db(cli: &Cli, config: &Config) -> Result<()> {
    let store = SqliteStore::open(&config.storage.path).await?;

    if cli.reset {
        store.reset().await?;
    } else {
        store.init().await?;
    }
    println!("Initialized {}", config.storage.path.display());

    Ok(())
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    let store = SqliteStore::open(&config.storage.path)
        .await
        .with_context(|| format!("Failed to open {}", config.storage.path.display()))?;
    store.init().await?;
    Ok(store)
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            _ => warn!("Failed to register signal handlers, falling back to Ctrl+C"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

//! Worker loop implementation
//!
//! A [`Worker`] is one polling loop: every tick it asks the coordinator for a
//! sub-task, computes it, waits the configured latency for the operator and
//! reports the outcome. Failures never end the loop; the worker logs them and
//! tries again on the next tick, reconnecting if the connection was lost.
//!
//! A [`WorkerPool`] runs `computing_power` such loops, each with its own
//! connection, so they compete for sub-tasks like separate machines would.
//!
//! # Example
//!
//! ```no_run
//! use calcfarm::config::WorkerConfig;
//! use calcfarm::worker::WorkerPool;
//!
//! # async fn run() {
//! let config = WorkerConfig {
//!     coordinator_addr: "127.0.0.1:50051".to_string(),
//!     computing_power: 4,
//!     ..Default::default()
//! };
//!
//! let pool = WorkerPool::spawn(&config);
//! // ... later
//! pool.shutdown().await;
//! # }
//! ```

use crate::config::{LatencyConfig, WorkerConfig};
use crate::distributed::client::CoordinatorClient;
use crate::task::{SubTask, TaskOutcome};
use crate::Result;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct Worker {
    client: CoordinatorClient,
    latency: LatencyConfig,
}

impl Worker {
    pub fn new(client: CoordinatorClient, latency: LatencyConfig) -> Self {
        Self { client, latency }
    }

    pub fn id(&self) -> &str {
        self.client.worker_id()
    }

    /// Poll every `tick_interval` until the task is dropped
    pub async fn run_forever(mut self, tick_interval: Duration) {
        info!(worker = %self.id(), tick_ms = tick_interval.as_millis() as u64, "Worker started");

        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                warn!(worker = %self.id(), error = %format!("{:#}", e), "Tick abandoned");
            }
        }
    }

    /// Fetch, compute and report one sub-task
    ///
    /// Waits for as long as the coordinator has nothing to hand out.
    pub async fn tick(&mut self) -> Result<()> {
        let response = self.client.give_task().await?;
        let id = response.id;
        let tag = response.tag();

        debug!(
            worker = %self.id(),
            task_id = id,
            expression_id = tag.expression_id,
            round = tag.round,
            op = %response.operation,
            "Received task"
        );

        let value = match SubTask::try_from(response) {
            Ok(task) => {
                let value = task.compute();
                tokio::time::sleep(self.latency.for_operator(task.operator)).await;
                value
            }
            Err(e) => Err(e),
        };

        if let Err(ref e) = value {
            warn!(worker = %self.id(), task_id = id, %tag, error = %e, "Sub-task failed");
        }

        self.client.get_result(TaskOutcome { id, tag, value }).await?;
        debug!(worker = %self.id(), task_id = id, %tag, "Result reported");

        Ok(())
    }
}

/// Set of worker loops sharing one configuration
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `config.computing_power` worker loops on the current runtime
    pub fn spawn(config: &WorkerConfig) -> Self {
        let node_id = get_node_id();

        let handles = (0..config.computing_power)
            .map(|i| {
                let client = CoordinatorClient::new(
                    config.coordinator_addr.clone(),
                    format!("{}-{}", node_id, i),
                    config.connect_timeout(),
                );
                let worker = Worker::new(client, config.latency.clone());
                tokio::spawn(worker.run_forever(config.tick_interval()))
            })
            .collect::<Vec<_>>();

        info!(workers = handles.len(), coordinator = %config.coordinator_addr, "Worker pool started");
        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stop every loop and wait for them to unwind
    pub async fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        for handle in self.handles {
            let _ = handle.await;
        }
        debug!("Worker pool stopped");
    }
}

/// Identifier of this machine, used as the worker id prefix
fn get_node_id() -> String {
    if let Ok(hostname) = hostname::get() {
        if let Ok(hostname_str) = hostname.into_string() {
            return hostname_str;
        }
    }

    "unknown".to_string()
}

//! Coordinator module
//!
//! Binds the task service and drives the reduction scheduler over an
//! expression store. Standalone mode uses the same coordinator on an ephemeral
//! localhost port with in-process workers.

pub mod scheduler;

pub use scheduler::{Processed, Reduction, ReductionError, ReductionScheduler};

use crate::distributed::queue::operation_queues;
use crate::distributed::server::TaskService;
use crate::storage::ExpressionStore;
use crate::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::ToSocketAddrs;
use tracing::info;

pub struct Coordinator<S> {
    scheduler: ReductionScheduler<S>,
    service: TaskService,
}

impl<S: ExpressionStore> Coordinator<S> {
    /// Bind the task service and wire it to a scheduler over `store`
    pub async fn bind<A: ToSocketAddrs>(addr: A, store: S, idle_backoff: Duration) -> Result<Self> {
        let (dispatch, service_queues) = operation_queues();
        let service = TaskService::bind(addr, service_queues).await?;
        let scheduler = ReductionScheduler::new(store, dispatch, idle_backoff);

        Ok(Self { scheduler, service })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.service.local_addr()
    }

    /// Serve workers and reduce expressions until the future is dropped
    pub async fn run_forever(self) -> Result<()> {
        let Self { mut scheduler, service } = self;
        info!(addr = %service.local_addr()?, "Coordinator running");

        let service_task = tokio::spawn(service.run());
        let result = scheduler.run_forever().await;
        service_task.abort();

        result.map_err(Into::into)
    }

    /// Serve workers until no expression is pending, then stop the service
    pub async fn run_until_idle(self) -> Result<Vec<Processed>> {
        let Self { mut scheduler, service } = self;

        let service_task = tokio::spawn(service.run());
        let result = scheduler.run_until_idle().await;
        service_task.abort();

        Ok(result?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LatencyConfig, WorkerConfig};
    use crate::postfix::infix::to_postfix;
    use crate::storage::{ExpressionStatus, MemoryStore};
    use crate::worker::WorkerPool;
    use std::sync::Arc;

    fn worker_config(addr: SocketAddr, computing_power: usize) -> WorkerConfig {
        WorkerConfig {
            coordinator_addr: addr.to_string(),
            computing_power,
            tick_interval_ms: 5,
            connect_timeout_ms: 1000,
            latency: LatencyConfig::uniform(0),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_over_tcp() {
        let store = Arc::new(MemoryStore::new());
        let cases = [
            ("(2 + 3) * (4 + 5)", Some(45.0)),
            ("10 / 4 - 1.5", Some(1.0)),
            ("2 * -(3 + 1)", Some(-8.0)),
            ("7", Some(7.0)),
            ("1 / (2 - 2)", None),
        ];

        let mut ids = Vec::new();
        for (infix, _) in &cases {
            let postfix = to_postfix(infix).unwrap();
            ids.push(store.insert(infix, &postfix).unwrap());
        }

        let coordinator = Coordinator::bind("127.0.0.1:0", store.clone(), Duration::from_millis(10))
            .await
            .unwrap();
        let pool = WorkerPool::spawn(&worker_config(coordinator.local_addr().unwrap(), 3));

        let processed = tokio::time::timeout(Duration::from_secs(20), coordinator.run_until_idle())
            .await
            .expect("reduction did not finish")
            .unwrap();
        pool.shutdown().await;

        assert_eq!(processed.len(), cases.len());
        for (id, (infix, expected)) in ids.iter().zip(cases.iter()) {
            let record = store.get(*id).unwrap();
            match expected {
                Some(value) => {
                    assert_eq!(record.status, ExpressionStatus::Done, "{}", infix);
                    assert_eq!(record.result, Some(*value), "{}", infix);
                }
                None => {
                    assert_eq!(record.status, ExpressionStatus::Failed, "{}", infix);
                    assert!(record.error.unwrap().contains("division by zero"));
                }
            }
        }
    }

    #[tokio::test]
    async fn test_reduction_waits_for_late_workers() {
        let store = Arc::new(MemoryStore::new());
        let id = store.insert("", "1 2 + 3 4 + *").unwrap();

        let coordinator = Coordinator::bind("127.0.0.1:0", store.clone(), Duration::from_millis(10))
            .await
            .unwrap();
        let addr = coordinator.local_addr().unwrap();
        let run = tokio::spawn(coordinator.run_until_idle());

        // No workers yet: the first round is waiting
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.history().is_empty());

        let pool = WorkerPool::spawn(&worker_config(addr, 2));
        let processed = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .expect("reduction did not finish")
            .unwrap()
            .unwrap();
        pool.shutdown().await;

        assert_eq!(processed, vec![Processed::Done { id, value: 21.0, rounds: 2 }]);
    }

    #[tokio::test]
    async fn test_replacement_workers_pick_up_new_expressions() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = Coordinator::bind("127.0.0.1:0", store.clone(), Duration::from_millis(10))
            .await
            .unwrap();
        let addr = coordinator.local_addr().unwrap();
        let run = tokio::spawn(coordinator.run_forever());

        // First pool connects, waits for work, then goes away
        let first = WorkerPool::spawn(&worker_config(addr, 2));
        tokio::time::sleep(Duration::from_millis(100)).await;
        first.shutdown().await;

        let id = store.insert("(1 + 2) * (3 + 4)", "1 2 + 3 4 + *").unwrap();
        let second = WorkerPool::spawn(&worker_config(addr, 2));

        let mut done = false;
        for _ in 0..500 {
            if store.get(id).unwrap().status == ExpressionStatus::Done {
                done = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        second.shutdown().await;
        run.abort();

        assert!(done, "replacement workers never finished the expression");
        assert_eq!(store.get(id).unwrap().result, Some(21.0));
    }
}

//! Operation queue pair
//!
//! Two unbounded FIFO channels connect the reduction scheduler to the task
//! service: sub-tasks flow out, outcomes flow back in. They are the only state
//! shared between the scheduler and the connection handlers.
//!
//! The dispatch side marks which round is active. Sub-tasks left behind by an
//! earlier round (requeued after a failed delivery, or never taken because the
//! round was abandoned) are dropped when a handler dequeues them, so task ids
//! that restart every round can never be confused across rounds.

use crate::task::{RoundTag, SubTask, TaskOutcome};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// The other end of the queue pair is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation queue closed")]
pub struct QueueClosed;

/// Create a connected queue pair
pub fn operation_queues() -> (DispatchQueues, ServiceQueues) {
    let (tasks_tx, tasks_rx) = mpsc::unbounded_channel();
    let (results_tx, results_rx) = mpsc::unbounded_channel();
    let active = Arc::new(Mutex::new(None));

    let dispatch = DispatchQueues {
        tasks_tx: tasks_tx.clone(),
        results_rx,
        active: Arc::clone(&active),
    };
    let service = ServiceQueues {
        tasks_tx,
        tasks_rx: Arc::new(tokio::sync::Mutex::new(tasks_rx)),
        results_tx,
        active,
    };

    (dispatch, service)
}

/// Scheduler side: offers sub-tasks, receives outcomes
#[derive(Debug)]
pub struct DispatchQueues {
    tasks_tx: UnboundedSender<SubTask>,
    results_rx: UnboundedReceiver<TaskOutcome>,
    active: Arc<Mutex<Option<RoundTag>>>,
}

impl DispatchQueues {
    /// Mark `tag` as the round whose sub-tasks may be handed out
    pub fn begin_round(&self, tag: RoundTag) {
        if let Ok(mut active) = self.active.lock() {
            *active = Some(tag);
        }
    }

    /// No round is active; queued sub-tasks become stale
    pub fn end_round(&self) {
        if let Ok(mut active) = self.active.lock() {
            *active = None;
        }
    }

    /// Enqueue a sub-task without waiting
    pub fn offer(&self, task: SubTask) -> Result<(), QueueClosed> {
        self.tasks_tx.send(task).map_err(|_| QueueClosed)
    }

    /// Wait for the next outcome
    ///
    /// Returns `None` once every service handle is gone.
    pub async fn next_result(&mut self) -> Option<TaskOutcome> {
        self.results_rx.recv().await
    }
}

/// Service side: hands sub-tasks to workers, accepts their outcomes
///
/// Cheap to clone; every connection handler holds one.
#[derive(Debug, Clone)]
pub struct ServiceQueues {
    tasks_tx: UnboundedSender<SubTask>,
    tasks_rx: Arc<tokio::sync::Mutex<UnboundedReceiver<SubTask>>>,
    results_tx: UnboundedSender<TaskOutcome>,
    active: Arc<Mutex<Option<RoundTag>>>,
}

impl ServiceQueues {
    /// Wait for the next sub-task of the active round
    ///
    /// Handlers queue on the receiver lock, so tasks go out in FIFO order and
    /// each one to exactly one caller. Cancel safe: dropping the future never
    /// loses a task.
    pub async fn take_task(&self) -> Option<SubTask> {
        let mut rx = self.tasks_rx.lock().await;
        loop {
            let task = rx.recv().await?;
            if self.is_active(task.tag) {
                return Some(task);
            }
            debug!(task_id = task.id, tag = %task.tag, "Dropping stale sub-task");
        }
    }

    /// Put back a sub-task that could not be delivered
    pub fn requeue(&self, task: SubTask) {
        // The sender half held here keeps the channel open
        let _ = self.tasks_tx.send(task);
    }

    /// Hand an outcome to the scheduler without waiting on it
    pub fn submit_result(&self, outcome: TaskOutcome) -> Result<(), QueueClosed> {
        self.results_tx.send(outcome).map_err(|_| QueueClosed)
    }

    fn is_active(&self, tag: RoundTag) -> bool {
        self.active
            .lock()
            .map(|active| *active == Some(tag))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postfix::Operator;
    use std::time::Duration;

    fn task(id: i64, tag: RoundTag) -> SubTask {
        SubTask {
            id,
            tag,
            operand1: 1.0,
            operand2: 2.0,
            operator: Operator::Add,
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (dispatch, service) = operation_queues();
        let tag = RoundTag::new(1, 1);
        dispatch.begin_round(tag);

        for id in 1..=3 {
            dispatch.offer(task(id, tag)).unwrap();
        }

        for id in 1..=3 {
            assert_eq!(service.take_task().await.unwrap().id, id);
        }
    }

    #[tokio::test]
    async fn test_each_task_to_one_consumer() {
        let (dispatch, service) = operation_queues();
        let tag = RoundTag::new(1, 1);
        dispatch.begin_round(tag);
        dispatch.offer(task(1, tag)).unwrap();

        let other = service.clone();
        let first = service.take_task().await.unwrap();
        assert_eq!(first.id, 1);

        let second = tokio::time::timeout(Duration::from_millis(50), other.take_task()).await;
        assert!(second.is_err(), "task handed out twice");
    }

    #[tokio::test]
    async fn test_stale_tasks_dropped() {
        let (dispatch, service) = operation_queues();
        let old = RoundTag::new(1, 1);
        let new = RoundTag::new(1, 2);

        dispatch.begin_round(old);
        dispatch.offer(task(1, old)).unwrap();
        dispatch.end_round();

        dispatch.begin_round(new);
        dispatch.offer(task(1, new)).unwrap();

        let taken = service.take_task().await.unwrap();
        assert_eq!(taken.tag, new);
    }

    #[tokio::test]
    async fn test_requeue_redelivers() {
        let (dispatch, service) = operation_queues();
        let tag = RoundTag::new(4, 1);
        dispatch.begin_round(tag);
        dispatch.offer(task(1, tag)).unwrap();

        let taken = service.take_task().await.unwrap();
        service.requeue(taken.clone());

        assert_eq!(service.take_task().await.unwrap(), taken);
    }

    #[tokio::test]
    async fn test_results_flow_back() {
        let (mut dispatch, service) = operation_queues();
        let tag = RoundTag::new(2, 1);

        service
            .submit_result(TaskOutcome { id: 1, tag, value: Ok(5.0) })
            .unwrap();

        let outcome = dispatch.next_result().await.unwrap();
        assert_eq!(outcome.id, 1);
        assert_eq!(outcome.value, Ok(5.0));
    }

    #[tokio::test]
    async fn test_closed_when_other_side_dropped() {
        let (mut dispatch, service) = operation_queues();
        drop(service);
        assert!(dispatch.next_result().await.is_none());

        let (dispatch, service) = operation_queues();
        drop(dispatch);
        let outcome = TaskOutcome { id: 1, tag: RoundTag::new(1, 1), value: Ok(1.0) };
        assert_eq!(service.submit_result(outcome), Err(QueueClosed));
    }
}

//! Coordinator/worker plumbing
//!
//! # Architecture
//!
//! calcfarm splits evaluation between one coordinator and any number of workers:
//!
//! - **Coordinator**: runs the reduction scheduler and the task service
//! - **Task service**: accepts worker connections, serves `GiveTask`/`GetResult`
//! - **Workers**: poll for sub-tasks, compute them, report results
//!
//! # Modules
//!
//! - `protocol`: Message definitions and framing
//! - `queue`: Operation queue pair shared by scheduler and task service
//! - `server`: Task service
//! - `client`: Worker-side connection to the task service

pub mod client;
pub mod protocol;
pub mod queue;
pub mod server;

pub use client::CoordinatorClient;
pub use protocol::{Message, ResultRequest, TaskRequest, TaskResponse, PROTOCOL_VERSION};
pub use queue::{operation_queues, DispatchQueues, QueueClosed, ServiceQueues};
pub use server::TaskService;

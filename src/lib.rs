//! calcfarm - Distributed arithmetic expression evaluation
//!
//! calcfarm evaluates arithmetic expressions by splitting them into binary
//! sub-operations and farming those out to a pool of remote workers.
//!
//! # Architecture
//!
//! - **Postfix utilities**: token classification, ready-triple detection, infix conversion
//! - **Reduction scheduler**: reduces one expression round by round
//! - **Task service**: hands sub-tasks to workers and collects their results
//! - **Workers**: polling loops that compute sub-tasks with simulated latency
//! - **Storage**: SQLite (or in-memory) expression store

pub mod config;
pub mod coordinator;
pub mod distributed;
pub mod postfix;
pub mod storage;
pub mod task;
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::Coordinator;
pub use worker::{Worker, WorkerPool};

/// Result type used throughout calcfarm
pub type Result<T> = anyhow::Result<T>;

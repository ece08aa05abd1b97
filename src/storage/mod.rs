//! Expression persistence
//!
//! The reduction scheduler only needs two operations from storage: fetch the
//! next expression still computing, and write back an updated expression. They
//! form the [`ExpressionStore`] trait so the scheduler can run against the
//! SQLite store in production and the in-memory store in tests.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a stored expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpressionStatus {
    /// Rounds remain
    Computing,
    /// Reduced to a single value
    Done,
    /// Abandoned (unreducible, malformed or arithmetic failure)
    Failed,
}

impl ExpressionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExpressionStatus::Computing => "computing",
            ExpressionStatus::Done => "done",
            ExpressionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExpressionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpressionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "computing" => Ok(ExpressionStatus::Computing),
            "done" => Ok(ExpressionStatus::Done),
            "failed" => Ok(ExpressionStatus::Failed),
            other => Err(StoreError::Database(format!("unknown status: {}", other))),
        }
    }
}

/// An expression handed to the scheduler
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExpression {
    pub id: i64,
    pub postfix: String,
}

/// What the scheduler writes back after a round or at the end of a reduction
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionUpdate {
    pub postfix: String,
    pub status: ExpressionStatus,
    pub result: Option<f64>,
    pub error: Option<String>,
}

impl ExpressionUpdate {
    /// Intermediate checkpoint after a round
    pub fn checkpoint(postfix: impl Into<String>) -> Self {
        Self {
            postfix: postfix.into(),
            status: ExpressionStatus::Computing,
            result: None,
            error: None,
        }
    }

    /// Final value
    pub fn done(postfix: impl Into<String>, result: f64) -> Self {
        Self {
            postfix: postfix.into(),
            status: ExpressionStatus::Done,
            result: Some(result),
            error: None,
        }
    }

    /// Abandoned reduction
    pub fn failed(postfix: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            postfix: postfix.into(),
            status: ExpressionStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// A stored expression as reported to users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionRecord {
    pub id: i64,

    /// Expression as submitted
    pub expression: String,

    /// Current postfix form (the value alone once done)
    pub postfix: String,

    pub status: ExpressionStatus,
    pub result: Option<f64>,
    pub error: Option<String>,
}

/// Storage failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Nothing is waiting to be computed; retry later
    #[error("no pending expression")]
    NoPending,

    #[error("expression {0} not found")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Whether the caller should simply back off and retry
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::NoPending)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Storage used by the reduction scheduler
#[async_trait]
pub trait ExpressionStore: Send + Sync {
    /// Next expression still computing, oldest first
    async fn fetch_pending_expression(&self) -> Result<PendingExpression, StoreError>;

    /// Write back an expression's postfix text, status and result
    async fn persist_expression(&self, id: i64, update: &ExpressionUpdate) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: ExpressionStore + ?Sized> ExpressionStore for std::sync::Arc<S> {
    async fn fetch_pending_expression(&self) -> Result<PendingExpression, StoreError> {
        (**self).fetch_pending_expression().await
    }

    async fn persist_expression(&self, id: i64, update: &ExpressionUpdate) -> Result<(), StoreError> {
        (**self).persist_expression(id, update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [ExpressionStatus::Computing, ExpressionStatus::Done, ExpressionStatus::Failed] {
            assert_eq!(status.as_str().parse::<ExpressionStatus>().unwrap(), status);
        }
        assert!("pending".parse::<ExpressionStatus>().is_err());
    }

    #[test]
    fn test_update_constructors() {
        let done = ExpressionUpdate::done("14.000000", 14.0);
        assert_eq!(done.status, ExpressionStatus::Done);
        assert_eq!(done.result, Some(14.0));

        let failed = ExpressionUpdate::failed("1 2", "unreducible");
        assert_eq!(failed.status, ExpressionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("unreducible"));
        assert!(failed.result.is_none());
    }

    #[test]
    fn test_only_no_pending_is_transient() {
        assert!(StoreError::NoPending.is_transient());
        assert!(!StoreError::NotFound(1).is_transient());
        assert!(!StoreError::Database("locked".into()).is_transient());
    }

    #[test]
    fn test_record_serializes_lowercase_status() {
        let record = ExpressionRecord {
            id: 1,
            expression: "3 + 4".into(),
            postfix: "3 4 +".into(),
            status: ExpressionStatus::Computing,
            result: None,
            error: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"status\":\"computing\""));
    }
}

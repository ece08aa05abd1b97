//! Sub-operation model
//!
//! A [`SubTask`] is one binary operation extracted from an expression for remote
//! computation. It lives for a single round: the scheduler creates it from a
//! ready triple, a worker computes it, and the resulting [`TaskOutcome`] is
//! matched back by id and consumed once.

use crate::postfix::{Operator, ReadyTriple};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one round of one expression
///
/// Task ids restart at 1 every round, so a result is only meaningful together
/// with the round it was computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoundTag {
    pub expression_id: i64,
    pub round: u32,
}

impl RoundTag {
    pub fn new(expression_id: i64, round: u32) -> Self {
        Self { expression_id, round }
    }
}

impl fmt::Display for RoundTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr {} round {}", self.expression_id, self.round)
    }
}

/// One binary operation dispatched to a worker
#[derive(Debug, Clone, PartialEq)]
pub struct SubTask {
    /// Sequence number within the round (1, 2, 3, ...)
    pub id: i64,
    pub tag: RoundTag,
    pub operand1: f64,
    pub operand2: f64,
    pub operator: Operator,
}

impl SubTask {
    /// Build the sub-task for a ready triple
    pub fn from_triple(tag: RoundTag, triple: &ReadyTriple) -> Self {
        Self {
            id: triple.task_id,
            tag,
            operand1: triple.lhs,
            operand2: triple.rhs,
            operator: triple.operator,
        }
    }

    /// Compute the operation locally
    pub fn compute(&self) -> Result<f64, ComputeError> {
        self.operator.apply(self.operand1, self.operand2)
    }
}

/// Result of a sub-task as reported by a worker
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub id: i64,
    pub tag: RoundTag,
    pub value: Result<f64, ComputeError>,
}

/// Classified arithmetic failure of a sub-task
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum ComputeError {
    #[error("division by zero ({dividend} / 0)")]
    DivisionByZero { dividend: f64 },

    #[error("result of {lhs} {operator} {rhs} is not finite")]
    NonFinite { operator: String, lhs: f64, rhs: f64 },

    #[error("unknown operator: {0:?}")]
    UnknownOperator(String),
}

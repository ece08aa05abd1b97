//! Reduction scheduler
//!
//! Reduces one stored postfix expression at a time. Every round it finds the
//! ready triples, offers one sub-task per triple to the workers, waits for all
//! of their results, folds the values back into the token sequence and
//! checkpoints the shorter expression. The expression is done when a single
//! number is left.
//!
//! Round state lives on the stack of [`ReductionScheduler::reduce`]; the only
//! thing shared with the task service is the queue pair.

use crate::distributed::queue::{DispatchQueues, QueueClosed};
use crate::postfix::{self, ReadyTriple};
use crate::storage::{ExpressionStore, ExpressionUpdate, StoreError};
use crate::task::{ComputeError, RoundTag, SubTask};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Why an expression could not be reduced
#[derive(Debug, Error)]
pub enum ReductionError {
    /// More than one token left but nothing is ready to compute
    #[error("unreducible expression {postfix:?}: no operation is ready")]
    Unreducible { postfix: String },

    #[error("malformed expression {0:?}")]
    Malformed(String),

    #[error("sub-task {id} failed: {source}")]
    Arithmetic {
        id: i64,
        #[source]
        source: ComputeError,
    },

    #[error(transparent)]
    QueueClosed(#[from] QueueClosed),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReductionError {
    /// Whether the expression itself is at fault and should be marked failed
    pub fn is_expression_fault(&self) -> bool {
        matches!(
            self,
            ReductionError::Unreducible { .. }
                | ReductionError::Malformed(_)
                | ReductionError::Arithmetic { .. }
        )
    }
}

/// A fully reduced expression
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub value: f64,

    /// Final single-token postfix form
    pub postfix: String,

    /// Number of rounds it took
    pub rounds: u32,
}

/// What happened to one expression taken from the store
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    Done { id: i64, value: f64, rounds: u32 },
    Failed { id: i64, reason: String },
}

pub struct ReductionScheduler<S> {
    store: S,
    queues: DispatchQueues,
    idle_backoff: Duration,
}

impl<S: ExpressionStore> ReductionScheduler<S> {
    pub fn new(store: S, queues: DispatchQueues, idle_backoff: Duration) -> Self {
        Self {
            store,
            queues,
            idle_backoff,
        }
    }

    /// Process expressions forever
    ///
    /// Waits `idle_backoff` whenever nothing is pending or the store fails.
    /// Returns only if the task service side of the queues is gone.
    pub async fn run_forever(&mut self) -> Result<(), ReductionError> {
        info!(backoff_ms = self.idle_backoff.as_millis() as u64, "Reduction scheduler started");

        loop {
            match self.process_next().await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!("No pending expression");
                    tokio::time::sleep(self.idle_backoff).await;
                }
                Err(ReductionError::QueueClosed(e)) => {
                    error!("Task service gone, stopping scheduler");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(error = %e, "Failed to process expression");
                    tokio::time::sleep(self.idle_backoff).await;
                }
            }
        }
    }

    /// Process expressions until none is pending
    pub async fn run_until_idle(&mut self) -> Result<Vec<Processed>, ReductionError> {
        let mut processed = Vec::new();
        while let Some(p) = self.process_next().await? {
            processed.push(p);
        }
        Ok(processed)
    }

    /// Fetch and fully process the next pending expression
    ///
    /// Returns `Ok(None)` when nothing is pending. Expressions that cannot be
    /// reduced are persisted as failed so the store stops offering them.
    pub async fn process_next(&mut self) -> Result<Option<Processed>, ReductionError> {
        let expr = match self.store.fetch_pending_expression().await {
            Ok(expr) => expr,
            Err(e) if e.is_transient() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        info!(expression_id = expr.id, postfix = %expr.postfix, "Expression fetched");

        let mut tokens = postfix::tokenize(&expr.postfix);

        match self.reduce(expr.id, &mut tokens).await {
            Ok(reduction) => {
                let update = ExpressionUpdate::done(&reduction.postfix, reduction.value);
                self.store.persist_expression(expr.id, &update).await?;
                info!(
                    expression_id = expr.id,
                    value = reduction.value,
                    rounds = reduction.rounds,
                    "Expression done"
                );
                Ok(Some(Processed::Done {
                    id: expr.id,
                    value: reduction.value,
                    rounds: reduction.rounds,
                }))
            }
            Err(e) if e.is_expression_fault() => {
                warn!(expression_id = expr.id, error = %e, "Expression failed");
                let reason = e.to_string();
                // Keep the progress of the rounds that did complete
                let update = ExpressionUpdate::failed(postfix::join(&tokens), &reason);
                self.store.persist_expression(expr.id, &update).await?;
                Ok(Some(Processed::Failed { id: expr.id, reason }))
            }
            Err(e) => Err(e),
        }
    }

    /// Reduce the tokens of expression `id` to a single value
    ///
    /// `tokens` is replaced after every completed round, so on error it holds
    /// the last fully substituted form. Intermediate forms are checkpointed
    /// after each round; a failed checkpoint is logged and the reduction
    /// carries on.
    pub async fn reduce(&mut self, id: i64, tokens: &mut Vec<String>) -> Result<Reduction, ReductionError> {
        let mut round = 0u32;

        loop {
            match tokens.as_slice() {
                [] => return Err(ReductionError::Malformed(String::new())),
                [only] => {
                    let value = only
                        .parse::<f64>()
                        .map_err(|_| ReductionError::Malformed(only.clone()))?;
                    return Ok(Reduction {
                        value,
                        postfix: only.clone(),
                        rounds: round,
                    });
                }
                _ => {}
            }

            round += 1;
            let tag = RoundTag::new(id, round);
            *tokens = self.run_round(tag, tokens.as_slice()).await?;

            if tokens.len() > 1 {
                let checkpoint = ExpressionUpdate::checkpoint(postfix::join(tokens.as_slice()));
                match self.store.persist_expression(id, &checkpoint).await {
                    Ok(()) => debug!(expression_id = id, round, postfix = %checkpoint.postfix, "Checkpoint persisted"),
                    Err(e) => warn!(expression_id = id, round, error = %e, "Failed to persist checkpoint"),
                }
            }
        }
    }

    /// Run one round and return the substituted, compacted tokens
    async fn run_round(&mut self, tag: RoundTag, tokens: &[String]) -> Result<Vec<String>, ReductionError> {
        let triples = postfix::scan_ready_triples(tokens);
        if triples.is_empty() {
            return Err(ReductionError::Unreducible {
                postfix: postfix::join(tokens),
            });
        }

        self.queues.begin_round(tag);
        let collected = self.dispatch_and_collect(tag, &triples).await;
        self.queues.end_round();

        let values = collected?;
        postfix::substitute(tokens, &triples, &values)
            .ok_or_else(|| ReductionError::Malformed(postfix::join(tokens)))
    }

    async fn dispatch_and_collect(
        &mut self,
        tag: RoundTag,
        triples: &[ReadyTriple],
    ) -> Result<HashMap<i64, f64>, ReductionError> {
        for triple in triples {
            self.queues.offer(SubTask::from_triple(tag, triple))?;
        }

        let expected = triples.len();
        info!(
            expression_id = tag.expression_id,
            round = tag.round,
            tasks = expected,
            "Round dispatched"
        );

        let mut values = HashMap::with_capacity(expected);
        while values.len() < expected {
            let outcome = self.queues.next_result().await.ok_or(QueueClosed)?;

            if outcome.tag != tag {
                debug!(task_id = outcome.id, stale = %outcome.tag, current = %tag, "Ignoring result of another round");
                continue;
            }
            if outcome.id < 1 || outcome.id > expected as i64 {
                warn!(task_id = outcome.id, %tag, "Ignoring result with unknown task id");
                continue;
            }
            if values.contains_key(&outcome.id) {
                warn!(task_id = outcome.id, %tag, "Ignoring duplicate result");
                continue;
            }

            match outcome.value {
                Ok(value) => {
                    debug!(task_id = outcome.id, value, %tag, "Result collected");
                    values.insert(outcome.id, value);
                }
                Err(source) => {
                    return Err(ReductionError::Arithmetic { id: outcome.id, source });
                }
            }
        }

        Ok(values)
    }
}

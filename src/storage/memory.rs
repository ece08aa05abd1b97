//! In-memory expression store
//!
//! Backs standalone mode and the scheduler tests. Every persisted update is
//! also appended to a history log so tests can check each checkpoint.

use super::*;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    records: BTreeMap<i64, ExpressionRecord>,
    history: Vec<(i64, ExpressionUpdate)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an expression with status `computing`, returning its id
    pub fn insert(&self, expression: &str, postfix: &str) -> Result<i64, StoreError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = inner.next_id;

        inner.records.insert(id, ExpressionRecord {
            id,
            expression: expression.to_string(),
            postfix: postfix.to_string(),
            status: ExpressionStatus::Computing,
            result: None,
            error: None,
        });

        Ok(id)
    }

    pub fn get(&self, id: i64) -> Option<ExpressionRecord> {
        self.lock().ok()?.records.get(&id).cloned()
    }

    pub fn list(&self) -> Vec<ExpressionRecord> {
        self.lock()
            .map(|inner| inner.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every update persisted so far, in order
    pub fn history(&self) -> Vec<(i64, ExpressionUpdate)> {
        self.lock()
            .map(|inner| inner.history.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ExpressionStore for MemoryStore {
    async fn fetch_pending_expression(&self) -> Result<PendingExpression, StoreError> {
        let inner = self.lock()?;
        inner
            .records
            .values()
            .find(|r| r.status == ExpressionStatus::Computing)
            .map(|r| PendingExpression {
                id: r.id,
                postfix: r.postfix.clone(),
            })
            .ok_or(StoreError::NoPending)
    }

    async fn persist_expression(&self, id: i64, update: &ExpressionUpdate) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        record.postfix = update.postfix.clone();
        record.status = update.status;
        record.result = update.result;
        record.error = update.error.clone();

        inner.history.push((id, update.clone()));
        Ok(())
    }
}

//! SQLite-backed expression store

use super::*;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS expressions (
    expr_id     INTEGER PRIMARY KEY,
    expr        TEXT    NOT NULL,
    polish_expr TEXT    NOT NULL,
    status      TEXT    NOT NULL DEFAULT 'computing',
    result      REAL,
    error       TEXT,
    created_at  TEXT    NOT NULL DEFAULT (datetime('now')),
    updated_at  TEXT    NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_expressions_status ON expressions(status, expr_id);
"#;

const DROP_SQL: &str = "DROP TABLE IF EXISTS expressions";

const RECORD_COLUMNS: &str = "expr_id, expr, polish_expr, status, result, error";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating the file if needed) without touching the schema
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await?;

        tracing::info!(path = %path.display(), "Expression store opened");
        Ok(Self { pool })
    }

    /// Create the schema if it does not exist
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Drop every stored expression and recreate the schema
    pub async fn reset(&self) -> Result<(), StoreError> {
        sqlx::query(DROP_SQL).execute(&self.pool).await?;
        tracing::warn!("Expression table dropped");
        self.init().await
    }

    /// Store a new expression with status `computing`
    pub async fn submit(&self, expression: &str, postfix: &str) -> Result<i64, StoreError> {
        let done = sqlx::query("INSERT INTO expressions (expr, polish_expr) VALUES (?1, ?2)")
            .bind(expression)
            .bind(postfix)
            .execute(&self.pool)
            .await?;

        let id = done.last_insert_rowid();
        tracing::debug!(expression_id = id, postfix, "Expression submitted");
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> Result<ExpressionRecord, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM expressions WHERE expr_id = ?1", RECORD_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))?;

        row_to_record(&row)
    }

    pub async fn list(&self) -> Result<Vec<ExpressionRecord>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {} FROM expressions ORDER BY expr_id", RECORD_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_record).collect()
    }
}

fn row_to_record(row: &SqliteRow) -> Result<ExpressionRecord, StoreError> {
    Ok(ExpressionRecord {
        id: row.get("expr_id"),
        expression: row.get("expr"),
        postfix: row.get("polish_expr"),
        status: row.get::<String, _>("status").parse()?,
        result: row.get("result"),
        error: row.get("error"),
    })
}

#[async_trait]
impl ExpressionStore for SqliteStore {
    async fn fetch_pending_expression(&self) -> Result<PendingExpression, StoreError> {
        let row = sqlx::query(
            "SELECT expr_id, polish_expr FROM expressions
             WHERE status = 'computing'
             ORDER BY expr_id
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NoPending)?;

        Ok(PendingExpression {
            id: row.get("expr_id"),
            postfix: row.get("polish_expr"),
        })
    }

    async fn persist_expression(&self, id: i64, update: &ExpressionUpdate) -> Result<(), StoreError> {
        let done = sqlx::query(
            "UPDATE expressions
             SET polish_expr = ?1, status = ?2, result = ?3, error = ?4, updated_at = datetime('now')
             WHERE expr_id = ?5",
        )
        .bind(&update.postfix)
        .bind(update.status.as_str())
        .bind(update.result)
        .bind(&update.error)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

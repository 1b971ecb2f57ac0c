//! SQLite execution store
//!
//! Executions are stored as JSON documents next to the columns recovery and
//! listing filter on. Audit events live in their own append-only table keyed
//! by `(execution_id, sequence)`.

use crate::runtime::timeline::TimelineEvent;
use crate::store::ExecutionStore;
use crate::workflow::types::{AutomationStats, ExecutionStatus, WorkflowExecution};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use uuid::Uuid;

/// Open (and create if needed) the engine database
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Private in-memory database; one connection so every query sees the same schema
pub async fn memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

#[derive(Debug, Clone)]
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS executions (
                id TEXT PRIMARY KEY,
                workflow_id TEXT NOT NULL,
                workflow_version INTEGER NOT NULL,
                incident_id TEXT NOT NULL,
                status TEXT NOT NULL,
                document JSON NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_status ON executions(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_executions_incident ON executions(incident_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS execution_events (
                execution_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                incident_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                document JSON NOT NULL,
                recorded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (execution_id, sequence)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_stats (
                workflow_id TEXT PRIMARY KEY,
                execution_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                average_execution_ms REAL NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn decode_execution(row: &SqliteRow) -> Result<WorkflowExecution> {
    let document: String = row.get("document");
    Ok(serde_json::from_str(&document)?)
}

fn decode_stats(row: &SqliteRow) -> AutomationStats {
    AutomationStats {
        workflow_id: row.get("workflow_id"),
        execution_count: row.get::<i64, _>("execution_count") as u64,
        success_count: row.get::<i64, _>("success_count") as u64,
        failure_count: row.get::<i64, _>("failure_count") as u64,
        average_execution_ms: row.get("average_execution_ms"),
    }
}

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn save(&self, execution: &WorkflowExecution) -> Result<()> {
        let document = serde_json::to_string(execution)?;

        sqlx::query(
            r#"
            INSERT INTO executions (id, workflow_id, workflow_version, incident_id, status, document, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                document = excluded.document,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(execution.id.to_string())
        .bind(&execution.workflow_id)
        .bind(execution.workflow_version as i64)
        .bind(&execution.incident_id)
        .bind(execution.status.as_str())
        .bind(&document)
        .bind(execution.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query("SELECT document FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| decode_execution(&row)).transpose()
    }

    async fn list_by_status(&self, statuses: &[ExecutionStatus]) -> Result<Vec<WorkflowExecution>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT document FROM executions WHERE status IN ({}) ORDER BY created_at",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.iter().map(decode_execution).collect()
    }

    async fn list_for_incident(&self, incident_id: &str) -> Result<Vec<WorkflowExecution>> {
        let rows = sqlx::query("SELECT document FROM executions WHERE incident_id = ? ORDER BY created_at")
            .bind(incident_id)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(decode_execution).collect()
    }

    async fn append_event(&self, event: &TimelineEvent) -> Result<()> {
        let document = serde_json::to_string(event)?;

        sqlx::query(
            r#"
            INSERT INTO execution_events (execution_id, sequence, incident_id, event_type, document)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.execution_id.to_string())
        .bind(event.sequence as i64)
        .bind(&event.incident_id)
        .bind(event.event_type.as_str())
        .bind(&document)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn events(&self, execution_id: Uuid) -> Result<Vec<TimelineEvent>> {
        let rows = sqlx::query(
            "SELECT document FROM execution_events WHERE execution_id = ? ORDER BY sequence",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let document: String = row.get("document");
                Ok(serde_json::from_str(&document)?)
            })
            .collect()
    }

    async fn record_terminal(&self, workflow_id: &str, status: ExecutionStatus, duration_ms: i64) -> Result<AutomationStats> {
        let mut tx = self.pool.begin().await?;

        // SET expressions read the pre-update row
        sqlx::query(
            r#"
            INSERT INTO workflow_stats (workflow_id, execution_count, success_count, failure_count, average_execution_ms)
            VALUES (?, 1, ?, ?, ?)
            ON CONFLICT(workflow_id) DO UPDATE SET
                average_execution_ms = (average_execution_ms * execution_count + excluded.average_execution_ms) / (execution_count + 1),
                execution_count = execution_count + 1,
                success_count = success_count + excluded.success_count,
                failure_count = failure_count + excluded.failure_count
            "#,
        )
        .bind(workflow_id)
        .bind((status == ExecutionStatus::Completed) as i64)
        .bind((status == ExecutionStatus::Failed) as i64)
        .bind(duration_ms as f64)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query("SELECT * FROM workflow_stats WHERE workflow_id = ?")
            .bind(workflow_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(decode_stats(&row))
    }

    async fn stats(&self, workflow_id: &str) -> Result<Option<AutomationStats>> {
        let row = sqlx::query("SELECT * FROM workflow_stats WHERE workflow_id = ?")
            .bind(workflow_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(decode_stats))
    }
}

//! SQLite persistence layer for published playbook versions
//!
//! Every published version is its own row keyed by `(id, version)`; rows are
//! never updated except for the `is_active` flag. Definitions are stored as
//! JSON while id, version and name stay queryable columns.

use crate::workflow::types::WorkflowDefinition;
use anyhow::Result;
use sqlx::{sqlite::SqlitePool, Row};

/// SQLite-based definition storage manager
#[derive(Debug, Clone)]
pub struct WorkflowStorage {
    /// SQLite connection pool for the engine database
    pool: SqlitePool,
}

impl WorkflowStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the definition storage schema
    ///
    /// Safe to call multiple times (uses IF NOT EXISTS).
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS workflow_definitions (
                id TEXT NOT NULL,
                version INTEGER NOT NULL,
                name TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                definition JSON NOT NULL,
                published_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (id, version)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_workflow_definitions_name
            ON workflow_definitions(name)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a freshly published version; an existing `(id, version)` is an error
    pub async fn insert_version(&self, definition: &WorkflowDefinition) -> Result<()> {
        let definition_json = serde_json::to_string(definition)?;

        sqlx::query(
            r#"
            INSERT INTO workflow_definitions (id, version, name, is_active, definition)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&definition.id)
        .bind(definition.version as i64)
        .bind(&definition.name)
        .bind(definition.is_active)
        .bind(&definition_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieve one exact version
    pub async fn get_version(&self, id: &str, version: u32) -> Result<Option<WorkflowDefinition>> {
        let row = sqlx::query(
            "SELECT definition, is_active FROM workflow_definitions WHERE id = ? AND version = ?",
        )
        .bind(id)
        .bind(version as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| decode(&row)).transpose()
    }

    /// Load every version of every workflow for registry initialization
    pub async fn load_all(&self) -> Result<Vec<WorkflowDefinition>> {
        let rows = sqlx::query(
            "SELECT definition, is_active FROM workflow_definitions ORDER BY id, version",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode).collect()
    }

    /// Toggle availability of every version of a workflow
    pub async fn set_active(&self, id: &str, active: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE workflow_definitions SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// The `is_active` column wins over the flag frozen inside the JSON document
fn decode(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowDefinition> {
    let definition_json: String = row.get("definition");
    let mut definition: WorkflowDefinition = serde_json::from_str(&definition_json)?;
    definition.is_active = row.get("is_active");
    Ok(definition)
}

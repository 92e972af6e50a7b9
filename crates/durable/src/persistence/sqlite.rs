//! SQLite implementation of ExecutionStore
//!
//! Executions live in `durable_executions`, recorded steps in
//! `durable_execution_steps`. JSON payloads are stored as TEXT. Status changes
//! are a single conditional `UPDATE` so concurrent writers race on the row,
//! not on a read-modify-write.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::{debug, error, info};

use super::store::*;
use crate::workflow::{Execution, ExecutionStatus, StepRecord};

/// SQLite-backed execution store
///
/// Survives process restarts, which is what makes crash resumption work.
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Create a store from an existing pool
    ///
    /// The caller is responsible for running [`migrate`](Self::migrate).
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url`, creating the file if needed, and migrate
    ///
    /// `sqlite::memory:` URLs get a single pinned connection so every query
    /// sees the same database.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        info!("Connecting to SQLite database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await.map_err(|e| {
            error!("Failed to connect to SQLite: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Run embedded migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to run migrations: {}", e);
                StoreError::Database(e.to_string())
            })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_steps(&self, id: &str) -> Result<Vec<StepRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT step_name, result, recorded_at
            FROM durable_execution_steps
            WHERE execution_id = ?1
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load steps: {}", e);
            StoreError::Database(e.to_string())
        })?;

        rows.iter().map(step_from_row).collect()
    }

    async fn load_step(&self, id: &str, step: &str) -> Result<Option<StepRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT step_name, result, recorded_at
            FROM durable_execution_steps
            WHERE execution_id = ?1 AND step_name = ?2
            "#,
        )
        .bind(id)
        .bind(step)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        row.as_ref().map(step_from_row).transpose()
    }

    async fn execution_from_row(&self, row: &SqliteRow) -> Result<Execution, StoreError> {
        let id: String = row.get("id");
        let steps = self.load_steps(&id).await?;

        let input: String = row.get("input");
        let result: Option<String> = row.get("result");

        Ok(Execution {
            workflow_type: row.get("workflow_type"),
            status: parse_status(row.get("status"))?,
            input: serde_json::from_str(&input)?,
            steps,
            result: result.map(|r| serde_json::from_str(&r)).transpose()?,
            reason: row.get("reason"),
            created_at: row.get("created_at"),
            deadline: row.get("deadline"),
            updated_at: row.get("updated_at"),
            id,
        })
    }
}

fn parse_status(s: String) -> Result<ExecutionStatus, StoreError> {
    s.parse()
        .map_err(|e: crate::workflow::ParseStatusError| StoreError::Serialization(e.to_string()))
}

fn step_from_row(row: &SqliteRow) -> Result<StepRecord, StoreError> {
    let result: String = row.get("result");
    Ok(StepRecord {
        name: row.get("step_name"),
        result: serde_json::from_str(&result)?,
        recorded_at: row.get("recorded_at"),
    })
}

const EXECUTION_COLUMNS: &str =
    "id, workflow_type, status, input, result, reason, created_at, deadline, updated_at";

#[async_trait]
impl ExecutionStore for SqliteExecutionStore {
    async fn create(
        &self,
        id: &str,
        workflow_type: &str,
        input: serde_json::Value,
        deadline: DateTime<Utc>,
    ) -> Result<Execution, StoreError> {
        debug!(execution_id = %id, "Creating execution");

        let execution = Execution::new(id, workflow_type, input, deadline);
        let input_json = serde_json::to_string(&execution.input)?;

        sqlx::query(
            r#"
            INSERT INTO durable_executions (
                id, workflow_type, status, input, result, reason,
                created_at, deadline, updated_at
            ) VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5, ?6, ?7)
            "#,
        )
        .bind(&execution.id)
        .bind(&execution.workflow_type)
        .bind(execution.status.as_str())
        .bind(input_json)
        .bind(execution.created_at)
        .bind(execution.deadline)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateExecution(id.to_string())
            }
            other => {
                error!("Failed to create execution: {}", other);
                StoreError::Database(other.to_string())
            }
        })?;

        Ok(execution)
    }

    async fn get(&self, id: &str) -> Result<Execution, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EXECUTION_COLUMNS} FROM durable_executions WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get execution: {}", e);
            StoreError::Database(e.to_string())
        })?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        self.execution_from_row(&row).await
    }

    async fn append_step(
        &self,
        id: &str,
        step: &str,
        result: serde_json::Value,
    ) -> Result<StepRecord, StoreError> {
        let result_json = serde_json::to_string(&result)?;
        let now = Utc::now();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        // Position is computed in the same statement; the WHERE keeps terminal
        // executions closed and ON CONFLICT keeps the first result.
        let inserted = sqlx::query(
            r#"
            INSERT INTO durable_execution_steps (execution_id, position, step_name, result, recorded_at)
            SELECT ?1,
                   (SELECT COUNT(*) FROM durable_execution_steps WHERE execution_id = ?1),
                   ?2, ?3, ?4
            WHERE EXISTS (
                SELECT 1 FROM durable_executions
                WHERE id = ?1 AND status NOT IN ('rejected', 'completed', 'failed')
            )
            ON CONFLICT (execution_id, step_name) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(step)
        .bind(result_json)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!("Failed to append step: {}", e);
            StoreError::Database(e.to_string())
        })?
        .rows_affected();

        if inserted > 0 {
            sqlx::query("UPDATE durable_executions SET updated_at = ?1 WHERE id = ?2")
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if let Some(record) = self.load_step(id, step).await? {
            return Ok(record);
        }

        // Nothing inserted and nothing cached: unknown or already terminal
        let execution = self.get(id).await?;
        Err(StoreError::Finalized {
            id: id.to_string(),
            status: execution.status,
            step: step.to_string(),
        })
    }

    async fn set_status(
        &self,
        id: &str,
        status: ExecutionStatus,
        result: Option<serde_json::Value>,
        reason: Option<String>,
    ) -> Result<Execution, StoreError> {
        let Some(expected) = status.predecessor() else {
            let current = self.get(id).await?;
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: current.status,
                to: status,
            });
        };

        let result_json = result.map(|r| serde_json::to_string(&r)).transpose()?;

        let updated = sqlx::query(
            r#"
            UPDATE durable_executions
            SET status = ?1,
                result = COALESCE(?2, result),
                reason = COALESCE(?3, reason),
                updated_at = ?4
            WHERE id = ?5 AND status = ?6
            "#,
        )
        .bind(status.as_str())
        .bind(result_json)
        .bind(reason)
        .bind(Utc::now())
        .bind(id)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update execution status: {}", e);
            StoreError::Database(e.to_string())
        })?
        .rows_affected();

        let execution = self.get(id).await?;
        if updated == 0 {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: execution.status,
                to: status,
            });
        }

        Ok(execution)
    }

    async fn set_reason(
        &self,
        id: &str,
        status: ExecutionStatus,
        reason: Option<String>,
    ) -> Result<Execution, StoreError> {
        let updated = sqlx::query(
            "UPDATE durable_executions SET reason = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(reason)
        .bind(Utc::now())
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to update execution reason: {}", e);
            StoreError::Database(e.to_string())
        })?
        .rows_affected();

        let execution = self.get(id).await?;
        if updated == 0 {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: execution.status,
                to: status,
            });
        }

        Ok(execution)
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, StoreError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {EXECUTION_COLUMNS} FROM durable_executions WHERE 1 = 1"
        ));

        if !filter.statuses.is_empty() {
            query.push(" AND status IN (");
            let mut separated = query.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(status.as_str());
            }
            separated.push_unseparated(")");
        }

        if let Some(workflow_type) = &filter.workflow_type {
            query
                .push(" AND workflow_type = ")
                .push_bind(workflow_type.clone());
        }

        query.push(" ORDER BY created_at, id");

        let rows = query.build().fetch_all(&self.pool).await.map_err(|e| {
            error!("Failed to list executions: {}", e);
            StoreError::Database(e.to_string())
        })?;

        let mut executions = Vec::with_capacity(rows.len());
        for row in &rows {
            executions.push(self.execution_from_row(row).await?);
        }
        Ok(executions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;

    async fn memory_store() -> SqliteExecutionStore {
        SqliteExecutionStore::connect("sqlite::memory:").await.unwrap()
    }

    fn deadline() -> DateTime<Utc> {
        Utc::now() + ChronoDuration::minutes(10)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = memory_store().await;

        store
            .create("INV-1", "invoice_approval", json!({"total": 150.0}), deadline())
            .await
            .unwrap();

        let execution = store.get("INV-1").await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert_eq!(execution.workflow_type, "invoice_approval");
        assert_eq!(execution.input, json!({"total": 150.0}));
        assert!(execution.steps.is_empty());
        assert!(execution.result.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create() {
        let store = memory_store().await;
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();

        let err = store
            .create("e1", "wf", json!({}), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateExecution(_)));
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = memory_store().await;

        assert!(matches!(
            store.get("nope").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            store
                .set_status("nope", ExecutionStatus::Approved, None, None)
                .await
                .unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            store.append_step("nope", "s", json!(1)).await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_append_step_keeps_first_result() {
        let store = memory_store().await;
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();

        store.append_step("e1", "a", json!({"v": 1})).await.unwrap();
        store.append_step("e1", "b", json!({"v": 2})).await.unwrap();
        let cached = store.append_step("e1", "a", json!({"v": 99})).await.unwrap();
        assert_eq!(cached.result, json!({"v": 1}));

        let steps = store.get("e1").await.unwrap().steps;
        let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_status_cas_and_reason() {
        let store = memory_store().await;
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();

        let rejected = store
            .set_status("e1", ExecutionStatus::Rejected, None, Some("declined".into()))
            .await
            .unwrap();
        assert_eq!(rejected.reason.as_deref(), Some("declined"));

        let err = store
            .set_status("e1", ExecutionStatus::Approved, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ExecutionStatus::Rejected,
                to: ExecutionStatus::Approved,
                ..
            }
        ));

        let err = store.append_step("e1", "a", json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Finalized { .. }));
    }

    #[tokio::test]
    async fn test_completed_result_stored() {
        let store = memory_store().await;
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();
        for status in [ExecutionStatus::Approved, ExecutionStatus::Processing] {
            store.set_status("e1", status, None, None).await.unwrap();
        }

        store
            .set_status("e1", ExecutionStatus::Completed, Some(json!({"paid": 2})), None)
            .await
            .unwrap();

        let execution = store.get("e1").await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.result, Some(json!({"paid": 2})));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let store = memory_store().await;
        store.create("a", "wf", json!({}), deadline()).await.unwrap();
        store.create("b", "wf", json!({}), deadline()).await.unwrap();
        store.create("c", "other", json!({}), deadline()).await.unwrap();
        store
            .set_status("a", ExecutionStatus::Rejected, None, None)
            .await
            .unwrap();

        let unfinished = store
            .list(&ExecutionFilter::unfinished().with_workflow_type("wf"))
            .await
            .unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, "b");

        let all = store.list(&ExecutionFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_set_reason_only_in_expected_status() {
        let store = memory_store().await;
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();

        let err = store
            .set_reason("e1", ExecutionStatus::Processing, Some("stalled".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        store
            .set_status("e1", ExecutionStatus::Approved, None, None)
            .await
            .unwrap();
        store
            .set_status("e1", ExecutionStatus::Processing, None, None)
            .await
            .unwrap();
        let execution = store
            .set_reason("e1", ExecutionStatus::Processing, Some("stalled".into()))
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Processing);
        assert_eq!(execution.reason.as_deref(), Some("stalled"));

        let execution = store
            .set_reason("e1", ExecutionStatus::Processing, None)
            .await
            .unwrap();
        assert!(execution.reason.is_none());

        let err = store.set_reason("nope", ExecutionStatus::Processing, None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}

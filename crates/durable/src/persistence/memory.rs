//! In-memory implementation of ExecutionStore

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::store::*;
use crate::workflow::{Execution, ExecutionStatus, StepRecord};

/// In-memory implementation of ExecutionStore
///
/// Provides the same semantics as the SQLite implementation, but nothing
/// survives a restart. Useful for tests and for running without a database.
///
/// # Example
///
/// ```
/// use signoff_durable::InMemoryExecutionStore;
///
/// let store = InMemoryExecutionStore::new();
/// assert_eq!(store.execution_count(), 0);
/// ```
pub struct InMemoryExecutionStore {
    executions: RwLock<HashMap<String, Execution>>,
}

impl InMemoryExecutionStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of executions
    pub fn execution_count(&self) -> usize {
        self.executions.read().len()
    }
}

impl Default for InMemoryExecutionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create(
        &self,
        id: &str,
        workflow_type: &str,
        input: serde_json::Value,
        deadline: DateTime<Utc>,
    ) -> Result<Execution, StoreError> {
        let mut executions = self.executions.write();
        if executions.contains_key(id) {
            return Err(StoreError::DuplicateExecution(id.to_string()));
        }

        let execution = Execution::new(id, workflow_type, input, deadline);
        executions.insert(id.to_string(), execution.clone());
        Ok(execution)
    }

    async fn get(&self, id: &str) -> Result<Execution, StoreError> {
        self.executions
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn append_step(
        &self,
        id: &str,
        step: &str,
        result: serde_json::Value,
    ) -> Result<StepRecord, StoreError> {
        let mut executions = self.executions.write();
        let execution = executions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Some(existing) = execution.step(step) {
            return Ok(existing.clone());
        }

        if execution.is_terminal() {
            return Err(StoreError::Finalized {
                id: id.to_string(),
                status: execution.status,
                step: step.to_string(),
            });
        }

        let now = Utc::now();
        let record = StepRecord {
            name: step.to_string(),
            result,
            recorded_at: now,
        };
        execution.steps.push(record.clone());
        execution.updated_at = now;
        Ok(record)
    }

    async fn set_status(
        &self,
        id: &str,
        status: ExecutionStatus,
        result: Option<serde_json::Value>,
        reason: Option<String>,
    ) -> Result<Execution, StoreError> {
        let mut executions = self.executions.write();
        let execution = executions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if !execution.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: execution.status,
                to: status,
            });
        }

        execution.status = status;
        if result.is_some() {
            execution.result = result;
        }
        if reason.is_some() {
            execution.reason = reason;
        }
        execution.updated_at = Utc::now();
        Ok(execution.clone())
    }

    async fn set_reason(
        &self,
        id: &str,
        status: ExecutionStatus,
        reason: Option<String>,
    ) -> Result<Execution, StoreError> {
        let mut executions = self.executions.write();
        let execution = executions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if execution.status != status {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: execution.status,
                to: status,
            });
        }

        execution.reason = reason;
        execution.updated_at = Utc::now();
        Ok(execution.clone())
    }

    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, StoreError> {
        let mut matched: Vec<Execution> = self
            .executions
            .read()
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn deadline() -> DateTime<Utc> {
        Utc::now() + Duration::minutes(10)
    }

    #[tokio::test]
    async fn test_create_and_get_execution() {
        let store = InMemoryExecutionStore::new();

        let created = store
            .create("INV-1", "invoice_approval", json!({"id": "INV-1"}), deadline())
            .await
            .unwrap();
        assert_eq!(created.status, ExecutionStatus::Pending);

        let loaded = store.get("INV-1").await.unwrap();
        assert_eq!(loaded, created);
        assert_eq!(store.execution_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = InMemoryExecutionStore::new();
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();

        let err = store
            .create("e1", "wf", json!({"other": true}), deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateExecution(id) if id == "e1"));

        // Original input untouched
        assert_eq!(store.get("e1").await.unwrap().input, json!({}));
    }

    #[tokio::test]
    async fn test_get_unknown_execution() {
        let store = InMemoryExecutionStore::new();
        let err = store.get("missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_append_step_is_idempotent() {
        let store = InMemoryExecutionStore::new();
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();

        let first = store.append_step("e1", "pay-0", json!({"n": 1})).await.unwrap();
        let second = store.append_step("e1", "pay-0", json!({"n": 2})).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.result, json!({"n": 1}));
        assert_eq!(store.get("e1").await.unwrap().steps.len(), 1);
    }

    #[tokio::test]
    async fn test_steps_keep_append_order() {
        let store = InMemoryExecutionStore::new();
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();

        for name in ["a", "b", "c"] {
            store.append_step("e1", name, json!(name)).await.unwrap();
        }

        let names: Vec<_> = store
            .get("e1")
            .await
            .unwrap()
            .steps
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_set_status_enforces_transitions() {
        let store = InMemoryExecutionStore::new();
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();

        let err = store
            .set_status("e1", ExecutionStatus::Processing, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ExecutionStatus::Pending,
                to: ExecutionStatus::Processing,
                ..
            }
        ));

        store
            .set_status("e1", ExecutionStatus::Approved, None, None)
            .await
            .unwrap();
        store
            .set_status("e1", ExecutionStatus::Processing, None, None)
            .await
            .unwrap();
        let done = store
            .set_status("e1", ExecutionStatus::Completed, Some(json!({"ok": true})), None)
            .await
            .unwrap();

        assert_eq!(done.status, ExecutionStatus::Completed);
        assert_eq!(done.result, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_cas_only_one_winner() {
        let store = InMemoryExecutionStore::new();
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();

        store
            .set_status("e1", ExecutionStatus::Rejected, None, Some("timeout".into()))
            .await
            .unwrap();
        let err = store
            .set_status("e1", ExecutionStatus::Approved, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        let execution = store.get("e1").await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Rejected);
        assert_eq!(execution.reason.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_append_after_terminal_fails() {
        let store = InMemoryExecutionStore::new();
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();
        store
            .set_status("e1", ExecutionStatus::Rejected, None, Some("declined".into()))
            .await
            .unwrap();

        let err = store.append_step("e1", "pay-0", json!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Finalized { .. }));
    }

    #[tokio::test]
    async fn test_list_unfinished() {
        let store = InMemoryExecutionStore::new();
        store.create("a", "wf", json!({}), deadline()).await.unwrap();
        store.create("b", "wf", json!({}), deadline()).await.unwrap();
        store.create("c", "other", json!({}), deadline()).await.unwrap();
        store
            .set_status("b", ExecutionStatus::Rejected, None, None)
            .await
            .unwrap();

        let unfinished = store
            .list(&ExecutionFilter::unfinished().with_workflow_type("wf"))
            .await
            .unwrap();
        let ids: Vec<_> = unfinished.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_set_reason_keeps_status() {
        let store = InMemoryExecutionStore::new();
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();
        store
            .set_status("e1", ExecutionStatus::Approved, None, None)
            .await
            .unwrap();
        store
            .set_status("e1", ExecutionStatus::Processing, None, None)
            .await
            .unwrap();

        let execution = store
            .set_reason("e1", ExecutionStatus::Processing, Some("gateway down".into()))
            .await
            .unwrap();
        assert_eq!(execution.status, ExecutionStatus::Processing);
        assert_eq!(execution.reason.as_deref(), Some("gateway down"));

        let cleared = store
            .set_reason("e1", ExecutionStatus::Processing, None)
            .await
            .unwrap();
        assert!(cleared.reason.is_none());
    }

    #[tokio::test]
    async fn test_set_reason_requires_status() {
        let store = InMemoryExecutionStore::new();
        store.create("e1", "wf", json!({}), deadline()).await.unwrap();

        let err = store
            .set_reason("e1", ExecutionStatus::Processing, Some("stalled".into()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ExecutionStatus::Pending,
                ..
            }
        ));
        assert!(store.get("e1").await.unwrap().reason.is_none());
    }
}

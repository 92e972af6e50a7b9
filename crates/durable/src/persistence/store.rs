//! ExecutionStore trait definition

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::workflow::{Execution, ExecutionStatus, StepRecord};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An execution with this id already exists
    #[error("execution already exists: {0}")]
    DuplicateExecution(String),

    /// Execution not found
    #[error("execution not found: {0}")]
    NotFound(String),

    /// Status change not allowed from the current status
    #[error("invalid transition for execution {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    /// New step appended to a terminal execution
    #[error("execution {id} is {status}, cannot record step {step}")]
    Finalized {
        id: String,
        status: ExecutionStatus,
        step: String,
    },

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Filter for listing executions
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    /// Match any of these statuses (empty matches all)
    pub statuses: Vec<ExecutionStatus>,
    pub workflow_type: Option<String>,
}

impl ExecutionFilter {
    /// Executions that can still make progress
    pub fn unfinished() -> Self {
        Self {
            statuses: ExecutionStatus::UNFINISHED.to_vec(),
            workflow_type: None,
        }
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_workflow_type(mut self, workflow_type: impl Into<String>) -> Self {
        self.workflow_type = Some(workflow_type.into());
        self
    }

    /// Check if an execution matches this filter
    pub fn matches(&self, execution: &Execution) -> bool {
        let status_ok = self.statuses.is_empty() || self.statuses.contains(&execution.status);
        let type_ok = self
            .workflow_type
            .as_deref()
            .map_or(true, |t| t == execution.workflow_type);
        status_ok && type_ok
    }
}

/// Durable storage for executions and their step results
///
/// Every operation is atomic per execution id. Implementations must be
/// thread-safe and support concurrent access from many drivers.
#[async_trait]
pub trait ExecutionStore: Send + Sync + 'static {
    /// Create a new pending execution
    ///
    /// Fails with [`StoreError::DuplicateExecution`] if the id is taken.
    async fn create(
        &self,
        id: &str,
        workflow_type: &str,
        input: serde_json::Value,
        deadline: DateTime<Utc>,
    ) -> Result<Execution, StoreError>;

    /// Load an execution with all recorded steps
    async fn get(&self, id: &str) -> Result<Execution, StoreError>;

    /// Record a step result
    ///
    /// Idempotent: if `step` already has a result, the stored record is
    /// returned unchanged and `result` is discarded.
    async fn append_step(
        &self,
        id: &str,
        step: &str,
        result: serde_json::Value,
    ) -> Result<StepRecord, StoreError>;

    /// Compare-and-set the execution status
    ///
    /// Succeeds only when the current status is the single legal predecessor
    /// of `status`; otherwise fails with [`StoreError::InvalidTransition`].
    /// `result` and `reason` are stored alongside when given.
    async fn set_status(
        &self,
        id: &str,
        status: ExecutionStatus,
        result: Option<serde_json::Value>,
        reason: Option<String>,
    ) -> Result<Execution, StoreError>;

    /// Replace the reason of an execution without changing its status
    ///
    /// Applies only while the execution is still `status`; otherwise fails
    /// with [`StoreError::InvalidTransition`] carrying the actual status.
    /// `None` clears the reason.
    async fn set_reason(
        &self,
        id: &str,
        status: ExecutionStatus,
        reason: Option<String>,
    ) -> Result<Execution, StoreError>;

    /// List executions matching a filter, oldest first
    async fn list(&self, filter: &ExecutionFilter) -> Result<Vec<Execution>, StoreError>;
}

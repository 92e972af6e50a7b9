//! Workflow trait definition

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{Execution, ExecutionStatus};

/// Error type for workflow failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkflowError {
    /// Error message
    pub message: String,

    /// Error code for programmatic handling
    pub code: Option<String>,
}

impl WorkflowError {
    /// Create a new workflow error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for WorkflowError {}

/// One step scheduled by [`Workflow::plan`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPlan {
    /// Step name, unique within the execution and stable across replays
    pub name: String,

    /// Registered handler that performs the step
    pub handler: String,

    /// Arguments passed to the handler
    pub args: serde_json::Value,
}

impl StepPlan {
    pub fn new(
        name: impl Into<String>,
        handler: impl Into<String>,
        args: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            handler: handler.into(),
            args,
        }
    }
}

/// Recorded result of a planned step, handed to [`Workflow::complete`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub name: String,
    pub result: serde_json::Value,
}

/// Final outcome of a driven execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Completed { result: serde_json::Value },
    Rejected { reason: String },
    Failed { reason: String },
}

impl WorkflowOutcome {
    /// Outcome stored on a terminal execution, `None` while it is still running
    pub fn from_execution(execution: &Execution) -> Option<Self> {
        let reason = || execution.reason.clone().unwrap_or_default();
        match execution.status {
            ExecutionStatus::Completed => Some(Self::Completed {
                result: execution
                    .result
                    .clone()
                    .unwrap_or(serde_json::Value::Null),
            }),
            ExecutionStatus::Rejected => Some(Self::Rejected { reason: reason() }),
            ExecutionStatus::Failed => Some(Self::Failed { reason: reason() }),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// An approval-gated workflow
///
/// A workflow turns its input into an ordered list of steps once approval is
/// granted, then folds the recorded step results into its final result.
///
/// # Determinism
///
/// `plan` must return the same steps for the same input. Step names are the
/// replay keys: a step whose name already has a recorded result is skipped on
/// resume.
///
/// # Example
///
/// ```ignore
/// use signoff_durable::prelude::*;
///
/// struct RefundWorkflow;
///
/// impl Workflow for RefundWorkflow {
///     const TYPE: &'static str = "refund";
///     type Input = RefundRequest;
///     type Output = RefundResult;
///
///     fn plan(&self, input: &RefundRequest) -> Vec<StepPlan> {
///         vec![StepPlan::new("refund", "issue_refund", json!({ "amount": input.amount }))]
///     }
///
///     fn complete(&self, input: &RefundRequest, outputs: Vec<StepOutput>)
///         -> Result<RefundResult, WorkflowError> {
///         // ...
///     }
/// }
/// ```
pub trait Workflow: Send + Sync + 'static {
    /// Unique type identifier for this workflow
    ///
    /// Stored on every execution and used to route restart recovery.
    const TYPE: &'static str;

    /// Input type supplied at submission
    type Input: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Output type stored when the workflow completes
    type Output: Serialize + Send;

    /// Steps to run after approval, in execution order
    fn plan(&self, input: &Self::Input) -> Vec<StepPlan>;

    /// Combine recorded step results into the final result
    ///
    /// `outputs` follows the order returned by `plan`.
    fn complete(
        &self,
        input: &Self::Input,
        outputs: Vec<StepOutput>,
    ) -> Result<Self::Output, WorkflowError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_workflow_error_display() {
        let err = WorkflowError::new("bad receipt");
        assert_eq!(err.to_string(), "bad receipt");

        let err = err.with_code("RECEIPT");
        assert_eq!(err.to_string(), "[RECEIPT] bad receipt");
    }

    #[test]
    fn test_outcome_from_execution() {
        let mut execution = Execution::new("e1", "wf", json!({}), Utc::now());
        assert_eq!(WorkflowOutcome::from_execution(&execution), None);

        execution.status = ExecutionStatus::Rejected;
        execution.reason = Some("timeout".into());
        assert_eq!(
            WorkflowOutcome::from_execution(&execution),
            Some(WorkflowOutcome::Rejected {
                reason: "timeout".into()
            })
        );

        execution.status = ExecutionStatus::Completed;
        execution.result = Some(json!({"total": 150.0}));
        let outcome = WorkflowOutcome::from_execution(&execution).unwrap();
        assert!(outcome.is_completed());
    }
}

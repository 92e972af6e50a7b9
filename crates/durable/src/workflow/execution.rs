//! Execution records and the status state machine

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution status
///
/// ```text
/// pending ──► approved ──► processing ──► completed
///    │                          │
///    └──► rejected              └──► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Waiting for an approval decision
    Pending,

    /// Approved, steps not started yet
    Approved,

    /// Rejected explicitly or because the deadline elapsed
    Rejected,

    /// Steps are running
    Processing,

    /// All steps recorded and the result stored
    Completed,

    /// A step failed permanently
    Failed,
}

impl ExecutionStatus {
    /// Statuses an execution can still leave
    pub const UNFINISHED: [ExecutionStatus; 3] = [Self::Pending, Self::Approved, Self::Processing];

    /// Check if no further transition is possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Failed)
    }

    /// The single status a transition into `self` must start from
    ///
    /// `None` for `Pending`, which is only ever the initial status.
    pub fn predecessor(self) -> Option<ExecutionStatus> {
        match self {
            Self::Pending => None,
            Self::Approved | Self::Rejected => Some(Self::Pending),
            Self::Processing => Some(Self::Approved),
            Self::Completed | Self::Failed => Some(Self::Processing),
        }
    }

    /// Check if `self -> next` is a legal transition
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        next.predecessor() == Some(self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown execution status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for ExecutionStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// Common rejection reason constants
pub mod reasons {
    /// Rejected by an explicit decision
    pub const DECLINED: &str = "declined";

    /// Rejected because the approval deadline elapsed
    pub const TIMEOUT: &str = "timeout";
}

/// A recorded step result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name, unique within the execution
    pub name: String,

    /// Result returned by the step handler
    pub result: serde_json::Value,

    /// When the result was recorded
    pub recorded_at: DateTime<Utc>,
}

/// One durable run of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Caller-supplied id, also the idempotency key
    pub id: String,

    /// Workflow that owns this execution
    pub workflow_type: String,

    pub status: ExecutionStatus,

    /// Immutable workflow input
    pub input: serde_json::Value,

    /// Recorded step results in append order
    pub steps: Vec<StepRecord>,

    /// Terminal result (set on completion)
    pub result: Option<serde_json::Value>,

    /// Why the execution was rejected or failed
    pub reason: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Approval deadline, fixed at creation
    pub deadline: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// Create a new pending execution
    pub fn new(
        id: impl Into<String>,
        workflow_type: impl Into<String>,
        input: serde_json::Value,
        deadline: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            workflow_type: workflow_type.into(),
            status: ExecutionStatus::Pending,
            input,
            steps: vec![],
            result: None,
            reason: None,
            created_at: now,
            deadline,
            updated_at: now,
        }
    }

    /// Look up a recorded step by name
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the approval deadline has passed at `now`
    pub fn deadline_passed(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_transition_table() {
        use ExecutionStatus::*;

        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Completed.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Pending.can_transition_to(Processing));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(ExecutionStatus::Rejected.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());

        for status in ExecutionStatus::UNFINISHED {
            assert!(!status.is_terminal());
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Approved,
            ExecutionStatus::Rejected,
            ExecutionStatus::Processing,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>(), Ok(status));
        }

        assert_eq!(
            "archived".parse::<ExecutionStatus>(),
            Err(ParseStatusError("archived".to_string()))
        );
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    #[test]
    fn test_new_execution_is_pending() {
        let deadline = Utc::now() + Duration::minutes(5);
        let execution = Execution::new("INV-1", "invoice_approval", serde_json::json!({}), deadline);

        assert_eq!(execution.status, ExecutionStatus::Pending);
        assert!(execution.steps.is_empty());
        assert!(!execution.is_terminal());
        assert!(!execution.deadline_passed(Utc::now()));
        assert!(execution.deadline_passed(deadline));
    }
}

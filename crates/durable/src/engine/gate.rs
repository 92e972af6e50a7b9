//! Approval gate
//!
//! Holds a pending execution until an external decision arrives or the
//! deadline passes. Decisions and timeouts both go through the store's
//! compare-and-set, so exactly one of them can move an execution out of
//! `pending`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::persistence::{ExecutionStore, StoreError};
use crate::workflow::{reasons, Execution, ExecutionStatus};

/// External approval decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

/// What the gate observed when the execution left `pending`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Approved; the execution may already be past `approved`
    Approved,

    /// Rejected, with `declined` or `timeout` as the reason
    Rejected { reason: String },
}

/// Errors from gate operations
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Execution not found
    #[error("execution not found: {0}")]
    NotFound(String),

    /// Execution is not waiting for a decision
    #[error("execution {id} is {status}, not pending")]
    InvalidState { id: String, status: ExecutionStatus },

    /// Store error
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for GateError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::InvalidTransition { id, from, .. } => Self::InvalidState { id, status: from },
            other => Self::Store(other),
        }
    }
}

/// Polling approval gate
#[derive(Clone)]
pub struct ApprovalGate {
    store: Arc<dyn ExecutionStore>,
    poll_interval: Duration,
}

impl ApprovalGate {
    pub fn new(store: Arc<dyn ExecutionStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Record a decision for a pending execution
    ///
    /// Fails with [`GateError::InvalidState`] if the execution already left
    /// `pending`, including when the deadline timeout got there first.
    #[instrument(skip(self))]
    pub async fn decide(&self, id: &str, decision: Decision) -> Result<Execution, GateError> {
        let execution = match decision {
            Decision::Approved => {
                self.store
                    .set_status(id, ExecutionStatus::Approved, None, None)
                    .await?
            }
            Decision::Rejected => {
                self.store
                    .set_status(
                        id,
                        ExecutionStatus::Rejected,
                        None,
                        Some(reasons::DECLINED.to_string()),
                    )
                    .await?
            }
        };

        info!(execution_id = %id, status = %execution.status, "Decision recorded");
        Ok(execution)
    }

    /// Wait until the execution leaves `pending` or `deadline` passes
    ///
    /// On timeout the execution is rejected with reason `timeout`. If a
    /// decision lands between the last poll and the timeout write, the
    /// decision wins and is reported instead.
    #[instrument(skip(self))]
    pub async fn await_decision(
        &self,
        id: &str,
        deadline: DateTime<Utc>,
    ) -> Result<GateOutcome, GateError> {
        loop {
            let execution = self.store.get(id).await?;
            if execution.status != ExecutionStatus::Pending {
                return Ok(outcome_of(&execution));
            }

            let now = Utc::now();
            if now >= deadline {
                match self
                    .store
                    .set_status(
                        id,
                        ExecutionStatus::Rejected,
                        None,
                        Some(reasons::TIMEOUT.to_string()),
                    )
                    .await
                {
                    Ok(_) => {
                        info!(execution_id = %id, "Approval deadline passed, execution rejected");
                        return Ok(GateOutcome::Rejected {
                            reason: reasons::TIMEOUT.to_string(),
                        });
                    }
                    Err(StoreError::InvalidTransition { .. }) => {
                        debug!(execution_id = %id, "Decision won the race against timeout");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let remaining = (deadline - now).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }
}

fn outcome_of(execution: &Execution) -> GateOutcome {
    match execution.status {
        ExecutionStatus::Rejected => GateOutcome::Rejected {
            reason: execution
                .reason
                .clone()
                .unwrap_or_else(|| reasons::DECLINED.to_string()),
        },
        // Approved, or already past it on a resumed execution
        _ => GateOutcome::Approved,
    }
}

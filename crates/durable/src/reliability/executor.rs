//! Retry executor for recorded steps
//!
//! Runs one named step of an execution. The first successful result is
//! recorded in the store and every later call for the same step returns the
//! recording without invoking the handler again.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::RetryPolicy;
use crate::persistence::{ExecutionStore, StoreError};
use crate::step::{StepContext, StepError, StepHandler};

/// Errors from running a step
#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    /// Every attempt failed with a retryable error; nothing was recorded
    #[error("step {step} of execution {execution_id} failed after {attempts} attempts: {last_error}")]
    StepExhausted {
        execution_id: String,
        step: String,
        attempts: u32,
        last_error: StepError,
    },

    /// The handler reported a permanent failure
    #[error("step {step} of execution {execution_id} failed permanently: {error}")]
    StepAborted {
        execution_id: String,
        step: String,
        attempt: u32,
        error: StepError,
    },

    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Executes steps with retries and records their results
#[derive(Clone)]
pub struct RetryExecutor {
    store: Arc<dyn ExecutionStore>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(store: Arc<dyn ExecutionStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `step` for `execution_id`, replaying a recorded result if present
    ///
    /// Returns the stored result. When another writer records the step first,
    /// their result wins and is returned.
    #[instrument(skip(self, handler, args))]
    pub async fn run(
        &self,
        execution_id: &str,
        step: &str,
        handler: &StepHandler,
        args: Value,
    ) -> Result<Value, RetryError> {
        let execution = self.store.get(execution_id).await?;
        if let Some(record) = execution.step(step) {
            debug!("Replaying recorded step result");
            return Ok(record.result.clone());
        }

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let ctx = StepContext::new(execution_id, step, attempt, max_attempts);
            debug!(attempt, attempt_id = %ctx.attempt_id, "Running step");

            match handler(ctx, args.clone()).await {
                Ok(result) => {
                    let record = self.store.append_step(execution_id, step, result).await?;
                    info!(attempt, "Step recorded");
                    return Ok(record.result);
                }
                Err(error) if !self.policy.should_retry(&error) => {
                    warn!(attempt, error = %error, "Step failed permanently");
                    return Err(RetryError::StepAborted {
                        execution_id: execution_id.to_string(),
                        step: step.to_string(),
                        attempt,
                        error,
                    });
                }
                Err(error) if !self.policy.has_attempts_remaining(attempt) => {
                    warn!(attempts = attempt, error = %error, "Step retries exhausted");
                    return Err(RetryError::StepExhausted {
                        execution_id: execution_id.to_string(),
                        step: step.to_string(),
                        attempts: attempt,
                        last_error: error,
                    });
                }
                Err(error) => {
                    attempt += 1;
                    let delay = self.policy.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt - 1,
                        error = %error,
                        delay_ms = delay.as_millis() as u64,
                        "Step failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

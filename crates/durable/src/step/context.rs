//! Step execution context

use uuid::Uuid;

/// Context provided to a step for one attempt
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Unique attempt ID
    pub attempt_id: Uuid,

    /// Execution that owns this step
    pub execution_id: String,

    /// Step name within the execution
    pub step_name: String,

    /// Current attempt number (1-based)
    pub attempt: u32,

    /// Maximum attempts allowed
    pub max_attempts: u32,
}

impl StepContext {
    /// Create a new step context
    pub fn new(
        execution_id: impl Into<String>,
        step_name: impl Into<String>,
        attempt: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            attempt_id: Uuid::now_v7(),
            execution_id: execution_id.into(),
            step_name: step_name.into(),
            attempt,
            max_attempts,
        }
    }

    /// Check if this is the last attempt
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Stable key for deduplicating external side effects
    ///
    /// Identical across attempts and replays of the same step.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.execution_id, self.step_name)
    }
}

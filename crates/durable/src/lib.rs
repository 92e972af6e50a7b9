//! # Durable Execution Engine
//!
//! An approval-gated, crash-resumable execution engine. Each execution waits
//! for an external approve/reject decision (bounded by a deadline), then runs
//! a fixed sequence of retryable steps whose results are recorded once.
//!
//! ## Features
//!
//! - **Idempotent submission**: executions are keyed by a caller-supplied id
//! - **Approval gate**: cooperative polling with deadline-driven rejection
//! - **Automatic retries**: exponential backoff with jitter per step
//! - **Replay-safe steps**: recorded results are never recomputed
//! - **Restart recovery**: unfinished executions are rediscovered from SQLite
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Orchestrator                           │
//! │  (drives one execution: gate → steps → terminal status)     │
//! └─────────────────────────────────────────────────────────────┘
//!          │                     │                     │
//!          ▼                     ▼                     ▼
//! ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐
//! │  ApprovalGate   │  │  RetryExecutor  │  │ HandlerRegistry │
//! │ (decide / wait) │  │ (retry, record) │  │ (name → handler)│
//! └─────────────────┘  └─────────────────┘  └─────────────────┘
//!          │                     │
//!          ▼                     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ExecutionStore                          │
//! │  (SQLite: durable_executions, durable_execution_steps)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use signoff_durable::prelude::*;
//!
//! struct RefundWorkflow;
//!
//! impl Workflow for RefundWorkflow {
//!     const TYPE: &'static str = "refund";
//!     type Input = RefundRequest;
//!     type Output = Vec<serde_json::Value>;
//!
//!     fn plan(&self, input: &RefundRequest) -> Vec<StepPlan> {
//!         vec![StepPlan::new("refund", "issue_refund", json!({ "amount": input.amount }))]
//!     }
//!
//!     fn complete(&self, _input: &RefundRequest, outputs: Vec<StepOutput>)
//!         -> Result<Self::Output, WorkflowError> {
//!         Ok(outputs.into_iter().map(|o| o.result).collect())
//!     }
//! }
//!
//! let config = EngineConfig::from_env();
//! let store = open_store(&config).await?;
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("issue_refund", |ctx, args| async move { /* ... */ })?;
//!
//! let orchestrator = Orchestrator::new(RefundWorkflow, store, registry, &config);
//! orchestrator.recover().await?;
//! orchestrator.submit("refund-42", request).await?;
//! orchestrator.decide("refund-42", Decision::Approved).await?;
//! ```

pub mod config;
pub mod engine;
pub mod persistence;
pub mod reliability;
pub mod step;
pub mod workflow;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::engine::{
        ApprovalGate, Decision, GateError, GateOutcome, HandlerRegistry, Orchestrator,
        OrchestratorError, RegistryError, Submission,
    };
    pub use crate::persistence::{
        open_store, ExecutionFilter, ExecutionStore, InMemoryExecutionStore,
        SqliteExecutionStore, StoreError,
    };
    pub use crate::reliability::{RetryError, RetryExecutor, RetryPolicy};
    pub use crate::step::{step_fn, Step, StepContext, StepError, StepHandler, StepResult};
    pub use crate::workflow::{
        reasons, Execution, ExecutionStatus, StepOutput, StepPlan, StepRecord, Workflow,
        WorkflowError, WorkflowOutcome,
    };
}

// Re-export key types at crate root
pub use config::EngineConfig;
pub use engine::{
    ApprovalGate, Decision, GateError, GateOutcome, HandlerRegistry, Orchestrator,
    OrchestratorError, RegistryError, Submission,
};
pub use persistence::{
    open_store, ExecutionFilter, ExecutionStore, InMemoryExecutionStore, SqliteExecutionStore,
    StoreError,
};
pub use reliability::{RetryError, RetryExecutor, RetryPolicy};
pub use step::{step_fn, Step, StepContext, StepError, StepHandler, StepResult};
pub use workflow::{
    reasons, Execution, ExecutionStatus, StepOutput, StepPlan, StepRecord, Workflow,
    WorkflowError, WorkflowOutcome,
};

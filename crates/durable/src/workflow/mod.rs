//! Workflow abstractions and types
//!
//! This module contains the core workflow primitives:
//! - [`Workflow`] trait for defining approval-gated workflows
//! - [`Execution`] and [`ExecutionStatus`], the persisted run and its state machine
//! - [`StepPlan`] / [`StepOutput`] for scheduling steps and collecting their results

mod definition;
mod execution;

pub use definition::{StepOutput, StepPlan, Workflow, WorkflowError, WorkflowOutcome};
pub use execution::{reasons, Execution, ExecutionStatus, ParseStatusError, StepRecord};

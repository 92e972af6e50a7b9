//! Execution engine
//!
//! The engine module provides the [`Orchestrator`] which drives executions
//! through the [`ApprovalGate`] and runs their steps, resolving handlers by
//! name from the [`HandlerRegistry`].

mod gate;
mod orchestrator;
mod registry;

pub use gate::{ApprovalGate, Decision, GateError, GateOutcome};
pub use orchestrator::{Orchestrator, OrchestratorError, Submission};
pub use registry::{HandlerRegistry, RegistryError};

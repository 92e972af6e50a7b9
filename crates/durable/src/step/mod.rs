//! Step abstractions
//!
//! Steps are the units of work run after approval. They:
//! - May fail and be retried according to the retry policy
//! - Have their first successful result recorded and replayed on resume
//! - Receive an idempotency key for deduplicating external effects

mod context;
mod definition;

pub use context::StepContext;
pub use definition::{step_fn, Step, StepError, StepHandler, StepResult};

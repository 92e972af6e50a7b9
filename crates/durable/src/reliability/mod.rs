//! Reliability patterns for durable execution
//!
//! This module provides:
//! - [`RetryPolicy`] - Configurable retry with exponential backoff
//! - [`RetryExecutor`] - Runs a step with retries and records its result once

mod executor;
mod retry;

pub use executor::{RetryError, RetryExecutor};
pub use retry::RetryPolicy;

//! Step trait and handler types

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::StepContext;

/// Error type for step failures
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepError {
    /// Error message
    pub message: String,

    /// Error type/code for programmatic handling
    pub error_type: Option<String>,

    /// Whether this error is retryable
    ///
    /// Non-retryable errors fail the step immediately without further
    /// attempts.
    pub retryable: bool,

    /// Additional error details (for debugging)
    pub details: Option<serde_json::Value>,
}

impl StepError {
    /// Create a new retryable error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: true,
            details: None,
        }
    }

    /// Create a non-retryable error
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: None,
            retryable: false,
            details: None,
        }
    }

    /// Set the error type
    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    /// Add error details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for StepError {}

impl From<anyhow::Error> for StepError {
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(err.to_string())
    }
}

/// Result of one step attempt
pub type StepResult = Result<serde_json::Value, StepError>;

/// Type-erased step handler stored in the registry
///
/// Receives the attempt context and the JSON arguments from the plan.
pub type StepHandler = Arc<dyn Fn(StepContext, serde_json::Value) -> BoxFuture<'static, StepResult> + Send + Sync>;

/// Wrap an async closure as a [`StepHandler`]
pub fn step_fn<F, Fut>(f: F) -> StepHandler
where
    F: Fn(StepContext, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = StepResult> + Send + 'static,
{
    Arc::new(move |ctx, args| Box::pin(f(ctx, args)))
}

/// A typed, idempotent unit of work
///
/// Steps may be invoked more than once for the same execution (a crash after
/// the side effect but before the result is recorded). Steps with external
/// effects should pass [`StepContext::idempotency_key`] to the downstream
/// system.
///
/// # Example
///
/// ```ignore
/// use signoff_durable::prelude::*;
///
/// struct SendReminder;
///
/// #[async_trait]
/// impl Step for SendReminder {
///     const NAME: &'static str = "send_reminder";
///     type Input = ReminderInput;
///     type Output = ReminderSent;
///
///     async fn execute(
///         &self,
///         ctx: &StepContext,
///         input: Self::Input,
///     ) -> Result<Self::Output, StepError> {
///         mailer.send(&input.to, ctx.idempotency_key()).await?;
///         Ok(ReminderSent { .. })
///     }
/// }
/// ```
#[async_trait]
pub trait Step: Send + Sync + 'static {
    /// Registry name for this step handler
    const NAME: &'static str;

    /// Input type for the step
    type Input: DeserializeOwned + Send;

    /// Output type recorded for the step
    type Output: Serialize + Send;

    /// Execute the step
    ///
    /// Return `StepError::retryable()` for transient failures and
    /// `StepError::non_retryable()` for permanent ones.
    async fn execute(
        &self,
        ctx: &StepContext,
        input: Self::Input,
    ) -> Result<Self::Output, StepError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_error_retryable() {
        let error = StepError::retryable("gateway timeout");
        assert!(error.retryable);
        assert_eq!(error.to_string(), "gateway timeout");
    }

    #[test]
    fn test_step_error_non_retryable_with_type() {
        let error = StepError::non_retryable("card declined")
            .with_type("DECLINED")
            .with_details(json!({"code": 51}));

        assert!(!error.retryable);
        assert_eq!(error.error_type.as_deref(), Some("DECLINED"));
        assert_eq!(error.details, Some(json!({"code": 51})));
    }

    #[test]
    fn test_anyhow_errors_are_retryable() {
        let error: StepError = anyhow::anyhow!("connection reset").into();
        assert!(error.retryable);
        assert_eq!(error.message, "connection reset");
    }

    #[tokio::test]
    async fn test_step_fn_wraps_closure() {
        let handler = step_fn(|ctx: StepContext, args| async move {
            Ok(json!({ "key": ctx.idempotency_key(), "args": args }))
        });

        let ctx = StepContext::new("e1", "pay-0", 1, 3);
        let result = handler(ctx, json!(7)).await.unwrap();
        assert_eq!(result, json!({"key": "e1:pay-0", "args": 7}));
    }
}

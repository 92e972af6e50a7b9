//! Durable function registry
//!
//! Maps step handler names to type-erased handlers so a workflow plan can
//! refer to handlers by name and a resumed execution can find them again.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::step::{step_fn, Step, StepContext, StepError, StepHandler, StepResult};

/// Registry of step handlers
pub struct HandlerRegistry {
    handlers: HashMap<String, StepHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Bind a handler to a unique name
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: StepHandler,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.handlers.insert(name, handler);
        Ok(())
    }

    /// Bind an async closure to a unique name
    ///
    /// # Example
    ///
    /// ```ignore
    /// registry.register_fn("echo", |_ctx, args| async move { Ok(args) })?;
    /// ```
    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(StepContext, Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = StepResult> + Send + 'static,
    {
        self.register(name, step_fn(f))
    }

    /// Register a typed step under [`Step::NAME`]
    ///
    /// Arguments that fail to deserialize into `S::Input` are reported as a
    /// non-retryable `INVALID_INPUT` error.
    pub fn register_step<S: Step>(&mut self, step: S) -> Result<(), RegistryError> {
        let step = Arc::new(step);
        self.register_fn(S::NAME, move |ctx, args| {
            let step = Arc::clone(&step);
            async move {
                let input: S::Input = serde_json::from_value(args).map_err(|e| {
                    StepError::non_retryable(format!("invalid input for {}: {}", S::NAME, e))
                        .with_type("INVALID_INPUT")
                })?;
                let output = step.execute(&ctx, input).await?;
                serde_json::to_value(output).map_err(|e| {
                    StepError::non_retryable(format!("unserializable output: {}", e))
                        .with_type("INVALID_OUTPUT")
                })
            }
        })
    }

    /// Look up a handler by name
    pub fn resolve(&self, name: &str) -> Result<StepHandler, RegistryError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownHandler(name.to_string()))
    }

    /// Check if a handler name is bound
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Get the number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Get all registered handler names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(|s| s.as_str())
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Errors from registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Name already bound to a handler
    #[error("handler already registered: {0}")]
    DuplicateName(String),

    /// No handler bound to this name
    #[error("unknown handler: {0}")]
    UnknownHandler(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct DoubleInput {
        value: i64,
    }

    #[derive(Debug, Serialize)]
    struct DoubleOutput {
        doubled: i64,
    }

    struct Double;

    #[async_trait]
    impl Step for Double {
        const NAME: &'static str = "double";
        type Input = DoubleInput;
        type Output = DoubleOutput;

        async fn execute(
            &self,
            _ctx: &StepContext,
            input: Self::Input,
        ) -> Result<Self::Output, StepError> {
            Ok(DoubleOutput {
                doubled: input.value * 2,
            })
        }
    }

    fn ctx() -> StepContext {
        StepContext::new("e1", "double-1", 1, 3)
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn("echo", |_ctx, args| async move { Ok(args) })
            .unwrap();

        assert!(registry.contains("echo"));
        assert!(!registry.contains("unknown"));
        assert_eq!(registry.len(), 1);

        let handler = registry.resolve("echo").unwrap();
        assert_eq!(handler(ctx(), json!("hi")).await.unwrap(), json!("hi"));
    }

    #[test]
    fn test_duplicate_name() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn("echo", |_ctx, args| async move { Ok(args) })
            .unwrap();

        let err = registry
            .register_fn("echo", |_ctx, _args| async move { Ok(json!(null)) })
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(name) if name == "echo"));
    }

    #[test]
    fn test_unknown_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.resolve("missing"),
            Err(RegistryError::UnknownHandler(_))
        ));
    }

    #[tokio::test]
    async fn test_register_typed_step() {
        let mut registry = HandlerRegistry::new();
        registry.register_step(Double).unwrap();

        let handler = registry.resolve("double").unwrap();
        let result = handler(ctx(), json!({"value": 21})).await.unwrap();
        assert_eq!(result, json!({"doubled": 42}));
    }

    #[tokio::test]
    async fn test_typed_step_invalid_input_not_retryable() {
        let mut registry = HandlerRegistry::new();
        registry.register_step(Double).unwrap();

        let handler = registry.resolve("double").unwrap();
        let err = handler(ctx(), json!({"wrong": 1})).await.unwrap_err();
        assert!(!err.retryable);
        assert_eq!(err.error_type.as_deref(), Some("INVALID_INPUT"));
    }

    #[test]
    fn test_registry_debug() {
        let mut registry = HandlerRegistry::new();
        registry.register_step(Double).unwrap();

        let debug_str = format!("{:?}", registry);
        assert!(debug_str.contains("double"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["double"]);
    }
}

//! Workflow orchestrator
//!
//! Drives one execution at a time through the approval gate and its planned
//! steps. Every decision is read back from the store, so a driver can be
//! restarted at any point and pick up where the last one stopped.
//!
//! ```text
//! submit ──► pending ──(gate)──► approved ──► processing ──► completed
//!               │                                 │
//!               └──► rejected                     └──► failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, error, info, instrument, warn};

use super::gate::{ApprovalGate, Decision, GateError};
use super::registry::{HandlerRegistry, RegistryError};
use crate::config::EngineConfig;
use crate::persistence::{ExecutionFilter, ExecutionStore, StoreError};
use crate::reliability::{RetryError, RetryExecutor};
use crate::workflow::{Execution, ExecutionStatus, StepOutput, Workflow, WorkflowError, WorkflowOutcome};

/// Errors from orchestrator operations
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Gate error
    #[error("approval error: {0}")]
    Gate(#[from] GateError),

    /// Step error (exhausted retries leave the execution resumable)
    #[error("step error: {0}")]
    Step(#[from] RetryError),

    /// Registry error
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Workflow error
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Execution id belongs to another workflow type
    #[error("execution {id} belongs to workflow {actual}, not {expected}")]
    WrongWorkflow {
        id: String,
        expected: &'static str,
        actual: String,
    },

    /// A settled execution read back as non-terminal
    #[error("execution {id} is {status} after settling")]
    Unsettled { id: String, status: ExecutionStatus },
}

/// Result of [`Orchestrator::submit`]
#[derive(Debug, Clone)]
pub struct Submission {
    /// Execution as stored at submission time
    pub execution: Execution,

    /// False when the id already existed and nothing new was created
    pub created: bool,
}

struct Inner<W: Workflow> {
    workflow: W,
    store: Arc<dyn ExecutionStore>,
    registry: Arc<HandlerRegistry>,
    gate: ApprovalGate,
    steps: RetryExecutor,
    approval_timeout: Duration,
    stall_retry_interval: Duration,
    running: DashMap<String, ()>,
}

/// Drives executions of one workflow type
///
/// Cheap to clone; clones share the running-driver set.
///
/// # Example
///
/// ```ignore
/// let store = open_store(&config).await?;
/// let mut registry = HandlerRegistry::new();
/// registry.register_step(PayLineItem)?;
///
/// let orchestrator = Orchestrator::new(InvoiceApprovalWorkflow, store, registry, &config);
/// orchestrator.recover().await?;
/// orchestrator.submit("INV-1", invoice).await?;
/// ```
pub struct Orchestrator<W: Workflow> {
    inner: Arc<Inner<W>>,
}

impl<W: Workflow> Clone for Orchestrator<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Removes the id from the running set when a driver task ends
struct RunningGuard<W: Workflow> {
    inner: Arc<Inner<W>>,
    id: String,
}

impl<W: Workflow> Drop for RunningGuard<W> {
    fn drop(&mut self) {
        self.inner.running.remove(&self.id);
    }
}

impl<W: Workflow> Orchestrator<W> {
    pub fn new(
        workflow: W,
        store: Arc<dyn ExecutionStore>,
        registry: HandlerRegistry,
        config: &EngineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                workflow,
                gate: ApprovalGate::new(Arc::clone(&store), config.poll_interval),
                steps: RetryExecutor::new(Arc::clone(&store), config.retry_policy.clone()),
                registry: Arc::new(registry),
                approval_timeout: config.approval_timeout,
                stall_retry_interval: config.stall_retry_interval,
                running: DashMap::new(),
                store,
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn ExecutionStore> {
        &self.inner.store
    }

    pub fn workflow(&self) -> &W {
        &self.inner.workflow
    }

    /// Create an execution and start driving it in the background
    ///
    /// A duplicate id does not create anything: the stored execution is
    /// returned and, if unfinished, its driver is (re)started.
    #[instrument(skip(self, input))]
    pub async fn submit(&self, id: &str, input: W::Input) -> Result<Submission, OrchestratorError> {
        let input = serde_json::to_value(&input)?;
        let deadline = deadline_after(self.inner.approval_timeout);

        let (execution, created) = match self.inner.store.create(id, W::TYPE, input, deadline).await {
            Ok(execution) => (execution, true),
            Err(StoreError::DuplicateExecution(_)) => {
                let execution = self.inner.store.get(id).await?;
                self.check_type(&execution)?;
                debug!(execution_id = %id, status = %execution.status, "Execution already exists");
                (execution, false)
            }
            Err(e) => return Err(e.into()),
        };

        if created {
            info!(
                execution_id = %id,
                workflow_type = W::TYPE,
                deadline = %execution.deadline,
                "Execution submitted"
            );
        }

        if !execution.is_terminal() {
            self.spawn(id);
        }

        Ok(Submission { execution, created })
    }

    /// Record an approval decision
    ///
    /// An approval also starts a driver if none is running in this process,
    /// so an execution created by an earlier process does not wait for
    /// [`Orchestrator::recover`].
    pub async fn decide(&self, id: &str, decision: Decision) -> Result<Execution, OrchestratorError> {
        let execution = self.inner.store.get(id).await?;
        self.check_type(&execution)?;
        let execution = self.inner.gate.decide(id, decision).await?;

        if execution.status == ExecutionStatus::Approved {
            self.spawn(id);
        }
        Ok(execution)
    }

    /// Load the current state of an execution
    pub async fn get(&self, id: &str) -> Result<Execution, OrchestratorError> {
        let execution = self.inner.store.get(id).await?;
        self.check_type(&execution)?;
        Ok(execution)
    }

    /// Start a background driver for `id`
    ///
    /// Returns false without doing anything if one is already running in
    /// this process. A driver whose step exhausted its retries stays alive
    /// and runs the execution again after the stall retry interval.
    pub fn spawn(&self, id: &str) -> bool {
        match self.inner.running.entry(id.to_string()) {
            Entry::Occupied(_) => {
                debug!(execution_id = %id, "Driver already running");
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        let this = self.clone();
        let guard = RunningGuard {
            inner: Arc::clone(&self.inner),
            id: id.to_string(),
        };

        tokio::spawn(async move {
            let guard = guard;
            loop {
                match this.run(&guard.id).await {
                    Ok(outcome) => {
                        debug!(execution_id = %guard.id, ?outcome, "Driver finished");
                        break;
                    }
                    Err(OrchestratorError::Step(RetryError::StepExhausted { .. })) => {
                        let pause = this.inner.stall_retry_interval;
                        debug!(execution_id = %guard.id, ?pause, "Driver waiting to retry stalled step");
                        tokio::time::sleep(pause).await;
                    }
                    Err(e) => {
                        error!(execution_id = %guard.id, error = %e, "Driver stopped");
                        break;
                    }
                }
            }
        });

        true
    }

    /// Check if a driver for `id` is running in this process
    pub fn is_running(&self, id: &str) -> bool {
        self.inner.running.contains_key(id)
    }

    /// Drive an execution until it reaches a terminal status
    ///
    /// Safe to call on any execution in any status: terminal executions
    /// return their stored outcome immediately, recorded steps are replayed.
    #[instrument(skip(self))]
    pub async fn run(&self, id: &str) -> Result<WorkflowOutcome, OrchestratorError> {
        loop {
            let execution = self.inner.store.get(id).await?;
            self.check_type(&execution)?;

            if let Some(outcome) = WorkflowOutcome::from_execution(&execution) {
                return Ok(outcome);
            }

            match execution.status {
                ExecutionStatus::Pending => {
                    self.inner.gate.await_decision(id, execution.deadline).await?;
                }
                ExecutionStatus::Approved => {
                    match self
                        .inner
                        .store
                        .set_status(id, ExecutionStatus::Processing, None, None)
                        .await
                    {
                        Ok(_) => info!(execution_id = %id, "Processing started"),
                        Err(StoreError::InvalidTransition { .. }) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                _ => return self.process(execution).await,
            }
        }
    }

    /// Restart drivers for every unfinished execution of this workflow type
    ///
    /// Returns the ids a new driver was started for.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<Vec<String>, OrchestratorError> {
        let filter = ExecutionFilter::unfinished().with_workflow_type(W::TYPE);
        let unfinished = self.inner.store.list(&filter).await?;

        let resumed: Vec<String> = unfinished
            .into_iter()
            .filter(|e| self.spawn(&e.id))
            .map(|e| e.id)
            .collect();

        info!(
            workflow_type = W::TYPE,
            count = resumed.len(),
            "Recovered unfinished executions"
        );
        Ok(resumed)
    }

    /// Run the planned steps of a processing execution and settle it
    async fn process(&self, execution: Execution) -> Result<WorkflowOutcome, OrchestratorError> {
        let id = execution.id.as_str();

        let input: W::Input = match serde_json::from_value(execution.input.clone()) {
            Ok(input) => input,
            Err(e) => {
                warn!(execution_id = %id, error = %e, "Stored input is malformed");
                return self.fail(id, format!("malformed input: {}", e)).await;
            }
        };

        if execution.reason.is_some() {
            self.mark_stalled(id, None).await?;
        }

        let plan = self.inner.workflow.plan(&input);
        let mut outputs = Vec::with_capacity(plan.len());

        for step in plan {
            let handler = self.inner.registry.resolve(&step.handler)?;
            match self.inner.steps.run(id, &step.name, &handler, step.args).await {
                Ok(result) => outputs.push(StepOutput {
                    name: step.name,
                    result,
                }),
                Err(RetryError::StepAborted { error, .. }) => {
                    return self.fail(id, format!("step {} failed: {}", step.name, error)).await;
                }
                Err(e @ RetryError::StepExhausted { .. }) => {
                    warn!(execution_id = %id, step = %step.name, error = %e, "Execution stalled");
                    self.mark_stalled(id, Some(format!("stalled: {}", e))).await?;
                    return Err(e.into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let output = match self.inner.workflow.complete(&input, outputs) {
            Ok(output) => output,
            Err(e) => return self.fail(id, e.to_string()).await,
        };
        let result = serde_json::to_value(output)?;

        let outcome = self.settle(id, ExecutionStatus::Completed, Some(result), None).await?;
        info!(execution_id = %id, "Execution completed");
        Ok(outcome)
    }

    /// Set or clear the stall reason of a processing execution
    async fn mark_stalled(&self, id: &str, reason: Option<String>) -> Result<(), OrchestratorError> {
        match self
            .inner
            .store
            .set_reason(id, ExecutionStatus::Processing, reason)
            .await
        {
            Ok(_) | Err(StoreError::InvalidTransition { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn fail(&self, id: &str, reason: String) -> Result<WorkflowOutcome, OrchestratorError> {
        warn!(execution_id = %id, reason = %reason, "Execution failed");
        self.settle(id, ExecutionStatus::Failed, None, Some(reason)).await
    }

    /// Move to a terminal status; if another driver got there first, report theirs
    async fn settle(
        &self,
        id: &str,
        status: ExecutionStatus,
        result: Option<serde_json::Value>,
        reason: Option<String>,
    ) -> Result<WorkflowOutcome, OrchestratorError> {
        let execution = match self.inner.store.set_status(id, status, result, reason).await {
            Ok(execution) => execution,
            Err(StoreError::InvalidTransition { .. }) => self.inner.store.get(id).await?,
            Err(e) => return Err(e.into()),
        };

        WorkflowOutcome::from_execution(&execution).ok_or_else(|| OrchestratorError::Unsettled {
            id: id.to_string(),
            status: execution.status,
        })
    }

    fn check_type(&self, execution: &Execution) -> Result<(), OrchestratorError> {
        if execution.workflow_type == W::TYPE {
            Ok(())
        } else {
            Err(OrchestratorError::WrongWorkflow {
                id: execution.id.clone(),
                expected: W::TYPE,
                actual: execution.workflow_type.clone(),
            })
        }
    }
}

fn deadline_after(timeout: Duration) -> DateTime<Utc> {
    let now = Utc::now();
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

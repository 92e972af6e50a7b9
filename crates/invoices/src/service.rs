//! In-process invoice operations: submit, approve, reject, status

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use signoff_durable::{
    Decision, EngineConfig, Execution, ExecutionStatus, ExecutionStore, GateError,
    HandlerRegistry, Orchestrator, OrchestratorError, RegistryError, StoreError,
};

use crate::invoice::{Invoice, InvoiceReceipt};
use crate::workflow::{InvoiceApprovalWorkflow, PayLineItem};

/// Errors from invoice operations
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// No invoice execution with this id
    #[error("invoice execution not found: {0}")]
    NotFound(String),

    /// Operation not allowed in the current status
    #[error("invoice execution {id} is {status}")]
    InvalidState { id: String, status: ExecutionStatus },

    /// Invoice cannot be paid as submitted
    #[error("invalid invoice: {0}")]
    InvalidInvoice(String),

    /// Handler registration failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Engine error
    #[error("engine error: {0}")]
    Engine(OrchestratorError),
}

impl From<OrchestratorError> for ServiceError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Store(StoreError::NotFound(id))
            | OrchestratorError::Gate(GateError::NotFound(id)) => Self::NotFound(id),
            OrchestratorError::Gate(GateError::InvalidState { id, status }) => {
                Self::InvalidState { id, status }
            }
            OrchestratorError::WrongWorkflow { id, .. } => Self::NotFound(id),
            other => Self::Engine(other),
        }
    }
}

/// Snapshot returned by [`InvoiceService::status`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStatus {
    pub invoice_id: String,
    pub status: ExecutionStatus,
    pub total_amount: f64,
    /// `declined`, `timeout`, the failure message, or why processing stalled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<InvoiceReceipt>,
}

impl InvoiceStatus {
    fn from_execution(execution: &Execution) -> Result<Self, ServiceError> {
        let invoice: Invoice = serde_json::from_value(execution.input.clone())
            .map_err(|e| ServiceError::Engine(OrchestratorError::Serialization(e)))?;
        let result = execution
            .result
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ServiceError::Engine(OrchestratorError::Serialization(e)))?;

        Ok(Self {
            invoice_id: invoice.id.clone(),
            status: execution.status,
            total_amount: invoice.total(),
            reason: execution.reason.clone(),
            result,
        })
    }
}

/// Invoice approval façade over the durable engine
///
/// # Example
///
/// ```ignore
/// let service = InvoiceService::new(store, &EngineConfig::from_env())?;
/// service.recover().await?;
///
/// service.submit("INV-1", invoice).await?;
/// service.approve("INV-1").await?;
/// let status = service.status("INV-1").await?;
/// ```
#[derive(Clone)]
pub struct InvoiceService {
    orchestrator: Orchestrator<InvoiceApprovalWorkflow>,
}

impl InvoiceService {
    /// Create a service with the standard payment step registered
    pub fn new(store: Arc<dyn ExecutionStore>, config: &EngineConfig) -> Result<Self, ServiceError> {
        let mut registry = HandlerRegistry::new();
        registry.register_step(PayLineItem)?;
        Ok(Self::with_registry(store, registry, config))
    }

    /// Create a service with caller-supplied step handlers
    ///
    /// The registry must bind [`crate::PAY_LINE_ITEM`].
    pub fn with_registry(
        store: Arc<dyn ExecutionStore>,
        registry: HandlerRegistry,
        config: &EngineConfig,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(InvoiceApprovalWorkflow, store, registry, config),
        }
    }

    /// Submit an invoice for approval
    ///
    /// Returns as soon as the execution is stored. Submitting an id again
    /// reports the existing execution instead of creating a new one; the
    /// new payload is ignored and not validated.
    #[instrument(skip(self, invoice))]
    pub async fn submit(&self, execution_id: &str, invoice: Invoice) -> Result<String, ServiceError> {
        match self.orchestrator.get(execution_id).await {
            Ok(_) => {}
            Err(OrchestratorError::Store(StoreError::NotFound(_))) => {
                invoice.validate().map_err(ServiceError::InvalidInvoice)?;
            }
            Err(e) => return Err(e.into()),
        }

        let total = invoice.total();
        let submission = self.orchestrator.submit(execution_id, invoice).await?;

        if submission.created {
            Ok(format!(
                "Invoice submitted for approval (execution {}, total {:.2})",
                execution_id, total
            ))
        } else {
            Ok(format!(
                "Invoice already submitted (execution {}, status {})",
                execution_id, submission.execution.status
            ))
        }
    }

    /// Approve a pending invoice
    #[instrument(skip(self))]
    pub async fn approve(&self, execution_id: &str) -> Result<String, ServiceError> {
        self.orchestrator
            .decide(execution_id, Decision::Approved)
            .await?;
        info!(execution_id = %execution_id, "Invoice approved");
        Ok(format!("Invoice {} approved", execution_id))
    }

    /// Reject a pending invoice
    #[instrument(skip(self))]
    pub async fn reject(&self, execution_id: &str) -> Result<String, ServiceError> {
        self.orchestrator
            .decide(execution_id, Decision::Rejected)
            .await?;
        info!(execution_id = %execution_id, "Invoice rejected");
        Ok(format!("Invoice {} rejected", execution_id))
    }

    /// Current status of an invoice execution
    pub async fn status(&self, execution_id: &str) -> Result<InvoiceStatus, ServiceError> {
        let execution = self.orchestrator.get(execution_id).await?;
        InvoiceStatus::from_execution(&execution)
    }

    /// Resume unfinished invoice executions after a restart
    pub async fn recover(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.orchestrator.recover().await?)
    }

    /// Underlying orchestrator
    pub fn orchestrator(&self) -> &Orchestrator<InvoiceApprovalWorkflow> {
        &self.orchestrator
    }
}

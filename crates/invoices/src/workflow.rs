//! Invoice approval workflow and the line item payment step

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use signoff_durable::{Step, StepContext, StepError, StepOutput, StepPlan, Workflow, WorkflowError};

use crate::invoice::{sum_amounts, to_cents, Invoice, InvoiceReceipt, LineItem, PaymentConfirmation};

/// Handler name for [`PayLineItem`]
pub const PAY_LINE_ITEM: &str = "pay_line_item";

/// Approve, then pay each line item in order
pub struct InvoiceApprovalWorkflow;

impl InvoiceApprovalWorkflow {
    /// Step name for the line item at `index`
    pub fn step_name(index: usize, item: &LineItem) -> String {
        format!("pay-{}-{}", index, item.item)
    }
}

impl Workflow for InvoiceApprovalWorkflow {
    const TYPE: &'static str = "invoice_approval";
    type Input = Invoice;
    type Output = InvoiceReceipt;

    fn plan(&self, invoice: &Invoice) -> Vec<StepPlan> {
        invoice
            .line_items
            .iter()
            .enumerate()
            .map(|(i, line)| {
                StepPlan::new(
                    Self::step_name(i, line),
                    PAY_LINE_ITEM,
                    serde_json::json!(PayLineItemInput {
                        invoice_id: invoice.id.clone(),
                        line: line.clone(),
                    }),
                )
            })
            .collect()
    }

    fn complete(
        &self,
        invoice: &Invoice,
        outputs: Vec<StepOutput>,
    ) -> Result<InvoiceReceipt, WorkflowError> {
        let payments = outputs
            .into_iter()
            .map(|o| {
                serde_json::from_value::<PaymentConfirmation>(o.result).map_err(|e| {
                    WorkflowError::new(format!("unreadable payment for {}: {}", o.name, e))
                        .with_code("BAD_PAYMENT")
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let total_paid = sum_amounts(payments.iter().map(|p| p.amount));
        Ok(InvoiceReceipt {
            invoice_id: invoice.id.clone(),
            payments,
            total_paid,
        })
    }
}

/// Arguments for one line item payment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayLineItemInput {
    pub invoice_id: String,
    pub line: LineItem,
}

/// Pays a single line item
///
/// Stands in for a payment gateway call; the idempotency key is what a real
/// gateway would deduplicate on.
pub struct PayLineItem;

#[async_trait]
impl Step for PayLineItem {
    const NAME: &'static str = PAY_LINE_ITEM;
    type Input = PayLineItemInput;
    type Output = PaymentConfirmation;

    async fn execute(
        &self,
        ctx: &StepContext,
        input: PayLineItemInput,
    ) -> Result<PaymentConfirmation, StepError> {
        let line = input.line;
        if !line.amount.is_finite() || to_cents(line.amount) <= 0 {
            return Err(StepError::non_retryable(format!(
                "cannot pay {} for {}",
                line.amount, line.item
            ))
            .with_type("INVALID_AMOUNT"));
        }

        let confirmation = PaymentConfirmation {
            confirmation_id: Uuid::now_v7().to_string(),
            item: line.item,
            amount: line.amount,
            idempotency_key: ctx.idempotency_key(),
            paid_at: Utc::now(),
        };

        info!(
            invoice_id = %input.invoice_id,
            item = %confirmation.item,
            amount = confirmation.amount,
            attempt = ctx.attempt,
            "Line item paid"
        );
        Ok(confirmation)
    }
}

//! Invoice approval on top of the durable execution engine
//!
//! An invoice is submitted, waits for an approve/reject decision (or times
//! out), and once approved each line item is paid in order through a retried,
//! recorded step. [`InvoiceService`] exposes the four operations a dispatch
//! layer needs: `submit`, `approve`, `reject` and `status`.

pub mod invoice;
pub mod service;
pub mod telemetry;
pub mod workflow;

pub use invoice::{sum_amounts, to_cents, Invoice, InvoiceReceipt, LineItem, PaymentConfirmation};
pub use service::{InvoiceService, InvoiceStatus, ServiceError};
pub use workflow::{InvoiceApprovalWorkflow, PayLineItem, PayLineItemInput, PAY_LINE_ITEM};

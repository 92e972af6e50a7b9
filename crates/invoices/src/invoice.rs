//! Invoice domain types
//!
//! Amounts are currency units with two decimal places. They travel as JSON
//! numbers but are summed as whole cents, so `0.1 + 0.2` totals `0.3`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const CENTS_PER_UNIT: f64 = 100.0;

/// Amount rounded to whole cents
pub fn to_cents(amount: f64) -> i64 {
    (amount * CENTS_PER_UNIT).round() as i64
}

/// Sum amounts in whole cents
pub fn sum_amounts(amounts: impl IntoIterator<Item = f64>) -> f64 {
    let cents: i64 = amounts.into_iter().map(to_cents).sum();
    cents as f64 / CENTS_PER_UNIT
}

/// One billable line of an invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub item: String,
    pub amount: f64,
    #[serde(default)]
    pub description: String,
}

impl LineItem {
    pub fn new(item: impl Into<String>, amount: f64) -> Self {
        Self {
            item: item.into(),
            amount,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// An invoice awaiting approval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub line_items: Vec<LineItem>,
}

impl Invoice {
    pub fn new(id: impl Into<String>, line_items: Vec<LineItem>) -> Self {
        Self {
            id: id.into(),
            line_items,
        }
    }

    /// Sum of all line item amounts
    pub fn total(&self) -> f64 {
        sum_amounts(self.line_items.iter().map(|l| l.amount))
    }

    /// Check the invoice can be paid as submitted
    pub fn validate(&self) -> Result<(), String> {
        if self.line_items.is_empty() {
            return Err(format!("invoice {} has no line items", self.id));
        }
        if let Some(bad) = self
            .line_items
            .iter()
            .find(|l| !l.amount.is_finite() || to_cents(l.amount) <= 0)
        {
            return Err(format!(
                "line item {} has non-positive amount {}",
                bad.item, bad.amount
            ));
        }
        Ok(())
    }
}

/// Result of paying one line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub confirmation_id: String,
    pub item: String,
    pub amount: f64,
    /// `executionId:stepName`, stable across retries of the same payment
    pub idempotency_key: String,
    pub paid_at: DateTime<Utc>,
}

/// Final result of an approved invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceReceipt {
    pub invoice_id: String,
    /// Confirmations in line item order
    pub payments: Vec<PaymentConfirmation>,
    pub total_paid: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv1() -> Invoice {
        Invoice::new(
            "INV-1",
            vec![
                LineItem::new("consulting", 100.0).with_description("March retainer"),
                LineItem::new("expenses", 50.0),
            ],
        )
    }

    #[test]
    fn test_total() {
        assert_eq!(inv1().total(), 150.0);
        assert_eq!(Invoice::new("empty", vec![]).total(), 0.0);
    }

    #[test]
    fn test_total_is_exact_in_cents() {
        let invoice = Invoice::new(
            "INV-6",
            vec![LineItem::new("a", 0.1), LineItem::new("b", 0.2)],
        );
        assert_eq!(invoice.total(), 0.3);
        assert_eq!(sum_amounts([19.99, 0.01, 80.0]), 100.0);
        assert_eq!(to_cents(12.345), 1235);
    }

    #[test]
    fn test_validate() {
        assert!(inv1().validate().is_ok());

        let empty = Invoice::new("INV-2", vec![]);
        assert!(empty.validate().unwrap_err().contains("no line items"));

        let negative = Invoice::new("INV-3", vec![LineItem::new("refund", -5.0)]);
        assert!(negative.validate().unwrap_err().contains("refund"));

        let nan = Invoice::new("INV-4", vec![LineItem::new("typo", f64::NAN)]);
        assert!(nan.validate().is_err());

        let sub_cent = Invoice::new("INV-7", vec![LineItem::new("dust", 0.001)]);
        assert!(sub_cent.validate().is_err());
    }

    #[test]
    fn test_invoice_json_shape() {
        let json = serde_json::to_value(inv1()).unwrap();
        assert_eq!(json["lineItems"][0]["item"], "consulting");

        // description is optional on input
        let parsed: Invoice = serde_json::from_value(serde_json::json!({
            "id": "INV-5",
            "lineItems": [{"item": "hosting", "amount": 20.0}]
        }))
        .unwrap();
        assert_eq!(parsed.line_items[0].description, "");
    }
}

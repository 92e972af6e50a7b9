//! Submit, approve and pay an invoice
//!
//! Run with: cargo run -p signoff-invoices --example invoice_approval
//!
//! Set `DATABASE_URL=sqlite://signoff.db` to keep executions across runs.

use std::time::Duration;

use signoff_durable::{open_store, EngineConfig};
use signoff_invoices::telemetry::{init_telemetry, TelemetryConfig};
use signoff_invoices::{Invoice, InvoiceService, LineItem};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_telemetry(TelemetryConfig::from_env());

    let config = EngineConfig::from_env();
    let store = open_store(&config).await?;
    let service = InvoiceService::new(store, &config)?;

    let resumed = service.recover().await?;
    if !resumed.is_empty() {
        println!("Resumed {} unfinished invoice(s): {:?}", resumed.len(), resumed);
    }

    let invoice = Invoice::new(
        "INV-1",
        vec![
            LineItem::new("consulting", 100.0).with_description("March retainer"),
            LineItem::new("expenses", 50.0),
        ],
    );

    println!("{}", service.submit("INV-1", invoice).await?);

    let status = service.status("INV-1").await?;
    if status.status.is_terminal() {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    match service.approve("INV-1").await {
        Ok(ack) => println!("{ack}"),
        Err(e) => println!("Approve skipped: {e}"),
    }

    loop {
        let status = service.status("INV-1").await?;
        if status.status.is_terminal() {
            println!("{}", serde_json::to_string_pretty(&status)?);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    Ok(())
}

//! Print the current stock levels and reorder list as JSON.
//!
//! Reads the same environment as every other entry point (see
//! `hotcoffee_infra::config`).

use anyhow::Context;
use serde::Serialize;

use hotcoffee_infra::config::AppConfig;
use hotcoffee_infra::services::build_services;
use hotcoffee_inventory::InventoryItem;

#[derive(Serialize)]
struct StockReport {
    items: Vec<InventoryItem>,
    low_stock: Vec<InventoryItem>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hotcoffee_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = build_services(&config).await?;
    let ledger = services.coordinator.ledger();

    let items = ledger.snapshot().await.context("failed to read inventory")?;
    let low_stock = ledger.low_stock().await.context("failed to read inventory")?;
    tracing::info!(
        items = items.len(),
        low_stock = low_stock.len(),
        "stock report generated"
    );

    let report = StockReport { items, low_stock };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

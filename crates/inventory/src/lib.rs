//! Inventory domain module.
//!
//! Ingredient stock records, the stock adjustments the ledger applies to them,
//! and reservation plans (aggregated ingredient demand). Pure domain logic: no
//! IO, no storage, no locking.

pub mod item;
pub mod plan;

pub use item::{InventoryItem, NewInventoryItem, StockAdjustment};
pub use plan::{ReservationPlan, Shortfall};

//! Orders domain module.
//!
//! This crate contains business rules for customer orders (request validation,
//! pricing, the pending → closed lifecycle), implemented purely as
//! deterministic domain logic (no IO, no storage access).

pub mod order;
pub mod request;

pub use order::{Order, OrderLineItem, OrderSnapshot, OrderStatus};
pub use request::{LineSelection, OrderLineRequest, OrderRequest, ValidatedOrder};

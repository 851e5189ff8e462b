//! `hotcoffee-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, and the numeric value objects used for
//! ingredient quantities and prices.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod money;
pub mod quantity;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{IngredientId, MenuItemId, OrderId};
pub use money::Money;
pub use quantity::Quantity;

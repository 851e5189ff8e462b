//! Menu domain module.
//!
//! Menu items and the recipes (ingredient requirements per unit sold) that tie
//! them to the inventory. Pure domain logic: no IO, no storage.

pub mod item;

pub use item::{IngredientRequirement, MenuCategory, MenuItem, NewMenuItem};

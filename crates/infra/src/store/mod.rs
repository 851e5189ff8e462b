//! Storage ports for the menu catalog, inventory, and orders.
//!
//! The fulfillment engine only talks to these traits. Two backends ship with
//! the crate:
//!
//! - [`in_memory`]: `RwLock<HashMap>` stores for tests and single-process runs
//! - [`postgres`]: sqlx-backed stores with an embedded schema
//!
//! ## Inventory mutations
//!
//! [`InventoryStore::conditional_adjust`] is the only way stock changes. A
//! consume must be applied atomically with its `quantity >= amount` guard
//! (one `UPDATE ... WHERE` in Postgres, one write-lock section in memory), and
//! a consume that would go negative returns [`StoreError::Conflict`] without
//! touching the row.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use hotcoffee_core::{ExpectedVersion, IngredientId, MenuItemId, OrderId, Quantity};
use hotcoffee_inventory::{InventoryItem, StockAdjustment};
use hotcoffee_menu::MenuItem;
use hotcoffee_orders::Order;

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryInventoryStore, InMemoryMenuCatalog, InMemoryOrderStore};
pub use postgres::{PostgresInventoryStore, PostgresMenuCatalog, PostgresOrderStore};

/// Errors surfaced by storage backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// Guard failed: version mismatch, duplicate key, or a consume beyond stock.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Read-only access to menu items and their recipes.
#[async_trait]
pub trait MenuCatalog: Send + Sync {
    async fn get_menu_item(&self, id: &MenuItemId) -> Result<MenuItem, StoreError>;

    async fn list_menu_items(&self) -> Result<Vec<MenuItem>, StoreError>;
}

/// Ingredient stock records.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get(&self, id: &IngredientId) -> Result<InventoryItem, StoreError>;

    /// All items, sorted by ingredient id.
    async fn list(&self) -> Result<Vec<InventoryItem>, StoreError>;

    /// Apply `adjustment` atomically and return the new on-hand quantity.
    async fn conditional_adjust(
        &self,
        id: &IngredientId,
        adjustment: StockAdjustment,
    ) -> Result<Quantity, StoreError>;
}

/// Order records.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert a new order. An existing id is a [`StoreError::Conflict`].
    async fn insert(&self, order: &Order) -> Result<(), StoreError>;

    /// Insert all orders or none of them.
    async fn insert_many(&self, orders: &[Order]) -> Result<(), StoreError>;

    /// Replace a stored order, guarded by the stored version.
    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError>;

    async fn delete(&self, id: OrderId) -> Result<(), StoreError>;

    async fn get(&self, id: OrderId) -> Result<Order, StoreError>;

    /// All orders, oldest first.
    async fn list(&self) -> Result<Vec<Order>, StoreError>;
}

#[async_trait]
impl<S> MenuCatalog for Arc<S>
where
    S: MenuCatalog + ?Sized,
{
    async fn get_menu_item(&self, id: &MenuItemId) -> Result<MenuItem, StoreError> {
        (**self).get_menu_item(id).await
    }

    async fn list_menu_items(&self) -> Result<Vec<MenuItem>, StoreError> {
        (**self).list_menu_items().await
    }
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn get(&self, id: &IngredientId) -> Result<InventoryItem, StoreError> {
        (**self).get(id).await
    }

    async fn list(&self) -> Result<Vec<InventoryItem>, StoreError> {
        (**self).list().await
    }

    async fn conditional_adjust(
        &self,
        id: &IngredientId,
        adjustment: StockAdjustment,
    ) -> Result<Quantity, StoreError> {
        (**self).conditional_adjust(id, adjustment).await
    }
}

#[async_trait]
impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        (**self).insert(order).await
    }

    async fn insert_many(&self, orders: &[Order]) -> Result<(), StoreError> {
        (**self).insert_many(orders).await
    }

    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).update(order, expected).await
    }

    async fn delete(&self, id: OrderId) -> Result<(), StoreError> {
        (**self).delete(id).await
    }

    async fn get(&self, id: OrderId) -> Result<Order, StoreError> {
        (**self).get(id).await
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        (**self).list().await
    }
}

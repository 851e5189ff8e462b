use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use hotcoffee_core::{
    AggregateRoot, DomainError, ExpectedVersion, IngredientId, MenuItemId, OrderId, Quantity,
};
use hotcoffee_inventory::{InventoryItem, StockAdjustment};
use hotcoffee_menu::MenuItem;
use hotcoffee_orders::Order;

use super::{InventoryStore, MenuCatalog, OrderStore, StoreError};

fn poisoned() -> StoreError {
    StoreError::Backend("lock poisoned".to_string())
}

/// In-memory menu catalog.
///
/// Intended for tests/dev. Items are provisioned with [`InMemoryMenuCatalog::upsert`].
#[derive(Debug, Default)]
pub struct InMemoryMenuCatalog {
    items: RwLock<HashMap<MenuItemId, MenuItem>>,
}

impl InMemoryMenuCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = MenuItem>) -> Self {
        Self {
            items: RwLock::new(
                items
                    .into_iter()
                    .map(|item| (item.id_typed().clone(), item))
                    .collect(),
            ),
        }
    }

    pub fn upsert(&self, item: MenuItem) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.insert(item.id_typed().clone(), item);
        Ok(())
    }
}

#[async_trait]
impl MenuCatalog for InMemoryMenuCatalog {
    async fn get_menu_item(&self, id: &MenuItemId) -> Result<MenuItem, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        items
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("menu item '{id}'")))
    }

    async fn list_menu_items(&self) -> Result<Vec<MenuItem>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        let mut all: Vec<MenuItem> = items.values().cloned().collect();
        all.sort_by(|a, b| a.id_typed().cmp(b.id_typed()));
        Ok(all)
    }
}

/// In-memory ingredient stock.
///
/// `conditional_adjust` runs its guard and write under one write lock, so a
/// consume can never drive a quantity below zero.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    items: RwLock<HashMap<IngredientId, InventoryItem>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: impl IntoIterator<Item = InventoryItem>) -> Self {
        Self {
            items: RwLock::new(
                items
                    .into_iter()
                    .map(|item| (item.id_typed().clone(), item))
                    .collect(),
            ),
        }
    }

    /// Provision or replace a stock record (bypasses the ledger; setup only).
    pub fn upsert(&self, item: InventoryItem) -> Result<(), StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.insert(item.id_typed().clone(), item);
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get(&self, id: &IngredientId) -> Result<InventoryItem, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        items
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("ingredient '{id}'")))
    }

    async fn list(&self) -> Result<Vec<InventoryItem>, StoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        let mut all: Vec<InventoryItem> = items.values().cloned().collect();
        all.sort_by(|a, b| a.id_typed().cmp(b.id_typed()));
        Ok(all)
    }

    async fn conditional_adjust(
        &self,
        id: &IngredientId,
        adjustment: StockAdjustment,
    ) -> Result<Quantity, StoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        let item = items
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("ingredient '{id}'")))?;

        item.adjust(adjustment).map_err(|e| match e {
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            other => StoreError::Backend(other.to_string()),
        })
    }
}

/// In-memory order table.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<OrderId, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.read().map(|orders| orders.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        self.insert_many(std::slice::from_ref(order)).await
    }

    async fn insert_many(&self, batch: &[Order]) -> Result<(), StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;

        // Check everything first so a rejected batch leaves the table untouched.
        for (idx, order) in batch.iter().enumerate() {
            let id = order.id_typed();
            if orders.contains_key(&id) || batch[..idx].iter().any(|o| o.id_typed() == id) {
                return Err(StoreError::Conflict(format!("order {id} already exists")));
            }
        }
        for order in batch {
            orders.insert(order.id_typed(), order.clone());
        }
        Ok(())
    }

    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        let id = order.id_typed();
        let current = orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;

        expected
            .check(current.version())
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        *current = order.clone();
        Ok(())
    }

    async fn delete(&self, id: OrderId) -> Result<(), StoreError> {
        let mut orders = self.orders.write().map_err(|_| poisoned())?;
        orders
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))
    }

    async fn get(&self, id: OrderId) -> Result<Order, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        let orders = self.orders.read().map_err(|_| poisoned())?;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        all.sort_by_key(|o| (o.created_at(), o.id_typed()));
        Ok(all)
    }
}

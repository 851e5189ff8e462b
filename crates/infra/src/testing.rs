//! Test fixtures: a seeded café and fault-injecting store wrappers.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::SubsecRound;

use hotcoffee_core::{ExpectedVersion, IngredientId, MenuItemId, Money, OrderId, Quantity};
use hotcoffee_inventory::{InventoryItem, NewInventoryItem, StockAdjustment};
use hotcoffee_menu::{IngredientRequirement, MenuCategory, MenuItem, NewMenuItem};
use hotcoffee_orders::{Order, OrderLineRequest, OrderRequest, OrderSnapshot};

use crate::store::{
    InMemoryInventoryStore, InMemoryMenuCatalog, InMemoryOrderStore, InventoryStore, OrderStore,
    StoreError,
};

pub fn ingredient(id: &str) -> IngredientId {
    IngredientId::new(id).unwrap()
}

pub fn stock(id: &str, name: &str, units: u32, unit: &str, threshold: u32) -> InventoryItem {
    InventoryItem::new(NewInventoryItem {
        id: ingredient(id),
        name: name.to_string(),
        quantity: Quantity::from_units(units),
        unit: unit.to_string(),
        min_threshold: Quantity::from_units(threshold),
    })
    .unwrap()
}

pub fn menu_item(id: &str, cents: u64, recipe: &[(&str, u32)]) -> MenuItem {
    MenuItem::new(NewMenuItem {
        id: MenuItemId::new(id).unwrap(),
        name: id.to_string(),
        description: String::new(),
        category: MenuCategory::Coffee,
        price: Money::from_cents(cents),
        available: true,
        ingredients: recipe
            .iter()
            .map(|(ing, qty)| IngredientRequirement::new(ingredient(ing), Quantity::from_units(*qty)))
            .collect(),
    })
    .unwrap()
}

/// latte = 1 espresso_shot + 200 milk; mocha = 1 espresso_shot + 150 milk + 20 cocoa.
pub fn cafe_menu() -> InMemoryMenuCatalog {
    InMemoryMenuCatalog::with_items([
        menu_item("latte", 450, &[("espresso_shot", 1), ("milk", 200)]),
        menu_item("mocha", 500, &[("espresso_shot", 1), ("milk", 150), ("cocoa", 20)]),
    ])
}

/// 10 shots, 1000 milk, 100 cocoa.
pub fn cafe_stock() -> InMemoryInventoryStore {
    InMemoryInventoryStore::with_items([
        stock("espresso_shot", "Espresso Shot", 10, "shot", 2),
        stock("milk", "Whole Milk", 1000, "ml", 200),
        stock("cocoa", "Cocoa Powder", 100, "g", 10),
    ])
}

pub fn request(customer: &str, lines: &[(&str, i64)]) -> OrderRequest {
    OrderRequest::new(
        customer,
        lines
            .iter()
            .map(|(id, qty)| OrderLineRequest::new(MenuItemId::new(*id).unwrap(), *qty))
            .collect(),
    )
}

pub async fn quantity_of<I: InventoryStore>(store: &I, id: &str) -> Quantity {
    store.get(&ingredient(id)).await.unwrap().quantity()
}

/// How a [`FlakyInventoryStore`] misbehaves for one ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockFault {
    /// Every adjustment fails.
    Fail,
    /// Restores fail; consumes work.
    FailRestore,
    /// Apply, then take longer than the caller's deadline.
    StallAfterApply(Duration),
    /// Stall past the deadline without applying anything.
    StallWithoutApply(Duration),
    /// Apply, stall past the deadline, and fail every later read of the ingredient.
    StallAfterApplyUnreadable(Duration),
}

pub struct FlakyInventoryStore {
    inner: Arc<InMemoryInventoryStore>,
    faults: Mutex<HashMap<IngredientId, StockFault>>,
    unreadable: Mutex<HashSet<IngredientId>>,
}

impl FlakyInventoryStore {
    pub fn new(inner: Arc<InMemoryInventoryStore>) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
            unreadable: Mutex::new(HashSet::new()),
        }
    }

    pub fn inject(&self, id: &str, fault: StockFault) {
        self.faults.lock().unwrap().insert(ingredient(id), fault);
    }

    fn fault_for(&self, id: &IngredientId) -> Option<StockFault> {
        self.faults.lock().unwrap().get(id).copied()
    }
}

#[async_trait]
impl InventoryStore for FlakyInventoryStore {
    async fn get(&self, id: &IngredientId) -> Result<InventoryItem, StoreError> {
        if self.unreadable.lock().unwrap().contains(id) {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<InventoryItem>, StoreError> {
        self.inner.list().await
    }

    async fn conditional_adjust(
        &self,
        id: &IngredientId,
        adjustment: StockAdjustment,
    ) -> Result<Quantity, StoreError> {
        match (self.fault_for(id), adjustment) {
            (Some(StockFault::Fail), _) | (Some(StockFault::FailRestore), StockAdjustment::Restore(_)) => {
                Err(StoreError::Backend(format!("injected failure for '{id}'")))
            }
            (Some(StockFault::StallAfterApply(delay)), _) => {
                let result = self.inner.conditional_adjust(id, adjustment).await;
                tokio::time::sleep(delay).await;
                result
            }
            (Some(StockFault::StallAfterApplyUnreadable(delay)), _) => {
                let result = self.inner.conditional_adjust(id, adjustment).await;
                self.unreadable.lock().unwrap().insert(id.clone());
                tokio::time::sleep(delay).await;
                result
            }
            (Some(StockFault::StallWithoutApply(delay)), _) => {
                tokio::time::sleep(delay).await;
                Err(StoreError::Backend("stalled call was abandoned".to_string()))
            }
            _ => self.inner.conditional_adjust(id, adjustment).await,
        }
    }
}

/// Wraps an order store and fails, stalls, or degrades selected operations on demand.
pub struct FlakyOrderStore {
    inner: Arc<InMemoryOrderStore>,
    pub fail_insert: AtomicBool,
    pub fail_insert_many: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Stored timestamps lose everything below the millisecond.
    pub millisecond_timestamps: AtomicBool,
    stall_after_write: Mutex<Option<Duration>>,
    stall_without_write: Mutex<Option<Duration>>,
    failing_gets: AtomicUsize,
}

impl FlakyOrderStore {
    pub fn new(inner: Arc<InMemoryOrderStore>) -> Self {
        Self {
            inner,
            fail_insert: AtomicBool::new(false),
            fail_insert_many: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            millisecond_timestamps: AtomicBool::new(false),
            stall_after_write: Mutex::new(None),
            stall_without_write: Mutex::new(None),
            failing_gets: AtomicUsize::new(0),
        }
    }

    /// Writes land, then the call hangs for `delay`.
    pub fn stall_after_write(&self, delay: Duration) {
        *self.stall_after_write.lock().unwrap() = Some(delay);
    }

    /// Writes hang for `delay` and never land.
    pub fn stall_without_write(&self, delay: Duration) {
        *self.stall_without_write.lock().unwrap() = Some(delay);
    }

    /// The next `n` reads fail with a backend error.
    pub fn fail_next_gets(&self, n: usize) {
        self.failing_gets.store(n, Ordering::SeqCst);
    }

    async fn write<F>(&self, flag: &AtomicBool, operation: &str, call: F) -> Result<(), StoreError>
    where
        F: Future<Output = Result<(), StoreError>>,
    {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("injected {operation} failure")));
        }
        let without_write = *self.stall_without_write.lock().unwrap();
        if let Some(delay) = without_write {
            tokio::time::sleep(delay).await;
            return Err(StoreError::Backend(format!("stalled {operation} was abandoned")));
        }
        let result = call.await;
        let after_write = *self.stall_after_write.lock().unwrap();
        if let Some(delay) = after_write {
            tokio::time::sleep(delay).await;
        }
        result
    }

    fn stored_form(&self, order: &Order) -> Order {
        if !self.millisecond_timestamps.load(Ordering::SeqCst) {
            return order.clone();
        }
        let mut snapshot = OrderSnapshot::from(order.clone());
        snapshot.created_at = snapshot.created_at.trunc_subsecs(3);
        snapshot.updated_at = snapshot.updated_at.trunc_subsecs(3);
        Order::try_from(snapshot).unwrap()
    }
}

#[async_trait]
impl OrderStore for FlakyOrderStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let stored = self.stored_form(order);
        self.write(&self.fail_insert, "insert", self.inner.insert(&stored))
            .await
    }

    async fn insert_many(&self, orders: &[Order]) -> Result<(), StoreError> {
        let stored: Vec<Order> = orders.iter().map(|o| self.stored_form(o)).collect();
        self.write(&self.fail_insert_many, "insert_many", self.inner.insert_many(&stored))
            .await
    }

    async fn update(&self, order: &Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        let stored = self.stored_form(order);
        self.write(&self.fail_update, "update", self.inner.update(&stored, expected))
            .await
    }

    async fn delete(&self, id: OrderId) -> Result<(), StoreError> {
        self.write(&self.fail_delete, "delete", self.inner.delete(id))
            .await
    }

    async fn get(&self, id: OrderId) -> Result<Order, StoreError> {
        let failing = self
            .failing_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Order>, StoreError> {
        self.inner.list().await
    }
}

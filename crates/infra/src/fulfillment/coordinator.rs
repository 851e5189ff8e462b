use chrono::Utc;
use tracing::{info, instrument, warn};

use hotcoffee_core::{AggregateRoot, ExpectedVersion, OrderId};
use hotcoffee_inventory::{InventoryItem, ReservationPlan};
use hotcoffee_menu::MenuItem;
use hotcoffee_orders::{Order, OrderRequest};

use crate::locks::KeyedLocks;
use crate::saga::{Saga, compensate};
use crate::store::{InventoryStore, MenuCatalog, OrderStore, StoreError};

use super::error::{FulfillmentError, Missing};
use super::ledger::{InventoryLedger, LedgerSession};
use super::planner::ReservationPlanner;
use super::{FulfillmentConfig, with_timeout};

/// Owns every operation that changes an order together with its reservation.
///
/// ## Concurrency
///
/// - per-ingredient locks (via the ledger) serialize check-and-consume
/// - a per-order lock serializes update / delete / close of the same order
/// - the order lock is always taken before ingredient locks
pub struct OrderFulfillmentCoordinator<M, I, O> {
    planner: ReservationPlanner<M>,
    ledger: InventoryLedger<I>,
    orders: O,
    order_locks: KeyedLocks<OrderId>,
    config: FulfillmentConfig,
}

impl<M, I, O> OrderFulfillmentCoordinator<M, I, O>
where
    M: MenuCatalog,
    I: InventoryStore,
    O: OrderStore,
{
    pub fn new(menu: M, inventory: I, orders: O, config: FulfillmentConfig) -> Self {
        Self {
            planner: ReservationPlanner::new(menu, config),
            ledger: InventoryLedger::new(inventory, config),
            orders,
            order_locks: KeyedLocks::new(),
            config,
        }
    }

    pub fn planner(&self) -> &ReservationPlanner<M> {
        &self.planner
    }

    pub fn ledger(&self) -> &InventoryLedger<I> {
        &self.ledger
    }

    /// Validate, price, reserve inventory, and store a new pending order.
    #[instrument(skip(self, request), fields(order_id = tracing::field::Empty), err)]
    pub async fn create_order(&self, request: &OrderRequest) -> Result<Order, FulfillmentError> {
        let validated = request.validate()?;
        let priced = self.planner.price(&validated.lines).await?;
        let plan = priced.plan;
        let order = Order::place(
            OrderId::new(),
            validated.customer_name,
            priced.items,
            plan.clone(),
            Utc::now(),
        )?;
        tracing::Span::current().record("order_id", tracing::field::display(order.id_typed()));

        let session = self.ledger.session(plan.ingredients()).await;
        session.check_availability(&plan).await?;

        let mut saga = Saga::new("create_order");
        saga.record("order_id", order.id_typed());
        saga.record("plan", describe(&plan));
        saga.step(
            "reserve_inventory",
            session.consume(&plan),
            compensate(|| release(&session, &plan)),
        )
        .await?;
        saga.run("persist_order", self.insert_verified(&order)).await?;
        saga.commit();

        info!(
            order_id = %order.id_typed(),
            total = %order.total_amount(),
            "order created"
        );
        Ok(order)
    }

    /// Replace an open order's customer and lines, moving its reservation to the new lines.
    #[instrument(skip(self, request), fields(order_id = %id), err)]
    pub async fn update_order(
        &self,
        id: OrderId,
        request: &OrderRequest,
    ) -> Result<Order, FulfillmentError> {
        let validated = request.validate()?;
        let _order_lock = self.order_locks.lock(&id).await;

        let existing = self.load(id).await?;
        if existing.is_closed() {
            return Err(FulfillmentError::ClosedOrderImmutable(id));
        }

        let old_plan = self.held_by(&existing).await?;
        let priced = self.planner.price(&validated.lines).await?;
        let new_plan = priced.plan;
        let revised = existing.revise(
            validated.customer_name,
            priced.items,
            new_plan.clone(),
            Utc::now(),
        )?;

        let session = self
            .ledger
            .session(old_plan.ingredients().chain(new_plan.ingredients()))
            .await;

        let mut saga = Saga::new("update_order");
        saga.record("order_id", id);
        saga.record("previous_plan", describe(&old_plan));
        saga.record("revised_plan", describe(&new_plan));

        saga.step(
            "release_previous",
            session.restore(&old_plan),
            compensate(|| reacquire(&session, &old_plan)),
        )
        .await?;
        if let Err(err) = session.check_availability(&new_plan).await {
            return Err(saga.abort("check_availability", err).await);
        }
        saga.step(
            "reserve_revised",
            session.consume(&new_plan),
            compensate(|| release(&session, &new_plan)),
        )
        .await?;
        saga.run(
            "persist_order",
            self.update_verified(&revised, &existing),
        )
        .await?;
        saga.commit();

        info!(order_id = %id, total = %revised.total_amount(), "order updated");
        Ok(revised)
    }

    /// Release an open order's reservation and remove it.
    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn delete_order(&self, id: OrderId) -> Result<(), FulfillmentError> {
        let _order_lock = self.order_locks.lock(&id).await;

        let existing = self.load(id).await?;
        if existing.is_closed() {
            return Err(FulfillmentError::ClosedOrderImmutable(id));
        }

        let plan = self.held_by(&existing).await?;
        let session = self.ledger.session(plan.ingredients()).await;

        let mut saga = Saga::new("delete_order");
        saga.record("order_id", id);
        saga.record("plan", describe(&plan));
        saga.step(
            "release_reservation",
            session.restore(&plan),
            compensate(|| reacquire(&session, &plan)),
        )
        .await?;
        saga.run("delete_order", self.delete_verified(id)).await?;
        saga.commit();

        info!(order_id = %id, "order deleted");
        Ok(())
    }

    /// Mark an order closed. Its reservation becomes permanent consumption.
    #[instrument(skip(self), fields(order_id = %id), err)]
    pub async fn close_order(&self, id: OrderId) -> Result<Order, FulfillmentError> {
        let _order_lock = self.order_locks.lock(&id).await;

        let existing = self.load(id).await?;
        if existing.is_closed() {
            return Err(FulfillmentError::AlreadyClosed(id));
        }

        let closed = existing.close(Utc::now())?;
        self.update_verified(&closed, &existing).await?;

        info!(order_id = %id, "order closed");
        Ok(closed)
    }

    pub async fn get_order(&self, id: OrderId) -> Result<Order, FulfillmentError> {
        self.load(id).await
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, FulfillmentError> {
        with_timeout(self.config.store_timeout, "list_orders", self.orders.list())
            .await
            .map_err(FulfillmentError::from)
    }

    pub async fn menu(&self) -> Result<Vec<MenuItem>, FulfillmentError> {
        self.planner.resolver().menu().await
    }

    pub async fn inventory(&self) -> Result<Vec<InventoryItem>, FulfillmentError> {
        self.ledger.snapshot().await
    }

    async fn load(&self, id: OrderId) -> Result<Order, FulfillmentError> {
        with_timeout(self.config.store_timeout, "get_order", self.orders.get(id))
            .await
            .map_err(|e| FulfillmentError::persistence(e, || Missing::Order(id)))
    }

    /// Demand held by a stored order.
    ///
    /// Rows written before reservations were recorded carry none; their
    /// demand is recomputed from current recipes.
    async fn held_by(&self, order: &Order) -> Result<ReservationPlan, FulfillmentError> {
        if !order.reservation().is_empty() {
            return Ok(order.reservation().clone());
        }
        warn!(
            order_id = %order.id_typed(),
            "order has no recorded reservation; planning from current recipes"
        );
        self.planner.plan(&order.selections()).await
    }

    /// Store a new order; after a timeout, look it up before deciding.
    async fn insert_verified(&self, order: &Order) -> Result<(), FulfillmentError> {
        let limit = self.config.store_timeout;
        match with_timeout(limit, "insert_order", self.orders.insert(order)).await {
            Err(StoreError::Timeout(msg)) => self.verify_stored(order, None, msg).await,
            other => other.map_err(FulfillmentError::from),
        }
    }

    /// Store a batch in one call. After a timeout the batch counts as stored
    /// only if every order reads back, and as not stored only if none does.
    pub(crate) async fn insert_many_verified(&self, batch: &[Order]) -> Result<(), FulfillmentError> {
        let limit = self.config.store_timeout;
        let msg = match with_timeout(limit, "insert_orders", self.orders.insert_many(batch)).await {
            Err(StoreError::Timeout(msg)) => msg,
            other => return other.map_err(FulfillmentError::from),
        };

        let mut landed = 0;
        for order in batch {
            if self.landed(order, None, &msg).await? {
                landed += 1;
            }
        }
        if landed == batch.len() {
            warn!(orders = landed, %msg, "batch insert landed despite timeout");
            Ok(())
        } else if landed == 0 {
            Err(FulfillmentError::Persistence(StoreError::Timeout(format!(
                "{msg}; batch of {} orders was not written",
                batch.len()
            ))))
        } else {
            Err(FulfillmentError::OutcomeUnknown(format!(
                "{msg}; {landed} of {} batch orders were written",
                batch.len()
            )))
        }
    }

    /// Replace `previous` with `order`, guarded by the previous version.
    async fn update_verified(&self, order: &Order, previous: &Order) -> Result<(), FulfillmentError> {
        let limit = self.config.store_timeout;
        let expected = ExpectedVersion(previous.version());
        match with_timeout(limit, "update_order", self.orders.update(order, expected)).await {
            Err(StoreError::Timeout(msg)) => self.verify_stored(order, Some(previous), msg).await,
            Err(StoreError::NotFound(_)) => Err(FulfillmentError::NotFound(Missing::Order(
                order.id_typed(),
            ))),
            other => other.map_err(FulfillmentError::from),
        }
    }

    async fn delete_verified(&self, id: OrderId) -> Result<(), FulfillmentError> {
        let limit = self.config.store_timeout;
        match with_timeout(limit, "delete_order", self.orders.delete(id)).await {
            Err(StoreError::Timeout(msg)) => {
                match with_timeout(limit, "get_order", self.orders.get(id)).await {
                    Err(StoreError::NotFound(_)) => {
                        warn!(order_id = %id, %msg, "delete landed despite timeout");
                        Ok(())
                    }
                    Ok(_) => Err(FulfillmentError::Persistence(StoreError::Timeout(format!(
                        "{msg}; order {id} was not deleted"
                    )))),
                    Err(err) => Err(FulfillmentError::OutcomeUnknown(format!(
                        "{msg}; order {id} could not be read back ({err})"
                    ))),
                }
            }
            Err(StoreError::NotFound(_)) => Err(FulfillmentError::NotFound(Missing::Order(id))),
            other => other.map_err(FulfillmentError::from),
        }
    }

    /// Settle a timed-out write of `order` by reading it back.
    async fn verify_stored(
        &self,
        order: &Order,
        previous: Option<&Order>,
        msg: String,
    ) -> Result<(), FulfillmentError> {
        let id = order.id_typed();
        if self.landed(order, previous, &msg).await? {
            warn!(order_id = %id, %msg, "order write landed despite timeout");
            Ok(())
        } else {
            Err(FulfillmentError::Persistence(StoreError::Timeout(format!(
                "{msg}; order {id} was not written"
            ))))
        }
    }

    /// `true` if the store holds `order`, `false` if it still holds `previous`
    /// (or nothing, for an insert). Anything else is an unknown outcome.
    async fn landed(
        &self,
        order: &Order,
        previous: Option<&Order>,
        msg: &str,
    ) -> Result<bool, FulfillmentError> {
        let id = order.id_typed();
        match with_timeout(self.config.store_timeout, "get_order", self.orders.get(id)).await {
            Ok(stored) if stored.same_revision(order) => Ok(true),
            Ok(stored) if previous.is_some_and(|p| stored.same_revision(p)) => Ok(false),
            Err(StoreError::NotFound(_)) if previous.is_none() => Ok(false),
            Ok(stored) => Err(FulfillmentError::OutcomeUnknown(format!(
                "{msg}; order {id} holds unexpected version {}",
                stored.version()
            ))),
            Err(err) => Err(FulfillmentError::OutcomeUnknown(format!(
                "{msg}; order {id} could not be read back ({err})"
            ))),
        }
    }
}

async fn release<I: InventoryStore>(
    session: &LedgerSession<'_, I>,
    plan: &ReservationPlan,
) -> Result<(), FulfillmentError> {
    session.restore(plan).await.map(drop)
}

async fn reacquire<I: InventoryStore>(
    session: &LedgerSession<'_, I>,
    plan: &ReservationPlan,
) -> Result<(), FulfillmentError> {
    session.consume(plan).await.map(drop)
}

fn describe(plan: &ReservationPlan) -> String {
    serde_json::to_string(plan).unwrap_or_else(|e| format!("<unserializable: {e}>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use hotcoffee_core::{Money, Quantity};
    use hotcoffee_orders::OrderStatus;

    use crate::store::{InMemoryInventoryStore, InMemoryMenuCatalog, InMemoryOrderStore};
    use crate::testing::{
        FlakyInventoryStore, FlakyOrderStore, StockFault, cafe_menu, cafe_stock, quantity_of,
        request,
    };

    type Coordinator = OrderFulfillmentCoordinator<
        InMemoryMenuCatalog,
        Arc<InMemoryInventoryStore>,
        Arc<InMemoryOrderStore>,
    >;

    fn coordinator() -> (Coordinator, Arc<InMemoryInventoryStore>, Arc<InMemoryOrderStore>) {
        let inventory = Arc::new(cafe_stock());
        let orders = Arc::new(InMemoryOrderStore::new());
        let coordinator = OrderFulfillmentCoordinator::new(
            cafe_menu(),
            Arc::clone(&inventory),
            Arc::clone(&orders),
            FulfillmentConfig::default(),
        );
        (coordinator, inventory, orders)
    }

    type FlakyCoordinator = OrderFulfillmentCoordinator<
        InMemoryMenuCatalog,
        Arc<InMemoryInventoryStore>,
        Arc<FlakyOrderStore>,
    >;

    /// Store calls time out after 30 ms.
    fn flaky_coordinator() -> (
        FlakyCoordinator,
        Arc<InMemoryInventoryStore>,
        Arc<FlakyOrderStore>,
        Arc<InMemoryOrderStore>,
    ) {
        let inventory = Arc::new(cafe_stock());
        let inner = Arc::new(InMemoryOrderStore::new());
        let orders = Arc::new(FlakyOrderStore::new(Arc::clone(&inner)));
        let coordinator = OrderFulfillmentCoordinator::new(
            cafe_menu(),
            Arc::clone(&inventory),
            Arc::clone(&orders),
            FulfillmentConfig {
                store_timeout: Duration::from_millis(30),
            },
        );
        (coordinator, inventory, orders, inner)
    }

    #[tokio::test]
    async fn create_reserves_prices_and_stores() {
        let (coordinator, inventory, orders) = coordinator();

        let order = coordinator
            .create_order(&request("Alice", &[("latte", 2)]))
            .await
            .unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.total_amount(), Money::from_cents(900));
        assert_eq!(quantity_of(&inventory, "espresso_shot").await, Quantity::from_units(8));
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(600));
        assert_eq!(orders.len(), 1);
        assert_eq!(
            order.reservation().get(&crate::testing::ingredient("milk")),
            Some(Quantity::from_units(400))
        );
    }

    #[tokio::test]
    async fn timed_out_insert_is_verified_despite_coarser_timestamps() {
        let (coordinator, inventory, orders, inner) = flaky_coordinator();
        orders.millisecond_timestamps.store(true, Ordering::SeqCst);
        orders.stall_after_write(Duration::from_millis(200));

        let order = coordinator
            .create_order(&request("Alice", &[("latte", 1)]))
            .await
            .unwrap();

        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(800));
        assert!(inner.get(order.id_typed()).await.unwrap().same_revision(&order));
    }

    #[tokio::test]
    async fn unreadable_insert_after_timeout_keeps_the_reservation() {
        let (coordinator, inventory, orders, inner) = flaky_coordinator();
        orders.stall_after_write(Duration::from_millis(200));
        orders.fail_next_gets(1);

        let err = coordinator
            .create_order(&request("Alice", &[("latte", 1)]))
            .await
            .unwrap_err();

        match &err {
            FulfillmentError::CompensationFailure(report) => {
                assert_eq!(report.failed_step, "persist_order");
                assert!(report.compensated.is_empty());
                assert_eq!(report.failed_compensations[0].step, "reserve_inventory");
                assert!(report.context["plan"].contains("milk"));
            }
            other => panic!("expected CompensationFailure, got {other:?}"),
        }
        assert!(!err.is_clean());
        // The order landed, so its stock stays consumed.
        assert_eq!(inner.len(), 1);
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(800));
    }

    #[tokio::test]
    async fn timed_out_insert_that_never_landed_restores_inventory() {
        let (coordinator, inventory, orders, inner) = flaky_coordinator();
        orders.stall_without_write(Duration::from_millis(200));

        let err = coordinator
            .create_order(&request("Alice", &[("latte", 1)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            FulfillmentError::Persistence(StoreError::Timeout(msg)) if msg.contains("not written")
        ));
        assert!(inner.is_empty());
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(1000));
    }

    #[tokio::test]
    async fn timed_out_update_that_never_landed_restores_the_original_reservation() {
        let (coordinator, inventory, orders, inner) = flaky_coordinator();
        let order = coordinator
            .create_order(&request("Alice", &[("latte", 1)]))
            .await
            .unwrap();

        orders.stall_without_write(Duration::from_millis(200));
        let err = coordinator
            .update_order(order.id_typed(), &request("Alice", &[("mocha", 2)]))
            .await
            .unwrap_err();

        assert!(matches!(err, FulfillmentError::Persistence(StoreError::Timeout(_))));
        assert_eq!(inner.get(order.id_typed()).await.unwrap(), order);
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(800));
        assert_eq!(quantity_of(&inventory, "cocoa").await, Quantity::from_units(100));
    }

    #[tokio::test]
    async fn insufficient_inventory_changes_nothing() {
        let (coordinator, inventory, orders) = coordinator();

        let err = coordinator
            .create_order(&request("Bob", &[("latte", 6)]))
            .await
            .unwrap_err();

        match err {
            FulfillmentError::InsufficientInventory { shortfalls } => {
                assert_eq!(shortfalls.len(), 1);
                assert_eq!(shortfalls[0].ingredient_id.as_str(), "milk");
                assert_eq!(shortfalls[0].needed, Quantity::from_units(1200));
            }
            other => panic!("expected InsufficientInventory, got {other:?}"),
        }
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(1000));
        assert!(orders.is_empty());
    }

    #[tokio::test]
    async fn invalid_requests_fail_before_any_lookup() {
        let (coordinator, _, _) = coordinator();
        let err = coordinator
            .create_order(&request("", &[("latte", 1)]))
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(msg) if msg == "customer name is required"));
    }

    #[tokio::test]
    async fn failed_insert_restores_inventory() {
        let inventory = Arc::new(cafe_stock());
        let orders = Arc::new(FlakyOrderStore::new(Arc::new(InMemoryOrderStore::new())));
        orders.fail_insert.store(true, Ordering::SeqCst);
        let coordinator = OrderFulfillmentCoordinator::new(
            cafe_menu(),
            Arc::clone(&inventory),
            Arc::clone(&orders),
            FulfillmentConfig::default(),
        );

        let err = coordinator
            .create_order(&request("Carol", &[("mocha", 1)]))
            .await
            .unwrap_err();

        assert!(matches!(err, FulfillmentError::Persistence(StoreError::Backend(_))));
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(1000));
        assert_eq!(quantity_of(&inventory, "cocoa").await, Quantity::from_units(100));
    }

    #[tokio::test]
    async fn update_moves_the_reservation() {
        let (coordinator, inventory, _) = coordinator();
        let order = coordinator
            .create_order(&request("Alice", &[("latte", 2)]))
            .await
            .unwrap();

        let revised = coordinator
            .update_order(order.id_typed(), &request("Alice", &[("mocha", 1)]))
            .await
            .unwrap();

        assert_eq!(revised.version(), 2);
        assert_eq!(revised.created_at(), order.created_at());
        assert_eq!(quantity_of(&inventory, "espresso_shot").await, Quantity::from_units(9));
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(850));
        assert_eq!(quantity_of(&inventory, "cocoa").await, Quantity::from_units(80));
    }

    #[tokio::test]
    async fn update_may_reuse_its_own_reservation() {
        let (coordinator, inventory, _) = coordinator();
        // 1000 milk: the first order holds 1000, so only its own release can fund the update.
        let order = coordinator
            .create_order(&request("Alice", &[("latte", 5)]))
            .await
            .unwrap();

        coordinator
            .update_order(order.id_typed(), &request("Alice", &[("latte", 4), ("mocha", 1)]))
            .await
            .unwrap();
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(50));
    }

    #[tokio::test]
    async fn rejected_update_restores_original_reservation() {
        let (coordinator, inventory, orders) = coordinator();
        let order = coordinator
            .create_order(&request("Alice", &[("latte", 2)]))
            .await
            .unwrap();

        let err = coordinator
            .update_order(order.id_typed(), &request("Alice", &[("latte", 6)]))
            .await
            .unwrap_err();

        assert!(matches!(err, FulfillmentError::InsufficientInventory { .. }));
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(600));
        assert_eq!(orders.get(order.id_typed()).await.unwrap(), order);
    }

    #[tokio::test]
    async fn failed_update_persist_restores_original_reservation() {
        let inventory = Arc::new(cafe_stock());
        let orders = Arc::new(FlakyOrderStore::new(Arc::new(InMemoryOrderStore::new())));
        let coordinator = OrderFulfillmentCoordinator::new(
            cafe_menu(),
            Arc::clone(&inventory),
            Arc::clone(&orders),
            FulfillmentConfig::default(),
        );
        let order = coordinator
            .create_order(&request("Alice", &[("latte", 2)]))
            .await
            .unwrap();

        orders.fail_update.store(true, Ordering::SeqCst);
        let err = coordinator
            .update_order(order.id_typed(), &request("Alice", &[("mocha", 3)]))
            .await
            .unwrap_err();

        assert!(matches!(err, FulfillmentError::Persistence(_)));
        assert_eq!(quantity_of(&inventory, "espresso_shot").await, Quantity::from_units(8));
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(600));
        assert_eq!(quantity_of(&inventory, "cocoa").await, Quantity::from_units(100));
    }

    #[tokio::test]
    async fn failed_rollback_surfaces_compensation_failure() {
        let store = Arc::new(cafe_stock());
        let inventory = Arc::new(FlakyInventoryStore::new(Arc::clone(&store)));
        let orders = Arc::new(FlakyOrderStore::new(Arc::new(InMemoryOrderStore::new())));
        orders.fail_insert.store(true, Ordering::SeqCst);
        let coordinator = OrderFulfillmentCoordinator::new(
            cafe_menu(),
            Arc::clone(&inventory),
            Arc::clone(&orders),
            FulfillmentConfig::default(),
        );
        inventory.inject("milk", StockFault::FailRestore);

        let err = coordinator
            .create_order(&request("Dana", &[("latte", 1)]))
            .await
            .unwrap_err();

        match err {
            FulfillmentError::CompensationFailure(report) => {
                assert_eq!(report.saga, "create_order");
                assert_eq!(report.failed_step, "persist_order");
                assert!(report.context.contains_key("order_id"));
                assert!(report.context["plan"].contains("milk"));
            }
            other => panic!("expected CompensationFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn delete_releases_reservation() {
        let (coordinator, inventory, orders) = coordinator();
        let order = coordinator
            .create_order(&request("Eve", &[("mocha", 2)]))
            .await
            .unwrap();

        coordinator.delete_order(order.id_typed()).await.unwrap();

        assert_eq!(quantity_of(&inventory, "cocoa").await, Quantity::from_units(100));
        assert!(orders.is_empty());
        assert!(matches!(
            coordinator.delete_order(order.id_typed()).await,
            Err(FulfillmentError::NotFound(Missing::Order(_)))
        ));
    }

    #[tokio::test]
    async fn failed_delete_reacquires_reservation() {
        let inventory = Arc::new(cafe_stock());
        let orders = Arc::new(FlakyOrderStore::new(Arc::new(InMemoryOrderStore::new())));
        let coordinator = OrderFulfillmentCoordinator::new(
            cafe_menu(),
            Arc::clone(&inventory),
            Arc::clone(&orders),
            FulfillmentConfig::default(),
        );
        let order = coordinator
            .create_order(&request("Eve", &[("latte", 1)]))
            .await
            .unwrap();

        orders.fail_delete.store(true, Ordering::SeqCst);
        assert!(coordinator.delete_order(order.id_typed()).await.is_err());
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(800));
        assert!(coordinator.get_order(order.id_typed()).await.is_ok());
    }

    #[tokio::test]
    async fn closed_orders_are_terminal() {
        let (coordinator, inventory, _) = coordinator();
        let order = coordinator
            .create_order(&request("Frank", &[("latte", 1)]))
            .await
            .unwrap();

        let closed = coordinator.close_order(order.id_typed()).await.unwrap();
        assert!(closed.is_closed());

        assert!(matches!(
            coordinator.close_order(order.id_typed()).await,
            Err(FulfillmentError::AlreadyClosed(_))
        ));
        assert!(matches!(
            coordinator
                .update_order(order.id_typed(), &request("Frank", &[("latte", 2)]))
                .await,
            Err(FulfillmentError::ClosedOrderImmutable(_))
        ));
        assert!(matches!(
            coordinator.delete_order(order.id_typed()).await,
            Err(FulfillmentError::ClosedOrderImmutable(_))
        ));
        // Closing keeps the consumption permanent.
        assert_eq!(quantity_of(&inventory, "milk").await, Quantity::from_units(800));
    }

    #[tokio::test]
    async fn missing_order_is_not_found() {
        let (coordinator, _, _) = coordinator();
        let id = OrderId::new();
        assert!(matches!(
            coordinator.close_order(id).await,
            Err(FulfillmentError::NotFound(Missing::Order(found))) if found == id
        ));
        assert!(matches!(
            coordinator.update_order(id, &request("Gus", &[("latte", 1)])).await,
            Err(FulfillmentError::NotFound(Missing::Order(_)))
        ));
    }
}

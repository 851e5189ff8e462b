//! All-or-nothing admission of a group of orders.
//!
//! A batch is planned as one combined reservation, checked once, and consumed
//! once under a single lock set covering every ingredient any order touches.
//! Either every order is admitted or none is.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, instrument, warn};

use hotcoffee_core::{IngredientId, Money, OrderId, Quantity};
use hotcoffee_inventory::{ReservationPlan, Shortfall};
use hotcoffee_orders::{Order, OrderRequest};

use crate::store::{InventoryStore, MenuCatalog, OrderStore};

use super::coordinator::OrderFulfillmentCoordinator;
use super::error::FulfillmentError;
use super::ledger::LedgerEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionStatus {
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    InsufficientInventory,
    ProcessingError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOrderOutcome {
    /// Set only for accepted orders.
    pub order_id: Option<OrderId>,
    pub customer_name: String,
    pub status: AdmissionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
    pub total: Money,
}

/// Net consumption of one ingredient by an admitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryUpdate {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub quantity_used: Quantity,
    pub remaining: Quantity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total_orders: usize,
    pub accepted: usize,
    pub rejected: usize,
    /// Revenue of accepted orders only.
    pub total_revenue: Money,
    pub inventory_updates: Vec<InventoryUpdate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shortfalls: Vec<Shortfall>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub processed_orders: Vec<BatchOrderOutcome>,
    pub summary: BatchSummary,
}

impl BatchResult {
    fn accepted(orders: &[Order], entries: Vec<LedgerEntry>) -> Result<Self, FulfillmentError> {
        let total_revenue = sum_totals(orders)?;
        let processed_orders = orders
            .iter()
            .map(|order| BatchOrderOutcome {
                order_id: Some(order.id_typed()),
                customer_name: order.customer_name().to_string(),
                status: AdmissionStatus::Accepted,
                reason: None,
                total: order.total_amount(),
            })
            .collect();
        let inventory_updates = entries
            .into_iter()
            .map(|entry| InventoryUpdate {
                quantity_used: entry.adjustment.amount(),
                ingredient_id: entry.ingredient_id,
                name: entry.name,
                remaining: entry.remaining,
            })
            .collect();

        Ok(Self {
            processed_orders,
            summary: BatchSummary {
                total_orders: orders.len(),
                accepted: orders.len(),
                rejected: 0,
                total_revenue,
                inventory_updates,
                shortfalls: Vec::new(),
            },
        })
    }

    fn rejected(orders: &[Order], reason: RejectionReason, shortfalls: Vec<Shortfall>) -> Self {
        let processed_orders = orders
            .iter()
            .map(|order| BatchOrderOutcome {
                order_id: None,
                customer_name: order.customer_name().to_string(),
                status: AdmissionStatus::Rejected,
                reason: Some(reason),
                total: order.total_amount(),
            })
            .collect();

        Self {
            processed_orders,
            summary: BatchSummary {
                total_orders: orders.len(),
                accepted: 0,
                rejected: orders.len(),
                total_revenue: Money::ZERO,
                inventory_updates: Vec::new(),
                shortfalls,
            },
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.summary.rejected == 0
    }
}

fn sum_totals(orders: &[Order]) -> Result<Money, FulfillmentError> {
    orders.iter().try_fold(Money::ZERO, |acc, order| {
        acc.checked_add(order.total_amount()).ok_or_else(|| {
            FulfillmentError::Validation("batch revenue exceeds the representable range".into())
        })
    })
}

/// Orders may be stored while stock was not consumed; report them for repair.
fn partially_applied(
    orders: &[Order],
    plan: ReservationPlan,
    cause: FulfillmentError,
) -> FulfillmentError {
    let order_ids: Vec<OrderId> = orders.iter().map(Order::id_typed).collect();
    error!(
        error = %cause,
        orders = ?order_ids,
        plan = ?plan,
        "batch orders may be stored but inventory was not consumed"
    );
    FulfillmentError::BatchPartiallyApplied {
        order_ids,
        plan,
        cause: Box::new(cause),
    }
}

/// Admits batches through the same planner, ledger and lock registry as
/// single-order operations.
pub struct BatchAdmissionController<M, I, O> {
    coordinator: Arc<OrderFulfillmentCoordinator<M, I, O>>,
}

impl<M, I, O> Clone for BatchAdmissionController<M, I, O> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
        }
    }
}

impl<M, I, O> BatchAdmissionController<M, I, O>
where
    M: MenuCatalog,
    I: InventoryStore,
    O: OrderStore,
{
    pub fn new(coordinator: Arc<OrderFulfillmentCoordinator<M, I, O>>) -> Self {
        Self { coordinator }
    }

    /// Admit every order in `requests`, or none of them.
    ///
    /// Invalid input fails the whole call with [`FulfillmentError::InvalidBatchOrder`].
    /// A batch that does not fit in stock is an `Ok` result with every order
    /// rejected.
    #[instrument(skip(self, requests), fields(order_count = requests.len()), err)]
    pub async fn process_batch(
        &self,
        requests: &[OrderRequest],
    ) -> Result<BatchResult, FulfillmentError> {
        if requests.is_empty() {
            return Err(FulfillmentError::Validation(
                "no orders provided for processing".into(),
            ));
        }

        let (orders, plan) = self.prepare(requests).await?;

        let ledger = self.coordinator.ledger();
        let session = ledger.session(plan.ingredients()).await;

        match session.check_availability(&plan).await {
            Ok(()) => {}
            Err(FulfillmentError::InsufficientInventory { shortfalls }) => {
                info!(
                    order_count = orders.len(),
                    shortfalls = shortfalls.len(),
                    "batch rejected: insufficient inventory"
                );
                return Ok(BatchResult::rejected(
                    &orders,
                    RejectionReason::InsufficientInventory,
                    shortfalls,
                ));
            }
            Err(other) => return Err(other),
        }

        match self.coordinator.insert_many_verified(&orders).await {
            Ok(()) => {}
            Err(cause @ FulfillmentError::OutcomeUnknown(_)) => {
                return Err(partially_applied(&orders, plan, cause));
            }
            Err(err) => {
                warn!(error = %err, "batch rejected: orders could not be stored");
                return Ok(BatchResult::rejected(
                    &orders,
                    RejectionReason::ProcessingError,
                    Vec::new(),
                ));
            }
        }

        let entries = match session.consume(&plan).await {
            Ok(entries) => entries,
            Err(cause) => return Err(partially_applied(&orders, plan, cause)),
        };

        let result = BatchResult::accepted(&orders, entries)?;
        info!(
            accepted = result.summary.accepted,
            revenue = %result.summary.total_revenue,
            "batch admitted"
        );
        Ok(result)
    }

    /// Validate and price every request, folding their demand into one plan.
    async fn prepare(
        &self,
        requests: &[OrderRequest],
    ) -> Result<(Vec<Order>, ReservationPlan), FulfillmentError> {
        let invalid = |index: usize, source: FulfillmentError| FulfillmentError::InvalidBatchOrder {
            index,
            source: Box::new(source),
        };

        let now = Utc::now();
        let mut orders = Vec::with_capacity(requests.len());
        let mut combined = ReservationPlan::new();

        for (index, request) in requests.iter().enumerate() {
            let validated = request.validate().map_err(|e| invalid(index, e.into()))?;
            let priced = self
                .coordinator
                .planner()
                .price(&validated.lines)
                .await
                .map_err(|e| invalid(index, e))?;
            combined
                .merge(&priced.plan)
                .map_err(|e| invalid(index, e.into()))?;
            let order = Order::place(
                OrderId::new(),
                validated.customer_name,
                priced.items,
                priced.plan,
                now,
            )
            .map_err(|e| invalid(index, e.into()))?;
            orders.push(order);
        }

        Ok((orders, combined))
    }
}

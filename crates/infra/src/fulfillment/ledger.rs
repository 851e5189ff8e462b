//! Inventory ledger: the only writer of ingredient stock.
//!
//! All mutation goes through a [`LedgerSession`], which holds the
//! per-ingredient locks for every ingredient it may touch. Within a session:
//!
//! - `check_availability` reports every shortfall and changes nothing
//! - `consume` / `restore` are all-or-nothing: if one ingredient fails, the
//!   ones already adjusted are reverted before the error is returned
//!
//! A consume that the store rejects after a successful availability check is
//! a [`FulfillmentError::LedgerInvariant`]: the locks make it impossible in a
//! correct deployment.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, instrument, warn};

use hotcoffee_core::{IngredientId, Quantity};
use hotcoffee_inventory::{InventoryItem, ReservationPlan, StockAdjustment};

use crate::locks::{KeyedLocks, LockSet};
use crate::store::{InventoryStore, StoreError};

use super::error::{CompensationReport, FailedCompensation, FulfillmentError, Missing};
use super::{FulfillmentConfig, with_timeout};

/// One applied stock adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub ingredient_id: IngredientId,
    pub name: String,
    pub adjustment: StockAdjustment,
    pub remaining: Quantity,
}

pub struct InventoryLedger<I> {
    store: I,
    locks: KeyedLocks<IngredientId>,
    store_timeout: Duration,
}

/// Locked view over a set of ingredients.
pub struct LedgerSession<'l, I> {
    ledger: &'l InventoryLedger<I>,
    locks: LockSet<IngredientId>,
}

impl<I: InventoryStore> InventoryLedger<I> {
    pub fn new(store: I, config: FulfillmentConfig) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            store_timeout: config.store_timeout,
        }
    }

    pub fn store(&self) -> &I {
        &self.store
    }

    /// Lock `ingredients` (ascending order) for the lifetime of the session.
    pub async fn session<'k, K>(&self, ingredients: K) -> LedgerSession<'_, I>
    where
        K: IntoIterator<Item = &'k IngredientId>,
    {
        LedgerSession {
            ledger: self,
            locks: self.locks.lock_all(ingredients).await,
        }
    }

    pub async fn check_availability(&self, plan: &ReservationPlan) -> Result<(), FulfillmentError> {
        self.session(plan.ingredients())
            .await
            .check_availability(plan)
            .await
    }

    /// Consume without a prior check. Callers normally use [`Self::reserve`].
    pub async fn consume(&self, plan: &ReservationPlan) -> Result<Vec<LedgerEntry>, FulfillmentError> {
        self.session(plan.ingredients()).await.consume(plan).await
    }

    pub async fn restore(&self, plan: &ReservationPlan) -> Result<Vec<LedgerEntry>, FulfillmentError> {
        self.session(plan.ingredients()).await.restore(plan).await
    }

    /// Check and consume under one lock acquisition.
    pub async fn reserve(&self, plan: &ReservationPlan) -> Result<Vec<LedgerEntry>, FulfillmentError> {
        let session = self.session(plan.ingredients()).await;
        session.check_availability(plan).await?;
        session.consume(plan).await
    }

    pub async fn stock(&self, id: &IngredientId) -> Result<InventoryItem, FulfillmentError> {
        with_timeout(self.store_timeout, "get_inventory_item", self.store.get(id))
            .await
            .map_err(|e| FulfillmentError::persistence(e, || Missing::Ingredient(id.clone())))
    }

    /// Every stock record, sorted by ingredient id.
    pub async fn snapshot(&self) -> Result<Vec<InventoryItem>, FulfillmentError> {
        with_timeout(self.store_timeout, "list_inventory", self.store.list())
            .await
            .map_err(FulfillmentError::from)
    }

    /// Items at or below their reorder threshold.
    pub async fn low_stock(&self) -> Result<Vec<InventoryItem>, FulfillmentError> {
        Ok(self
            .snapshot()
            .await?
            .into_iter()
            .filter(InventoryItem::is_low_stock)
            .collect())
    }
}

impl<I: InventoryStore> LedgerSession<'_, I> {
    pub fn covers(&self, id: &IngredientId) -> bool {
        self.locks.covers(id)
    }

    pub async fn stock(&self, id: &IngredientId) -> Result<InventoryItem, FulfillmentError> {
        self.ledger.stock(id).await
    }

    /// Succeeds only if every ingredient covers its demand; otherwise lists all shortfalls.
    #[instrument(skip(self, plan), fields(ingredients = plan.len()), err)]
    pub async fn check_availability(&self, plan: &ReservationPlan) -> Result<(), FulfillmentError> {
        self.ensure_covered(plan)?;

        let mut shortfalls = Vec::new();
        for (id, needed) in plan.iter() {
            let item = self.stock(id).await?;
            if let Some(shortfall) = item.shortfall(needed) {
                shortfalls.push(shortfall);
            }
        }

        if shortfalls.is_empty() {
            Ok(())
        } else {
            Err(FulfillmentError::InsufficientInventory { shortfalls })
        }
    }

    #[instrument(skip(self, plan), fields(ingredients = plan.len()), err)]
    pub async fn consume(&self, plan: &ReservationPlan) -> Result<Vec<LedgerEntry>, FulfillmentError> {
        self.apply_all(plan, StockAdjustment::Consume).await
    }

    #[instrument(skip(self, plan), fields(ingredients = plan.len()), err)]
    pub async fn restore(&self, plan: &ReservationPlan) -> Result<Vec<LedgerEntry>, FulfillmentError> {
        self.apply_all(plan, StockAdjustment::Restore).await
    }

    fn ensure_covered(&self, plan: &ReservationPlan) -> Result<(), FulfillmentError> {
        match plan.ingredients().find(|id| !self.covers(id)) {
            Some(id) => Err(FulfillmentError::LedgerInvariant(format!(
                "ingredient '{id}' is not locked by this session"
            ))),
            None => Ok(()),
        }
    }

    async fn apply_all(
        &self,
        plan: &ReservationPlan,
        adjustment: fn(Quantity) -> StockAdjustment,
    ) -> Result<Vec<LedgerEntry>, FulfillmentError> {
        self.ensure_covered(plan)?;

        let mut applied = Vec::with_capacity(plan.len());
        for (id, amount) in plan.iter() {
            match self.adjust(id, adjustment(amount)).await {
                Ok(entry) => applied.push(entry),
                Err(err) => return Err(self.roll_back(applied, err).await),
            }
        }
        Ok(applied)
    }

    async fn roll_back(&self, applied: Vec<LedgerEntry>, cause: FulfillmentError) -> FulfillmentError {
        if applied.is_empty() {
            return cause;
        }

        let mut failed_compensations = Vec::new();
        for entry in applied.iter().rev() {
            if let Err(err) = self
                .adjust(&entry.ingredient_id, entry.adjustment.inverse())
                .await
            {
                error!(
                    ingredient_id = %entry.ingredient_id,
                    error = %err,
                    "failed to revert stock adjustment"
                );
                failed_compensations.push(FailedCompensation {
                    step: "revert_adjustment",
                    error: format!("{}: {err}", entry.ingredient_id),
                });
            }
        }

        if failed_compensations.is_empty() {
            return cause;
        }

        let mut context = BTreeMap::new();
        context.insert(
            "applied",
            serde_json::to_string(&applied).unwrap_or_else(|e| format!("<unserializable: {e}>")),
        );
        FulfillmentError::CompensationFailure(Box::new(CompensationReport {
            saga: "ledger_adjustment",
            failed_step: "adjust",
            cause: cause.to_string(),
            compensated: Vec::new(),
            failed_compensations,
            context,
        }))
    }

    async fn adjust(
        &self,
        id: &IngredientId,
        adjustment: StockAdjustment,
    ) -> Result<LedgerEntry, FulfillmentError> {
        let before = self.stock(id).await?;
        let call = self.ledger.store.conditional_adjust(id, adjustment);

        match with_timeout(self.ledger.store_timeout, "conditional_adjust", call).await {
            Ok(remaining) => {
                let entry = LedgerEntry {
                    ingredient_id: id.clone(),
                    name: before.name().to_string(),
                    adjustment,
                    remaining,
                };
                self.record(&before, &entry);
                Ok(entry)
            }
            Err(StoreError::Timeout(msg)) => self.verify_after_timeout(&before, adjustment, msg).await,
            Err(StoreError::Conflict(msg)) => match adjustment {
                StockAdjustment::Consume(amount) => Err(FulfillmentError::LedgerInvariant(format!(
                    "consume of {amount} '{id}' rejected while locked: {msg}"
                ))),
                StockAdjustment::Restore(_) => {
                    Err(FulfillmentError::Persistence(StoreError::Conflict(msg)))
                }
            },
            Err(err) => Err(FulfillmentError::persistence(err, || {
                Missing::Ingredient(id.clone())
            })),
        }
    }

    /// Decide what a timed-out adjustment did by re-reading the row.
    async fn verify_after_timeout(
        &self,
        before: &InventoryItem,
        adjustment: StockAdjustment,
        msg: String,
    ) -> Result<LedgerEntry, FulfillmentError> {
        let id = before.id_typed();
        let expected = adjustment.apply_to(before.quantity()).map_err(|e| {
            FulfillmentError::LedgerInvariant(format!("adjustment of '{id}' is not applicable: {e}"))
        })?;

        match self.stock(id).await {
            Ok(now) if now.quantity() == expected => {
                warn!(
                    ingredient_id = %id,
                    %msg,
                    "stock adjustment landed despite timeout"
                );
                let entry = LedgerEntry {
                    ingredient_id: id.clone(),
                    name: before.name().to_string(),
                    adjustment,
                    remaining: expected,
                };
                self.record(before, &entry);
                Ok(entry)
            }
            Ok(now) if now.quantity() == before.quantity() => {
                Err(FulfillmentError::Persistence(StoreError::Timeout(format!(
                    "{msg}; adjustment of '{id}' was not applied"
                ))))
            }
            Ok(now) => Err(FulfillmentError::OutcomeUnknown(format!(
                "{msg}; adjustment of '{id}' may have been applied (was {}, now {})",
                before.quantity(),
                now.quantity()
            ))),
            Err(err) => Err(FulfillmentError::OutcomeUnknown(format!(
                "{msg}; adjustment of '{id}' may have been applied ({err})"
            ))),
        }
    }

    fn record(&self, before: &InventoryItem, entry: &LedgerEntry) {
        debug!(
            ingredient_id = %entry.ingredient_id,
            adjustment = ?entry.adjustment,
            remaining = %entry.remaining,
            "stock adjusted"
        );
        let threshold = before.min_threshold();
        if matches!(entry.adjustment, StockAdjustment::Consume(_))
            && entry.remaining <= threshold
            && before.quantity() > threshold
        {
            warn!(
                ingredient_id = %entry.ingredient_id,
                remaining = %entry.remaining,
                threshold = %threshold,
                "ingredient fell to its reorder threshold"
            );
        }
    }
}

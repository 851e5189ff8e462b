use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use hotcoffee_core::{DomainError, IngredientId, MenuItemId, OrderId};
use hotcoffee_inventory::{ReservationPlan, Shortfall};

use crate::store::StoreError;

/// What a lookup failed to find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    MenuItem(MenuItemId),
    Ingredient(IngredientId),
    Order(OrderId),
    /// Resource named only by a store message.
    Other(String),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::MenuItem(id) => write!(f, "menu item '{id}'"),
            Missing::Ingredient(id) => write!(f, "ingredient '{id}'"),
            Missing::Order(id) => write!(f, "order {id}"),
            Missing::Other(what) => f.write_str(what),
        }
    }
}

/// A compensation that itself failed while unwinding a saga.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedCompensation {
    pub step: &'static str,
    pub error: String,
}

/// Everything an operator needs to repair state by hand after a failed rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompensationReport {
    pub saga: &'static str,
    /// Step whose failure triggered the rollback.
    pub failed_step: &'static str,
    pub cause: String,
    /// Steps whose compensation ran cleanly.
    pub compensated: Vec<&'static str>,
    pub failed_compensations: Vec<FailedCompensation>,
    /// Operation details recorded by the saga (order id, plans, ...).
    pub context: BTreeMap<&'static str, String>,
}

impl fmt::Display for CompensationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "saga '{}' failed at step '{}' ({}) and could not be rolled back: ",
            self.saga, self.failed_step, self.cause
        )?;
        let failed: Vec<String> = self
            .failed_compensations
            .iter()
            .map(|c| format!("{}: {}", c.step, c.error))
            .collect();
        f.write_str(&failed.join("; "))
    }
}

/// Errors returned by the fulfillment engine.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(Missing),

    /// No inventory was changed.
    #[error("insufficient inventory: {}", describe_shortfalls(shortfalls))]
    InsufficientInventory { shortfalls: Vec<Shortfall> },

    #[error("order {0} is closed and cannot be modified")]
    ClosedOrderImmutable(OrderId),

    #[error("order {0} is already closed")]
    AlreadyClosed(OrderId),

    #[error("persistence failure: {0}")]
    Persistence(StoreError),

    /// A store call timed out and reading back could not tell whether it took effect.
    #[error("outcome unknown: {0}")]
    OutcomeUnknown(String),

    /// Rollback failed; the ledger and order store may disagree.
    #[error("compensation failed: {0}")]
    CompensationFailure(Box<CompensationReport>),

    #[error("order {} in batch is invalid: {source}", index + 1)]
    InvalidBatchOrder {
        index: usize,
        source: Box<FulfillmentError>,
    },

    /// Orders were stored but their combined reservation was not applied.
    #[error(
        "batch stored {} orders but inventory was not consumed: {cause}",
        order_ids.len()
    )]
    BatchPartiallyApplied {
        order_ids: Vec<OrderId>,
        plan: ReservationPlan,
        cause: Box<FulfillmentError>,
    },

    #[error("ledger invariant violated: {0}")]
    LedgerInvariant(String),
}

fn describe_shortfalls(shortfalls: &[Shortfall]) -> String {
    shortfalls
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl FulfillmentError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            FulfillmentError::Validation(_) => "validation_error",
            FulfillmentError::NotFound(_) => "not_found",
            FulfillmentError::InsufficientInventory { .. } => "insufficient_inventory",
            FulfillmentError::ClosedOrderImmutable(_) => "order_closed",
            FulfillmentError::AlreadyClosed(_) => "already_closed",
            FulfillmentError::Persistence(StoreError::Timeout(_)) => "persistence_timeout",
            FulfillmentError::Persistence(StoreError::Conflict(_)) => "concurrency_conflict",
            FulfillmentError::Persistence(_) => "persistence_error",
            FulfillmentError::OutcomeUnknown(_) => "outcome_unknown",
            FulfillmentError::CompensationFailure(_) => "compensation_failure",
            FulfillmentError::InvalidBatchOrder { .. } => "invalid_batch_order",
            FulfillmentError::BatchPartiallyApplied { .. } => "batch_partially_applied",
            FulfillmentError::LedgerInvariant(_) => "ledger_invariant",
        }
    }

    /// True when the failed operation left no durable change behind.
    pub fn is_clean(&self) -> bool {
        !matches!(
            self,
            FulfillmentError::CompensationFailure(_)
                | FulfillmentError::BatchPartiallyApplied { .. }
                | FulfillmentError::LedgerInvariant(_)
                | FulfillmentError::OutcomeUnknown(_)
        )
    }

    pub(crate) fn persistence(err: StoreError, missing: impl FnOnce() -> Missing) -> Self {
        match err {
            StoreError::NotFound(_) => FulfillmentError::NotFound(missing()),
            other => FulfillmentError::Persistence(other),
        }
    }
}

impl From<DomainError> for FulfillmentError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                FulfillmentError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => FulfillmentError::LedgerInvariant(msg),
            DomainError::Conflict(msg) => FulfillmentError::Persistence(StoreError::Conflict(msg)),
        }
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => FulfillmentError::NotFound(Missing::Other(what)),
            other => FulfillmentError::Persistence(other),
        }
    }
}

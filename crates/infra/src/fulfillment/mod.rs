//! Order fulfillment: recipe resolution, reservation planning, the inventory
//! ledger, and the coordinator that ties orders to stock.
//!
//! ## Consistency model
//!
//! Every pending order records the demand consumed for its lines when they
//! were last priced, and releases exactly that amount. The coordinator changes
//! an order and its reservation together:
//!
//! - stock is checked and consumed while the per-ingredient locks for the
//!   whole plan are held (taken in ascending ingredient order)
//! - each multi-step change runs as a [`Saga`](crate::saga::Saga), so a
//!   failure after inventory moved is undone by compensation
//! - a failed compensation surfaces as
//!   [`FulfillmentError::CompensationFailure`], never silently
//!
//! Store calls are bounded by [`FulfillmentConfig::store_timeout`]. A timed-out
//! write is re-read before the engine decides whether it happened; when the
//! read cannot settle it, the result is [`FulfillmentError::OutcomeUnknown`]
//! and nothing is compensated.

use std::future::Future;
use std::time::Duration;

use crate::store::StoreError;

pub mod batch;
pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod planner;
pub mod resolver;

pub use batch::{
    AdmissionStatus, BatchAdmissionController, BatchOrderOutcome, BatchResult, BatchSummary,
    InventoryUpdate, RejectionReason,
};
pub use coordinator::OrderFulfillmentCoordinator;
pub use error::{CompensationReport, FailedCompensation, FulfillmentError, Missing};
pub use ledger::{InventoryLedger, LedgerEntry, LedgerSession};
pub use planner::{PricedPlan, ReservationPlanner};
pub use resolver::RecipeResolver;

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FulfillmentConfig {
    pub store_timeout: Duration,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Run a store call, turning an elapsed deadline into [`StoreError::Timeout`].
pub(crate) async fn with_timeout<T, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(format!(
            "{operation} exceeded {} ms",
            limit.as_millis()
        ))),
    }
}

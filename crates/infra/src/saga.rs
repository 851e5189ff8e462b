//! In-process saga runner.
//!
//! A saga is an ordered list of steps. Each completed step registers a
//! compensation; when a later step fails, compensations run in reverse
//! registration order and the original error is returned. If any compensation
//! fails too, the result is [`FulfillmentError::CompensationFailure`] carrying
//! a [`CompensationReport`] with the recorded context, so state can be
//! repaired by hand.
//!
//! A step that fails with [`FulfillmentError::OutcomeUnknown`] may have taken
//! effect. Undoing the earlier steps could then contradict the stored state,
//! so nothing is compensated and the pending steps are reported instead.
//!
//! ```ignore
//! let mut saga = Saga::new("create_order");
//! saga.record("order_id", order.id_typed());
//! saga.step("reserve_inventory", session.consume(&plan), compensate(|| session.restore(&plan)))
//!     .await?;
//! saga.run("persist_order", store.insert(&order)).await?;
//! saga.commit();
//! ```

use std::collections::BTreeMap;
use std::future::Future;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, error, warn};

use crate::fulfillment::{CompensationReport, FailedCompensation, FulfillmentError};

/// Deferred undo action for a completed step.
pub type Compensation<'a> =
    Box<dyn FnOnce() -> BoxFuture<'a, Result<(), FulfillmentError>> + Send + 'a>;

/// Wrap a closure producing a future as a [`Compensation`].
pub fn compensate<'a, F, Fut>(f: F) -> Compensation<'a>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = Result<(), FulfillmentError>> + Send + 'a,
{
    Box::new(move || f().boxed())
}

pub struct Saga<'a> {
    name: &'static str,
    completed: Vec<(&'static str, Compensation<'a>)>,
    context: BTreeMap<&'static str, String>,
}

impl<'a> Saga<'a> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            completed: Vec::new(),
            context: BTreeMap::new(),
        }
    }

    /// Attach a detail to any compensation report this saga produces.
    pub fn record(&mut self, key: &'static str, value: impl ToString) {
        self.context.insert(key, value.to_string());
    }

    /// Run a step with no compensation (typically the last one).
    pub async fn run<T, F>(&mut self, step: &'static str, action: F) -> Result<T, FulfillmentError>
    where
        F: Future<Output = Result<T, FulfillmentError>>,
    {
        match action.await {
            Ok(value) => {
                debug!(saga = self.name, step, "saga step completed");
                Ok(value)
            }
            Err(err) => Err(self.unwind(step, err).await),
        }
    }

    /// Run a step and register its compensation once it succeeds.
    pub async fn step<T, F>(
        &mut self,
        step: &'static str,
        action: F,
        compensation: Compensation<'a>,
    ) -> Result<T, FulfillmentError>
    where
        F: Future<Output = Result<T, FulfillmentError>>,
    {
        let value = self.run(step, action).await?;
        self.completed.push((step, compensation));
        Ok(value)
    }

    /// Fail the saga at `step` without running an action.
    pub async fn abort(mut self, step: &'static str, cause: FulfillmentError) -> FulfillmentError {
        self.unwind(step, cause).await
    }

    /// Finish successfully and discard the compensations.
    pub fn commit(mut self) {
        debug!(saga = self.name, steps = self.completed.len(), "saga committed");
        self.completed.clear();
    }

    async fn unwind(&mut self, failed_step: &'static str, cause: FulfillmentError) -> FulfillmentError {
        if self.completed.is_empty() {
            return cause;
        }
        if matches!(cause, FulfillmentError::OutcomeUnknown(_)) {
            return self.escalate(failed_step, cause);
        }
        warn!(
            saga = self.name,
            failed_step,
            error = %cause,
            pending = self.completed.len(),
            "saga step failed; compensating"
        );

        let mut compensated = Vec::new();
        let mut failed_compensations = Vec::new();
        while let Some((step, compensation)) = self.completed.pop() {
            match compensation().await {
                Ok(()) => compensated.push(step),
                Err(err) => {
                    error!(
                        saga = self.name,
                        step,
                        error = %err,
                        "compensation failed"
                    );
                    failed_compensations.push(FailedCompensation {
                        step,
                        error: err.to_string(),
                    });
                }
            }
        }

        if failed_compensations.is_empty() {
            return cause;
        }

        self.report(failed_step, cause, compensated, failed_compensations)
    }

    /// Leave every completed step in place and report them as unresolved.
    fn escalate(&mut self, failed_step: &'static str, cause: FulfillmentError) -> FulfillmentError {
        let skipped = self
            .completed
            .drain(..)
            .rev()
            .map(|(step, _)| FailedCompensation {
                step,
                error: format!("not compensated: outcome of '{failed_step}' is unknown"),
            })
            .collect();
        self.report(failed_step, cause, Vec::new(), skipped)
    }

    fn report(
        &mut self,
        failed_step: &'static str,
        cause: FulfillmentError,
        compensated: Vec<&'static str>,
        failed_compensations: Vec<FailedCompensation>,
    ) -> FulfillmentError {
        let report = CompensationReport {
            saga: self.name,
            failed_step,
            cause: cause.to_string(),
            compensated,
            failed_compensations,
            context: std::mem::take(&mut self.context),
        };
        error!(
            saga = report.saga,
            failed_step = report.failed_step,
            context = ?report.context,
            "saga left inconsistent state; manual repair required"
        );
        FulfillmentError::CompensationFailure(Box::new(report))
    }
}

impl Drop for Saga<'_> {
    fn drop(&mut self) {
        if !self.completed.is_empty() {
            error!(
                saga = self.name,
                pending = self.completed.len(),
                "saga dropped without commit; compensations were not run"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn log_step<'a>(log: &'a Mutex<Vec<&'static str>>, name: &'static str) -> Compensation<'a> {
        compensate(move || async move {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[tokio::test]
    async fn compensations_run_in_reverse_order() {
        let log = Mutex::new(Vec::new());
        let mut saga = Saga::new("test");

        saga.step("a", async { Ok(()) }, log_step(&log, "undo a"))
            .await
            .unwrap();
        saga.step("b", async { Ok(()) }, log_step(&log, "undo b"))
            .await
            .unwrap();
        let err = saga
            .run::<(), _>("c", async { Err(FulfillmentError::Validation("boom".into())) })
            .await
            .unwrap_err();

        assert!(matches!(err, FulfillmentError::Validation(msg) if msg == "boom"));
        assert_eq!(*log.lock().unwrap(), vec!["undo b", "undo a"]);
    }

    #[tokio::test]
    async fn failed_compensation_is_reported_with_context() {
        let log = Mutex::new(Vec::new());
        let mut saga = Saga::new("test");
        saga.record("order_id", "42");

        saga.step("a", async { Ok(()) }, log_step(&log, "undo a"))
            .await
            .unwrap();
        saga.step(
            "b",
            async { Ok(()) },
            compensate(|| async { Err(FulfillmentError::LedgerInvariant("stuck".into())) }),
        )
        .await
        .unwrap();

        let err = saga
            .abort("c", FulfillmentError::Validation("boom".into()))
            .await;
        match err {
            FulfillmentError::CompensationFailure(report) => {
                assert_eq!(report.failed_step, "c");
                assert_eq!(report.compensated, vec!["a"]);
                assert_eq!(report.failed_compensations[0].step, "b");
                assert_eq!(report.context.get("order_id").map(String::as_str), Some("42"));
            }
            other => panic!("expected CompensationFailure, got {other:?}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["undo a"]);
    }

    #[tokio::test]
    async fn unknown_outcome_skips_compensation() {
        let log = Mutex::new(Vec::new());
        let mut saga = Saga::new("test");
        saga.record("order_id", "7");

        saga.step("a", async { Ok(()) }, log_step(&log, "undo a"))
            .await
            .unwrap();
        saga.step("b", async { Ok(()) }, log_step(&log, "undo b"))
            .await
            .unwrap();
        let err = saga
            .run::<(), _>("c", async {
                Err(FulfillmentError::OutcomeUnknown("write may have landed".into()))
            })
            .await
            .unwrap_err();

        match err {
            FulfillmentError::CompensationFailure(report) => {
                assert_eq!(report.failed_step, "c");
                assert!(report.compensated.is_empty());
                let pending: Vec<_> = report.failed_compensations.iter().map(|c| c.step).collect();
                assert_eq!(pending, vec!["b", "a"]);
                assert!(report.cause.contains("write may have landed"));
                assert_eq!(report.context.get("order_id").map(String::as_str), Some("7"));
            }
            other => panic!("expected CompensationFailure, got {other:?}"),
        }
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn committed_saga_does_not_compensate() {
        let log = Mutex::new(Vec::new());
        let mut saga = Saga::new("test");
        saga.step("a", async { Ok(()) }, log_step(&log, "undo a"))
            .await
            .unwrap();
        saga.commit();
        assert!(log.lock().unwrap().is_empty());
    }
}

//! The order finalizer.
//!
//! Converting a satisfied payment intent into a confirmed order must happen exactly once per reference, no matter
//! how many times the customer (or a nervous cashier) taps "confirm". The finalizer wraps the order-management
//! collaborator with a per-reference submission marker: a completed submission short-circuits to the previous
//! confirmation, and a concurrent attempt waits for the in-flight result instead of double-submitting.
use std::{collections::HashMap, sync::Arc, time::Duration};

use log::*;
use thiserror::Error;
use tokio::sync::{watch, Mutex};

use crate::{
    db_types::Reference,
    traits::{NewCheckoutOrder, OrderConfirmation, OrderSubmitter, ReconciliationLedger},
};

const CLEAR_RETRY_LIMIT: usize = 3;
const CLEAR_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Submission results are fanned out to waiting duplicate attempts as `Result<_, String>`; the error is stringly so
/// the value stays cheap to clone.
type AttemptResult = Result<OrderConfirmation, String>;

enum Marker {
    InProgress(watch::Receiver<Option<AttemptResult>>),
    Done(OrderConfirmation),
}

enum Role {
    Waiter(watch::Receiver<Option<AttemptResult>>),
    Submitter(watch::Sender<Option<AttemptResult>>),
}

#[derive(Clone)]
pub struct OrderFinalizer<B, S> {
    ledger: B,
    submitter: S,
    markers: Arc<Mutex<HashMap<Reference, Marker>>>,
}

impl<B, S> OrderFinalizer<B, S>
where
    B: ReconciliationLedger,
    S: OrderSubmitter,
{
    pub fn new(ledger: B, submitter: S) -> Self {
        Self { ledger, submitter, markers: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Submit the order exactly once for its reference.
    ///
    /// On success the ledger entry is cleared and the confirmation is recorded, so duplicate confirmations return
    /// the same result without a second submission. On failure the in-progress marker is removed and the ledger
    /// accumulation is left intact, so the user can retry without paying again.
    pub async fn finalize(&self, order: NewCheckoutOrder) -> Result<OrderConfirmation, FinalizeError> {
        let reference = order.reference.clone();
        let role = {
            let mut markers = self.markers.lock().await;
            match markers.get(&reference) {
                Some(Marker::Done(confirmation)) => {
                    debug!(
                        "🧾 Order for [{reference}] was already submitted as {}. Returning the previous confirmation.",
                        confirmation.order_id
                    );
                    return Ok(confirmation.clone());
                },
                Some(Marker::InProgress(rx)) => Role::Waiter(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    markers.insert(reference.clone(), Marker::InProgress(rx));
                    Role::Submitter(tx)
                },
            }
        };
        match role {
            Role::Waiter(rx) => self.await_inflight_result(&reference, rx).await,
            Role::Submitter(tx) => self.submit(order, tx).await,
        }
    }

    async fn await_inflight_result(
        &self,
        reference: &Reference,
        mut rx: watch::Receiver<Option<AttemptResult>>,
    ) -> Result<OrderConfirmation, FinalizeError> {
        debug!("🧾 A submission for [{reference}] is already in flight. Waiting for its result.");
        loop {
            let outcome = rx.borrow_and_update().clone();
            if let Some(result) = outcome {
                return result.map_err(FinalizeError::Submission);
            }
            if rx.changed().await.is_err() {
                return Err(FinalizeError::Submission("The in-flight submission was abandoned".to_string()));
            }
        }
    }

    async fn submit(
        &self,
        order: NewCheckoutOrder,
        tx: watch::Sender<Option<AttemptResult>>,
    ) -> Result<OrderConfirmation, FinalizeError> {
        let reference = order.reference.clone();
        info!("🧾 Submitting order for [{reference}]");
        match self.submitter.submit_order(&order).await {
            Ok(confirmation) => {
                self.clear_entry(&reference).await;
                self.markers.lock().await.insert(reference.clone(), Marker::Done(confirmation.clone()));
                let _ = tx.send(Some(Ok(confirmation.clone())));
                info!("🧾 Order for [{reference}] confirmed as {}", confirmation.order_id);
                Ok(confirmation)
            },
            Err(e) => {
                warn!("🧾 Order submission for [{reference}] failed: {e}");
                self.markers.lock().await.remove(&reference);
                let _ = tx.send(Some(Err(e.to_string())));
                Err(FinalizeError::Submission(e.to_string()))
            },
        }
    }

    /// Best effort: the order has been submitted by this point, so a persistent clear failure must never trigger a
    /// resubmission. It leaves a stale entry behind and is logged as such.
    async fn clear_entry(&self, reference: &Reference) {
        for attempt in 1..=CLEAR_RETRY_LIMIT {
            match self.ledger.clear(reference).await {
                Ok(()) => {
                    debug!("🧾 Ledger entry for [{reference}] cleared");
                    return;
                },
                Err(e) if attempt < CLEAR_RETRY_LIMIT => {
                    warn!("🧾 Clearing the ledger entry for [{reference}] failed (attempt {attempt}): {e}. Retrying.");
                    tokio::time::sleep(CLEAR_RETRY_DELAY).await;
                },
                Err(e) => {
                    error!(
                        "🧾 Could not clear the ledger entry for [{reference}] after {CLEAR_RETRY_LIMIT} attempts: \
                         {e}. The order has been submitted; the stale entry needs manual cleanup."
                    );
                },
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum FinalizeError {
    #[error("Order submission failed: {0}")]
    Submission(String),
}

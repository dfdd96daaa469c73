use std::{fmt::Debug, future::Future, time::Duration};

use log::*;
use thiserror::Error;

use crate::{
    db_types::{PaymentEvent, ReconciliationStatus, Reference},
    finalizer::FinalizeError,
    intent::PaymentIntent,
    traits::{LedgerError, ReconciliationLedger},
};

const STORAGE_RETRY_LIMIT: usize = 5;
const STORAGE_RETRY_DELAY: Duration = Duration::from_millis(200);

/// `ReconciliationApi` is the primary API for matching accumulated incoming amounts against a payment intent's
/// target.
pub struct ReconciliationApi<B> {
    ledger: B,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(ledger: B) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &B {
        &self.ledger
    }
}

impl<B> ReconciliationApi<B>
where B: ReconciliationLedger
{
    /// Recover the state of an intent from the ledger alone.
    ///
    /// Called on screen mount and after an app restart with a known reference. If enough was received while the
    /// process was not running, this resumes straight into `Satisfied` without requiring a new event; otherwise the
    /// partial total is surfaced in `Awaiting`.
    pub async fn resume(&self, intent: &PaymentIntent) -> Result<ReconciliationStatus, ReconciliationError> {
        let entry = self.with_retry("read", || self.ledger.fetch_entry(&intent.reference)).await?;
        let received = entry.map(|e| e.accumulated).unwrap_or_default();
        let status = ReconciliationStatus::project(received, intent.target_amount);
        debug!("🔄 Resumed [{}]: {status}", intent.reference);
        Ok(status)
    }

    /// Fold a validated payment event into the running total and recompute the status.
    ///
    /// The event is only acknowledged once the write is confirmed; transient storage failures are retried first. A
    /// single event larger than the remaining balance is fully credited, never split or refused; only the sum
    /// matters.
    pub async fn apply_event(
        &self,
        intent: &PaymentIntent,
        event: &PaymentEvent,
    ) -> Result<ReconciliationStatus, ReconciliationError> {
        let entry =
            self.with_retry("accumulate", || self.ledger.accumulate(&intent.reference, event.amount)).await?;
        debug!(
            "🔄 Applied {} to [{}]; {} received towards {}",
            event.amount, intent.reference, entry.accumulated, intent.target_amount
        );
        Ok(ReconciliationStatus::project(entry.accumulated, intent.target_amount))
    }

    /// Explicit user cancellation of the whole checkout: the ledger entry is removed and the intent stops being
    /// resumable. Leaving the screen must NOT come through here.
    pub async fn abandon(&self, reference: &Reference) -> Result<(), ReconciliationError> {
        self.with_retry("clear", || self.ledger.clear(reference)).await?;
        info!("🔄 Checkout [{reference}] abandoned; its ledger entry is cleared");
        Ok(())
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(LedgerError::StorageError(e)) if attempt < STORAGE_RETRY_LIMIT => {
                    warn!("🔄 Ledger {what} failed (attempt {attempt}/{STORAGE_RETRY_LIMIT}): {e}. Retrying.");
                    tokio::time::sleep(STORAGE_RETRY_DELAY).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReconciliationError {
    #[error("{0}")]
    Ledger(#[from] LedgerError),
    #[error("{0}")]
    Finalize(#[from] FinalizeError),
}

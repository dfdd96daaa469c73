use qpe_common::Cents;
use thiserror::Error;

use crate::db_types::{LedgerEntry, Reference};

/// Key prefix under which ledger entries are stored. The full storage key for a reference is
/// `"<LEDGER_NAMESPACE>:<reference>"`.
pub const LEDGER_NAMESPACE: &str = "qrpay";

/// The contract a storage backend must fulfil to act as the persisted ledger.
///
/// The ledger is the only shared mutable resource in the engine. It is keyed by reference, so entries for different
/// checkouts never contend. `accumulate` must be a true read-modify-write: two calls for the same reference racing
/// each other must serialize inside the backend so that neither increment is lost.
#[allow(async_fn_in_trait)]
pub trait ReconciliationLedger: Clone {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    /// Fetch the entry for `reference`. Safe to call before any event has arrived: absent is `Ok(None)`, never an
    /// error.
    async fn fetch_entry(&self, reference: &Reference) -> Result<Option<LedgerEntry>, LedgerError>;

    /// Atomically add `amount` to the stored total for `reference` (creating the entry at zero first if absent) and
    /// return the new entry.
    ///
    /// Either the increment is persisted and the new entry returned, or an error is returned; this method never
    /// reports success while losing the amount. Non-positive amounts are rejected so that the stored total is
    /// monotonically non-decreasing for as long as the entry exists.
    async fn accumulate(&self, reference: &Reference, amount: Cents) -> Result<LedgerEntry, LedgerError>;

    /// Remove the entry for `reference`. Idempotent: clearing an absent entry is not an error.
    async fn clear(&self, reference: &Reference) -> Result<(), LedgerError>;

    /// Closes the backing store.
    async fn close(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("Ledger storage failure: {0}")]
    StorageError(String),
    #[error("Cannot accumulate a non-positive amount ({0})")]
    NonPositiveAmount(Cents),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::StorageError(e.to_string())
    }
}

//! Interface contracts for the engine's collaborators.
//!
//! Two seams are defined here:
//!
//! * [`ReconciliationLedger`] is the contract a storage backend must fulfil to act as the persisted ledger. The
//!   engine ships a SQLite implementation; anything that can perform an atomic read-modify-write per key can back it.
//! * [`OrderSubmitter`] is the boundary to the order-management collaborator. It is the same submission call the
//!   non-QR (cash) checkout path uses; the finalizer wraps it with an idempotency guard.
mod ledger;
mod order_submitter;

pub use ledger::{LedgerError, ReconciliationLedger, LEDGER_NAMESPACE};
pub use order_submitter::{NewCheckoutOrder, OrderConfirmation, OrderSubmitter, SubmitError};

//! The reconciliation flow.
//!
//! Split in two, the way the rest of the engine is:
//!
//! * [`ReconciliationApi`] holds the per-operation logic against the ledger: resuming an intent, folding a payment
//!   event into the running total, abandoning a checkout. It retries transient storage failures before surfacing
//!   them, because an event may never be acknowledged while its amount is unrecorded.
//! * [`ReconciliationController`] owns one checkout's state machine. It consumes listener messages and UI commands
//!   on a single task, applying one event at a time, and publishes every status change through a `watch` channel
//!   that the screen treats as a read-only projection.
mod api;
mod controller;

pub use api::{ReconciliationApi, ReconciliationError};
pub use controller::{ControllerHandle, ReconciliationController, UiCommand};

//! QR Payment Engine
//!
//! The QR Payment Engine is the reconciliation core behind a QR checkout flow: it renders a payment intent, listens
//! for asynchronous (possibly fragmented) "money received" notifications pushed from an external channel,
//! accumulates them against the intent's target amount, survives app restarts mid-payment, and finalizes the
//! underlying order exactly once. It is a client-side accumulation and idempotency layer; the push channel remains
//! the source of truth for amounts actually received.
//!
//! The library is divided into a handful of components, wired together by the [`reconciliation`] controller:
//! 1. The intent encoder ([`mod@intent`]) builds the static payload displayed as a QR code.
//! 2. The persisted ledger (the [`ReconciliationLedger`] trait, with a SQLite backend) holds the durable running
//!    total per checkout reference. Its `accumulate` operation is a true atomic read-modify-write, so back-to-back
//!    notifications can never lose an increment. You should never need to access the store directly; go through the
//!    reconciliation API.
//! 3. The notification listener ([`mod@listener`]) owns the push-channel connection, drops malformed frames, and
//!    forwards validated events in arrival order.
//! 4. The order finalizer ([`mod@finalizer`]) converts a satisfied intent into a confirmed order exactly once per
//!    reference.
//!
//! The engine also provides a set of events that can be subscribed to ([`mod@events`]): when an intent first
//! becomes satisfied, and when an order is finalized. A simple actor framework is used so that screen-level code can
//! hook into these events and perform custom actions.
pub mod db_types;
pub mod events;
pub mod finalizer;
pub mod helpers;
pub mod intent;
pub mod listener;
pub mod reconciliation;

mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLedger;
pub use traits::{
    LedgerError,
    NewCheckoutOrder,
    OrderConfirmation,
    OrderSubmitter,
    ReconciliationLedger,
    SubmitError,
    LEDGER_NAMESPACE,
};
pub use reconciliation::{
    ControllerHandle,
    ReconciliationApi,
    ReconciliationController,
    ReconciliationError,
    UiCommand,
};
pub use finalizer::{FinalizeError, OrderFinalizer};

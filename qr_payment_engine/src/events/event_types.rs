use qpe_common::Cents;

use crate::db_types::Reference;

/// Published the first time an intent's accumulated total reaches its target, including when that is discovered on
/// resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentSatisfiedEvent {
    pub reference: Reference,
    pub received: Cents,
    pub overpaid: Cents,
}

/// Published after the underlying order has been submitted (exactly once) and the ledger entry cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderFinalizedEvent {
    pub reference: Reference,
    pub order_id: String,
}

//! Public data types shared between the engine's components and its storage backends.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use qpe_common::Cents;
use serde::{Deserialize, Serialize};
use sqlx::Type;

//--------------------------------------      Reference       --------------------------------------------------------
/// The unique identifier of a single checkout/payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Reference(pub String);

impl FromStr for Reference {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for Reference {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Reference {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Reference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------     LedgerEntry      --------------------------------------------------------
/// The persisted running total collected so far against one reference.
///
/// `accumulated` is non-negative and only ever grows while the intent is open; the entry as a whole is deleted when
/// the order is finalized or the checkout is explicitly cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub reference: Reference,
    pub accumulated: Cents,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------     PaymentEvent     --------------------------------------------------------
/// A validated "money received" notification. Consumed immediately by the reconciliation flow and folded into the
/// ledger; individual events are not retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub amount: Cents,
    pub received_at: DateTime<Utc>,
    /// Opaque identifier assigned by the push channel, carried for diagnostics only.
    pub source_id: String,
}

//--------------------------------------  ReconciliationStatus -------------------------------------------------------
/// The state of one payment intent, as shown to the checkout screen.
///
/// This is a pure projection of the ledger entry against the intent's target amount (plus the finalizer's own
/// progress) and is recomputed on every event. Screen-level code must never mutate it independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReconciliationStatus {
    /// Less than the target amount has been received so far.
    Awaiting { received: Cents, remaining: Cents },
    /// The target has been reached or exceeded. Further events keep accumulating and `overpaid` is recomputed, so
    /// the customer can be told about any excess before the order is confirmed.
    Satisfied { received: Cents, overpaid: Cents },
    /// The order is being submitted.
    Finalizing { received: Cents },
    /// The order was submitted exactly once and the ledger entry has been cleared.
    Finalized { order_id: String },
    /// Order submission failed. The ledger entry is intact, so confirming again is safe.
    Failed { received: Cents, reason: String },
    /// The push channel went down. The accumulated total is unaffected and remains authoritative; the screen may
    /// retry the connection.
    ChannelError { received: Cents, reason: String },
}

impl ReconciliationStatus {
    /// Project a status from the amount received so far and the intent's target.
    pub fn project(received: Cents, target: Cents) -> Self {
        if received >= target {
            Self::Satisfied { received, overpaid: received - target }
        } else {
            Self::Awaiting { received, remaining: target - received }
        }
    }

    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// The last known accumulated amount, for states that track one.
    pub fn received(&self) -> Cents {
        match self {
            Self::Awaiting { received, .. }
            | Self::Satisfied { received, .. }
            | Self::Finalizing { received }
            | Self::Failed { received, .. }
            | Self::ChannelError { received, .. } => *received,
            Self::Finalized { .. } => Cents::from(0),
        }
    }
}

impl Display for ReconciliationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Awaiting { received, remaining } => {
                write!(f, "Awaiting ({received} received, {remaining} remaining)")
            },
            Self::Satisfied { received, overpaid } => {
                write!(f, "Satisfied ({received} received, {overpaid} over)")
            },
            Self::Finalizing { .. } => write!(f, "Finalizing"),
            Self::Finalized { order_id } => write!(f, "Finalized (order {order_id})"),
            Self::Failed { reason, .. } => write!(f, "Failed ({reason})"),
            Self::ChannelError { reason, .. } => write!(f, "ChannelError ({reason})"),
        }
    }
}

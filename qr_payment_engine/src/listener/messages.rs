//! Wire format of inbound push-channel frames.
use chrono::{DateTime, Utc};
use qpe_common::Cents;
use serde::Deserialize;
use thiserror::Error;

use crate::db_types::{PaymentEvent, Reference};

/// A raw "money received" notification as it arrives off the wire. Only `amount` is required; everything else is
/// transport-level metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentNotification {
    pub amount: i64,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl PaymentNotification {
    pub fn decode(frame: &str) -> Result<Self, EventRejected> {
        serde_json::from_str(frame).map_err(|e| EventRejected::Malformed(e.to_string()))
    }

    /// Validate the notification against the reference this listener is scoped to and convert it into a
    /// [`PaymentEvent`].
    ///
    /// Frames with a non-positive amount are rejected, as are frames that name a different reference (a stale or
    /// cross-order notification). A frame with no reference at all is accepted; the channel itself is scoped to one
    /// checkout.
    pub fn into_event(self, expected: &Reference) -> Result<PaymentEvent, EventRejected> {
        if self.amount <= 0 {
            return Err(EventRejected::NonPositiveAmount(self.amount));
        }
        if let Some(got) = self.reference {
            if got != expected.as_str() {
                return Err(EventRejected::ReferenceMismatch { expected: expected.clone(), got });
            }
        }
        Ok(PaymentEvent {
            amount: Cents::from(self.amount),
            received_at: self.received_at.unwrap_or_else(Utc::now),
            source_id: self.source_id.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Error)]
pub enum EventRejected {
    #[error("The notification payload could not be decoded: {0}")]
    Malformed(String),
    #[error("The notification amount must be positive, got {0}")]
    NonPositiveAmount(i64),
    #[error("The notification is for reference {got}, but this listener is scoped to {expected}")]
    ReferenceMismatch { expected: Reference, got: String },
}

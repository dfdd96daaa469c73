use chrono::{DateTime, Utc};
use qpe_common::Cents;
use thiserror::Error;

use crate::{db_types::Reference, intent::ItemLine};

/// The boundary to the order-management collaborator.
///
/// Implementations submit the underlying order once per call; the exactly-once guarantee across retries and
/// concurrent confirmations is provided by [`crate::finalizer::OrderFinalizer`], not here.
#[allow(async_fn_in_trait)]
pub trait OrderSubmitter: Clone {
    async fn submit_order(&self, order: &NewCheckoutOrder) -> Result<OrderConfirmation, SubmitError>;
}

//--------------------------------------   NewCheckoutOrder   --------------------------------------------------------
/// The order submission request, as understood by the order-management collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCheckoutOrder {
    pub reference: Reference,
    pub items: Vec<ItemLine>,
    pub discount: Option<Cents>,
    pub note: Option<String>,
}

impl NewCheckoutOrder {
    pub fn new(reference: Reference, items: Vec<ItemLine>) -> Self {
        Self { reference, items, discount: None, note: None }
    }

    pub fn with_discount(mut self, discount: Cents) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }
}

//--------------------------------------   OrderConfirmation  --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    /// The order identifier assigned by the order-management collaborator.
    pub order_id: String,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error("The order service is unreachable: {0}")]
    Network(String),
    #[error("The order service rejected the submission: {0}")]
    Rejected(String),
}

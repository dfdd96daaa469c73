//! The payment intent and its encoder.
//!
//! A [`PaymentIntent`] captures everything that is static about one QR checkout: the target amount, the reference it
//! will be reconciled under, and the merchant/item details shown to the paying customer. [`PaymentIntent::encode`]
//! produces the payload that the checkout screen renders as a QR code. The payload carries no cryptographic
//! integrity protection; the push channel remains the source of truth for amounts actually received.
use chrono::{DateTime, Utc};
use qpe_common::Cents;
use serde::Serialize;
use thiserror::Error;

use crate::{db_types::Reference, helpers::new_reference};

//--------------------------------------     MerchantInfo     --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerchantInfo {
    /// The name shown to the customer in their payment app.
    pub display_name: String,
    /// The receiving account identifier.
    pub account_id: String,
}

//--------------------------------------       ItemLine       --------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLine {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Cents,
}

impl ItemLine {
    pub fn new<S: Into<String>>(name: S, quantity: u32, unit_price: Cents) -> Self {
        Self { name: name.into(), quantity, unit_price }
    }
}

//--------------------------------------     PaymentIntent    --------------------------------------------------------
/// The target amount and metadata a payment is being collected against. Immutable once created; discarded when the
/// checkout screen is left or the order is finalized or cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub reference: Reference,
    pub target_amount: Cents,
    pub created_at: DateTime<Utc>,
    pub merchant: MerchantInfo,
    pub items: Vec<ItemLine>,
}

impl PaymentIntent {
    /// Encode the intent into the payload displayed as a QR code.
    pub fn encode(&self) -> Result<String, IntentError> {
        let items = self.items.iter().map(|i| format!("{} x{} @ {}", i.name, i.quantity, i.unit_price)).collect();
        let payload = EncodedPayload {
            amount: self.target_amount.value(),
            reference: self.reference.as_str(),
            timestamp: self.created_at.timestamp(),
            merchant: &self.merchant.display_name,
            account: &self.merchant.account_id,
            items,
        };
        Ok(serde_json::to_string(&payload)?)
    }
}

#[derive(Serialize)]
struct EncodedPayload<'a> {
    amount: i64,
    reference: &'a str,
    timestamp: i64,
    merchant: &'a str,
    account: &'a str,
    items: Vec<String>,
}

//--------------------------------------     IntentBuilder    --------------------------------------------------------
#[derive(Debug, Clone, Default)]
pub struct IntentBuilder {
    reference: Option<Reference>,
    target_amount: Option<Cents>,
    merchant: Option<MerchantInfo>,
    items: Vec<ItemLine>,
}

impl IntentBuilder {
    pub fn new(target_amount: Cents) -> Self {
        Self { target_amount: Some(target_amount), ..Self::default() }
    }

    /// Use a caller-supplied reference instead of generating one.
    pub fn reference(mut self, reference: Reference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn merchant<S: Into<String>, T: Into<String>>(mut self, display_name: S, account_id: T) -> Self {
        self.merchant = Some(MerchantInfo { display_name: display_name.into(), account_id: account_id.into() });
        self
    }

    pub fn item(mut self, item: ItemLine) -> Self {
        self.items.push(item);
        self
    }

    pub fn items<I: IntoIterator<Item = ItemLine>>(mut self, items: I) -> Self {
        self.items.extend(items);
        self
    }

    pub fn build(self) -> Result<PaymentIntent, IntentError> {
        let target_amount = self.target_amount.unwrap_or_default();
        if !target_amount.is_positive() {
            return Err(IntentError::NonPositiveTarget(target_amount));
        }
        let reference = self.reference.unwrap_or_else(new_reference);
        let merchant = self.merchant.unwrap_or_else(|| MerchantInfo {
            display_name: String::new(),
            account_id: String::new(),
        });
        Ok(PaymentIntent { reference, target_amount, created_at: Utc::now(), merchant, items: self.items })
    }
}

#[derive(Debug, Clone, Error)]
pub enum IntentError {
    #[error("The target amount of a payment intent must be positive, got {0}")]
    NonPositiveTarget(Cents),
    #[error("Could not encode the intent payload: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for IntentError {
    fn from(e: serde_json::Error) -> Self {
        IntentError::Encoding(e.to_string())
    }
}

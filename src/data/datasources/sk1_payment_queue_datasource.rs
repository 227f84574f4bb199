use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::entities::{
    promotional_offer::SignedData, store_transaction::StoreTransaction,
};

/// Payment submitted to the payment queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Sk1Payment {
    pub product_identifier: String,
    pub quantity: u32,
    /// Opaque user identifier attached to the payment.
    pub application_username: Option<String>,
    pub discount: Option<SignedData>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sk1TransactionState {
    Purchasing,
    Purchased,
    Failed,
    Restored,
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sk1ErrorCode {
    PaymentCancelled,
    Unknown,
    Other(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sk1TransactionError {
    pub code: Sk1ErrorCode,
    pub message: Option<String>,
}

/// Transaction as reported by the payment queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Sk1PaymentTransaction {
    pub transaction_identifier: Option<String>,
    pub product_identifier: String,
    pub transaction_date: Option<DateTime<Utc>>,
    pub quantity: u32,
    pub state: Sk1TransactionState,
    pub error: Option<Sk1TransactionError>,
}

/// Receives payment queue callbacks. One call may carry several
/// transactions, and the same transaction may be reported more than once.
pub trait PaymentQueueObserver: Send + Sync {
    fn updated_transactions(&self, transactions: Vec<Sk1PaymentTransaction>);
}

/// The original, callback-based payment queue.
pub trait Sk1PaymentQueueDatasource: Send + Sync {
    /// Registers the observer that receives every transaction update, or
    /// removes it when `None`.
    fn set_observer(&self, observer: Option<Arc<dyn PaymentQueueObserver>>);

    fn add_payment(&self, payment: Sk1Payment);

    fn finish_transaction(&self, transaction: &StoreTransaction);
}

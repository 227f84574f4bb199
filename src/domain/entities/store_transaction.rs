use chrono::{DateTime, Utc};

/// Which observation pipeline delivered a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionSource {
    /// Callback-based payment queue (StoreKit 1).
    Legacy,
    /// Async transaction-update stream (StoreKit 2).
    Stream,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionFailure {
    UserCancelled,
    Error { message: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionState {
    Purchasing,
    Purchased,
    Restored,
    /// Waiting on an external approval, e.g. Ask to Buy.
    Deferred,
    Failed(TransactionFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreTransaction {
    /// Absent for payment-queue transactions that never reached the store,
    /// e.g. ones still purchasing or failed before submission.
    pub transaction_identifier: Option<String>,
    pub product_identifier: String,
    pub purchase_date: Option<DateTime<Utc>>,
    pub quantity: u32,
    pub source: TransactionSource,
    /// Signed JWS of the transaction, only provided by the stream source.
    pub jws_representation: Option<String>,
}

/// A platform-reported change to a transaction's state. Consumed once.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    pub transaction: StoreTransaction,
    pub state: TransactionState,
}

impl TransactionUpdate {
    pub fn source(&self) -> TransactionSource {
        self.transaction.source
    }

    pub fn transaction_identifier(&self) -> Option<&str> {
        self.transaction.transaction_identifier.as_deref()
    }

    pub fn product_identifier(&self) -> &str {
        &self.transaction.product_identifier
    }
}

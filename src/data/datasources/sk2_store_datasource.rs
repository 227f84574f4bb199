use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use uuid::Uuid;

use crate::{
    domain::entities::{
        promotional_offer::SignedData,
        store_product::Sk2Product,
        store_transaction::{StoreTransaction, TransactionSource, TransactionState, TransactionUpdate},
    },
    errors::PurchasesError,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Sk2Transaction {
    pub id: String,
    pub original_id: String,
    pub product_id: String,
    pub purchase_date: DateTime<Utc>,
    pub purchased_quantity: u32,
    pub jws_representation: String,
}

/// The store signs every transaction; only verified ones are acted upon.
#[derive(Debug, Clone, PartialEq)]
pub enum Sk2VerificationResult {
    Verified(Sk2Transaction),
    Unverified {
        transaction: Sk2Transaction,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sk2PurchaseResult {
    Success(Sk2VerificationResult),
    UserCancelled,
    /// Awaiting approval; the outcome arrives later on the update stream.
    Pending,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sk2PurchaseOptions {
    pub promotional_offer: Option<SignedData>,
    pub app_account_token: Option<Uuid>,
}

/// The async StoreKit 2 purchase API.
#[async_trait]
pub trait Sk2StoreDatasource: Send + Sync {
    async fn purchase(
        &self,
        product: &Sk2Product,
        options: Sk2PurchaseOptions,
    ) -> Result<Sk2PurchaseResult, PurchasesError>;

    async fn finish(&self, transaction: &StoreTransaction);

    /// Out-of-band transaction updates: renewals, purchases from other
    /// devices, approvals of pending purchases. Each update is delivered once.
    fn transaction_updates(&self) -> BoxStream<'static, Sk2VerificationResult>;
}

impl From<Sk2Transaction> for TransactionUpdate {
    fn from(t: Sk2Transaction) -> Self {
        TransactionUpdate {
            transaction: StoreTransaction {
                transaction_identifier: Some(t.id),
                product_identifier: t.product_id,
                purchase_date: Some(t.purchase_date),
                quantity: t.purchased_quantity,
                source: TransactionSource::Stream,
                jws_representation: Some(t.jws_representation),
            },
            state: TransactionState::Purchased,
        }
    }
}

impl Sk2VerificationResult {
    /// The update for a verified transaction, or the failure reason.
    pub(crate) fn into_update(self) -> Result<TransactionUpdate, (Sk2Transaction, String)> {
        match self {
            Sk2VerificationResult::Verified(t) => Ok(t.into()),
            Sk2VerificationResult::Unverified {
                transaction,
                reason,
            } => Err((transaction, reason)),
        }
    }
}

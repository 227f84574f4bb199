use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    data::datasources::sk1_payment_queue_datasource::{
        PaymentQueueObserver, Sk1ErrorCode, Sk1PaymentTransaction, Sk1TransactionState,
    },
    domain::entities::store_transaction::{
        StoreTransaction, TransactionFailure, TransactionSource, TransactionState,
        TransactionUpdate,
    },
};

/// Adapts payment queue callbacks into `TransactionUpdate`s tagged
/// `TransactionSource::Legacy`.
///
/// Forwards one update per reported transaction, in callback order, without
/// any deduplication. Nothing is forwarded while stopped.
pub struct Sk1TransactionSource {
    sender: mpsc::UnboundedSender<TransactionUpdate>,
    running: AtomicBool,
}

impl Sk1TransactionSource {
    pub fn new(sender: mpsc::UnboundedSender<TransactionUpdate>) -> Self {
        Self {
            sender,
            running: AtomicBool::new(false),
        }
    }

    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl PaymentQueueObserver for Sk1TransactionSource {
    fn updated_transactions(&self, transactions: Vec<Sk1PaymentTransaction>) {
        if !self.is_running() {
            debug!(
                count = transactions.len(),
                "Payment queue source stopped, ignoring transactions."
            );
            return;
        }
        for transaction in transactions {
            if self.sender.send(transaction.into()).is_err() {
                warn!("Transaction consumer is gone, dropping payment queue update.");
                return;
            }
        }
    }
}

impl From<Sk1PaymentTransaction> for TransactionUpdate {
    fn from(t: Sk1PaymentTransaction) -> Self {
        let state = match t.state {
            Sk1TransactionState::Purchasing => TransactionState::Purchasing,
            Sk1TransactionState::Purchased => TransactionState::Purchased,
            Sk1TransactionState::Restored => TransactionState::Restored,
            Sk1TransactionState::Deferred => TransactionState::Deferred,
            Sk1TransactionState::Failed => TransactionState::Failed(match t.error {
                Some(ref e) if e.code == Sk1ErrorCode::PaymentCancelled => {
                    TransactionFailure::UserCancelled
                }
                Some(ref e) => TransactionFailure::Error {
                    message: e.message.clone(),
                },
                None => TransactionFailure::Error { message: None },
            }),
        };
        TransactionUpdate {
            transaction: StoreTransaction {
                transaction_identifier: t.transaction_identifier,
                product_identifier: t.product_identifier,
                purchase_date: t.transaction_date,
                quantity: t.quantity,
                source: TransactionSource::Legacy,
                jws_representation: None,
            },
            state,
        }
    }
}

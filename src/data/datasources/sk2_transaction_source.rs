use std::sync::{Arc, Mutex, PoisonError};

use futures_util::{stream::BoxStream, StreamExt};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    data::datasources::sk2_store_datasource::Sk2VerificationResult,
    domain::entities::store_transaction::TransactionUpdate,
};

/// Listens to the StoreKit 2 transaction stream and forwards verified updates
/// tagged `TransactionSource::Stream`, in stream order.
///
/// Once `cancel` returns, no further update is forwarded: the outgoing sender
/// lives behind a lock that `cancel` empties.
pub struct Sk2TransactionSource {
    sender: Arc<Mutex<Option<mpsc::UnboundedSender<TransactionUpdate>>>>,
    wake: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Sk2TransactionSource {
    /// Spawns the listening task. Must be called within a tokio runtime.
    pub fn listen(
        updates: BoxStream<'static, Sk2VerificationResult>,
        sender: mpsc::UnboundedSender<TransactionUpdate>,
    ) -> Self {
        let sender = Arc::new(Mutex::new(Some(sender)));
        let (wake, cancelled) = watch::channel(false);
        let task = tokio::spawn(Self::run(updates, Arc::clone(&sender), cancelled));
        Self {
            sender,
            wake,
            task: Mutex::new(Some(task)),
        }
    }

    async fn run(
        mut updates: BoxStream<'static, Sk2VerificationResult>,
        sender: Arc<Mutex<Option<mpsc::UnboundedSender<TransactionUpdate>>>>,
        mut cancelled: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = cancelled.changed() => break,
                next = updates.next() => {
                    let Some(result) = next else {
                        debug!("Transaction update stream ended.");
                        break;
                    };
                    let update = match result.into_update() {
                        Ok(update) => update,
                        Err((transaction, reason)) => {
                            warn!(
                                transaction_id = %transaction.id,
                                reason = %reason,
                                "Ignoring unverified transaction."
                            );
                            continue;
                        }
                    };
                    let guard = sender.lock().unwrap_or_else(PoisonError::into_inner);
                    match guard.as_ref() {
                        Some(s) if s.send(update).is_ok() => {}
                        _ => break,
                    }
                }
            }
        }
    }

    /// Stops listening. Idempotent.
    pub fn cancel(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.wake.send_replace(true);
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for Sk2TransactionSource {
    fn drop(&mut self) {
        self.cancel();
    }
}

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;

use crate::{
    domain::entities::{
        package::Package,
        promotional_offer::PromotionalOffer,
        purchase_intent::{IntentState, PurchaseIntent},
        purchase_result::PurchaseResultData,
        store_product::StoreProduct,
        store_transaction::StoreTransaction,
    },
    errors::PurchasesError,
};

pub(crate) type Resolution = Result<PurchaseResultData, PurchasesError>;
pub(crate) type Resolver = oneshot::Sender<Resolution>;

struct PendingEntry {
    intent: PurchaseIntent,
    /// Bound when the first purchased/restored update for the product is
    /// claimed.
    transaction_identifier: Option<String>,
    resolver: Resolver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClaimState {
    /// Receipt post in progress.
    InFlight,
    /// Posted and finished, or failed and finished. Echoes are dropped.
    Completed,
}

/// Outcome of offering a purchased/restored transaction to the registry.
#[derive(Debug)]
pub(crate) enum Claim {
    /// Matches a caller's pending intent. Carries a snapshot of the intent
    /// for the receipt post.
    Solicited(PurchaseIntent),
    /// No caller is waiting; process and publish through the unsolicited
    /// path.
    Unsolicited,
    /// Already claimed by an earlier update.
    Duplicate,
}

/// Completed transaction identifiers remembered for dedup. A store echo
/// arrives shortly after the first delivery, so only recent ones matter.
const COMPLETED_TRANSACTIONS_CAPACITY: usize = 1024;

/// Dedup boundary between the two transaction sources.
///
/// Intents are keyed by product identifier, so at most one purchase per
/// product is live. Transactions are keyed by transaction identifier once
/// claimed. In-flight claims are kept until they complete or are released;
/// completed ones are evicted oldest first past a fixed capacity. Callers
/// hold the orchestrator lock while using it.
pub(crate) struct PendingTransactionRegistry {
    intents: HashMap<String, PendingEntry>,
    transactions: HashMap<String, ClaimState>,
    completed_order: VecDeque<String>,
    completed_capacity: usize,
    invocations: u64,
}

impl Default for PendingTransactionRegistry {
    fn default() -> Self {
        Self::with_completed_capacity(COMPLETED_TRANSACTIONS_CAPACITY)
    }
}

impl PendingTransactionRegistry {
    fn with_completed_capacity(completed_capacity: usize) -> Self {
        Self {
            intents: HashMap::new(),
            transactions: HashMap::new(),
            completed_order: VecDeque::new(),
            completed_capacity,
            invocations: 0,
        }
    }

    /// Registers a new intent, rejecting the call if one is already live for
    /// the same product.
    pub(crate) fn register(
        &mut self,
        product: StoreProduct,
        package: Option<Package>,
        promotional_offer: Option<PromotionalOffer>,
    ) -> Result<(PurchaseIntent, oneshot::Receiver<Resolution>), PurchasesError> {
        let product_identifier = product.product_identifier().to_string();
        if self.intents.contains_key(&product_identifier) {
            return Err(PurchasesError::OperationAlreadyInProgress { product_identifier });
        }
        self.invocations += 1;
        let intent = PurchaseIntent::new(product, package, promotional_offer, self.invocations);
        let (resolver, receiver) = oneshot::channel();
        self.intents.insert(
            product_identifier,
            PendingEntry {
                intent: intent.clone(),
                transaction_identifier: None,
                resolver,
            },
        );
        Ok((intent, receiver))
    }

    /// Looks the transaction up by identifier first, then falls back to the
    /// product's pending intent.
    pub(crate) fn claim(&mut self, transaction: &StoreTransaction) -> Claim {
        let transaction_identifier = transaction.transaction_identifier.as_deref();
        if let Some(id) = transaction_identifier {
            if self.transactions.contains_key(id) {
                return Claim::Duplicate;
            }
        }

        let claim = match self.intents.get_mut(&transaction.product_identifier) {
            Some(entry)
                if entry.transaction_identifier.is_none()
                    && entry.intent.state() == IntentState::Pending =>
            {
                entry.transaction_identifier = transaction_identifier.map(str::to_string);
                entry.intent.advance(IntentState::AwaitingReceipt);
                Claim::Solicited(entry.intent.clone())
            }
            // Without an identifier there is nothing else to dedup on.
            Some(_) if transaction_identifier.is_none() => return Claim::Duplicate,
            _ => Claim::Unsolicited,
        };
        if let Some(id) = transaction_identifier {
            self.transactions.insert(id.to_string(), ClaimState::InFlight);
        }
        claim
    }

    pub(crate) fn is_claimed(&self, transaction_identifier: &str) -> bool {
        self.transactions.contains_key(transaction_identifier)
    }

    pub(crate) fn advance(&mut self, correlation_key: &str, state: IntentState) {
        if let Some(entry) = self
            .intents
            .values_mut()
            .find(|e| e.intent.correlation_key == correlation_key)
        {
            entry.intent.advance(state);
        }
    }

    /// Removes the intent and hands back its resolver. `None` if the intent
    /// was already resolved or its caller detached.
    pub(crate) fn take_resolver(&mut self, correlation_key: &str) -> Option<Resolver> {
        let product_identifier = self
            .intents
            .iter()
            .find(|(_, e)| e.intent.correlation_key == correlation_key)
            .map(|(k, _)| k.clone())?;
        self.intents
            .remove(&product_identifier)
            .map(|mut entry| {
                entry.intent.advance(IntentState::Resolved);
                entry.resolver
            })
    }

    /// Resolver of a product's intent that has not yet bound a transaction,
    /// or is bound to this very transaction. Used for failed and deferred
    /// updates.
    pub(crate) fn take_unclaimed_resolver(
        &mut self,
        transaction: &StoreTransaction,
    ) -> Option<(String, Resolver)> {
        let entry = self.intents.get(&transaction.product_identifier)?;
        let matches = entry.intent.state() == IntentState::Pending
            && (entry.transaction_identifier.is_none()
                || entry.transaction_identifier == transaction.transaction_identifier);
        if !matches {
            return None;
        }
        let key = entry.intent.correlation_key.clone();
        self.take_resolver(&key).map(|resolver| (key, resolver))
    }

    /// Marks a transaction as fully handled; later updates for it are
    /// duplicates.
    pub(crate) fn complete(&mut self, transaction_identifier: &str) {
        let previous = self
            .transactions
            .insert(transaction_identifier.to_string(), ClaimState::Completed);
        if previous == Some(ClaimState::Completed) {
            return;
        }
        self.completed_order
            .push_back(transaction_identifier.to_string());
        while self.completed_order.len() > self.completed_capacity {
            if let Some(oldest) = self.completed_order.pop_front() {
                self.transactions.remove(&oldest);
            }
        }
    }

    /// Forgets an unfinished transaction so that a later redelivery is
    /// processed again.
    pub(crate) fn release(&mut self, transaction_identifier: &str) {
        if self.transactions.get(transaction_identifier) == Some(&ClaimState::InFlight) {
            self.transactions.remove(transaction_identifier);
        }
    }

    /// Drops a caller's intent without resolving it. Any transaction already
    /// bound keeps being processed and is published as unsolicited.
    pub(crate) fn detach(&mut self, correlation_key: &str) -> bool {
        self.take_resolver(correlation_key).is_some()
    }

    #[cfg(test)]
    pub(crate) fn has_pending_intent(&self, product_identifier: &str) -> bool {
        self.intents.contains_key(product_identifier)
    }
}

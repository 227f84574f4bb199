use super::{
    package::Package, promotional_offer::PromotionalOffer, store_product::StoreProduct,
};

/// Lifecycle of a purchase intent. Transitions only move forward and nothing
/// leaves `Resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntentState {
    Pending,
    AwaitingReceipt,
    Posting,
    Resolved,
}

/// One caller-initiated purchase attempt, owned by the orchestrator from
/// registration until it resolves.
#[derive(Debug, Clone)]
pub struct PurchaseIntent {
    pub product: StoreProduct,
    pub package: Option<Package>,
    pub promotional_offer: Option<PromotionalOffer>,
    /// Product identifier plus invocation counter. Distinguishes an intent
    /// from a later one for the same product after the first was detached.
    pub correlation_key: String,
    state: IntentState,
}

impl PurchaseIntent {
    pub(crate) fn new(
        product: StoreProduct,
        package: Option<Package>,
        promotional_offer: Option<PromotionalOffer>,
        invocation: u64,
    ) -> Self {
        let correlation_key = format!("{}#{}", product.product_identifier(), invocation);
        Self {
            product,
            package,
            promotional_offer,
            correlation_key,
            state: IntentState::Pending,
        }
    }

    pub fn product_identifier(&self) -> &str {
        self.product.product_identifier()
    }

    pub fn state(&self) -> IntentState {
        self.state
    }

    /// Moves to `next` if it is a forward transition. Returns whether the
    /// state changed.
    pub(crate) fn advance(&mut self, next: IntentState) -> bool {
        if next > self.state {
            self.state = next;
            true
        } else {
            false
        }
    }
}

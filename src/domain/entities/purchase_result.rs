use super::{customer_info::CustomerInfo, store_transaction::StoreTransaction};

/// Terminal outcome of a purchase, shared by the async and completion
/// surfaces.
///
/// A cancelled purchase is not an error: it resolves with
/// `user_cancelled == true` and neither a transaction nor customer info.
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseResultData {
    pub transaction: Option<StoreTransaction>,
    pub customer_info: Option<CustomerInfo>,
    pub user_cancelled: bool,
}

impl PurchaseResultData {
    pub(crate) fn purchased(transaction: StoreTransaction, customer_info: CustomerInfo) -> Self {
        Self {
            transaction: Some(transaction),
            customer_info: Some(customer_info),
            user_cancelled: false,
        }
    }

    pub(crate) fn cancelled() -> Self {
        Self {
            transaction: None,
            customer_info: None,
            user_cancelled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundRequestStatus {
    UserCancelled,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundRequestTarget {
    Product(String),
    Entitlement(String),
    ActiveEntitlement,
}

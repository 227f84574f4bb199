use async_trait::async_trait;

use crate::{
    domain::entities::purchase_result::{RefundRequestStatus, RefundRequestTarget},
    errors::PurchasesError,
};

/// Opens the platform's subscription management screen, or the backend's
/// management URL when the platform has none.
#[async_trait]
pub trait ManageSubscriptionsHelper: Send + Sync {
    async fn show_manage_subscriptions(&self) -> Result<(), PurchasesError>;
}

#[async_trait]
pub trait BeginRefundRequestHelper: Send + Sync {
    async fn begin_refund_request(
        &self,
        target: RefundRequestTarget,
    ) -> Result<RefundRequestStatus, PurchasesError>;
}

use async_trait::async_trait;

use crate::{
    domain::entities::{
        customer_info::CustomerInfo,
        package::Package,
        promotional_offer::PromotionalOffer,
        purchase_result::{PurchaseResultData, RefundRequestStatus, RefundRequestTarget},
        store_product::{StoreProduct, StoreProductDiscount},
    },
    errors::PurchasesError,
};

#[async_trait]
pub trait PurchasesRepository: Send + Sync {
    /// Purchases `product` and waits until the purchase resolves.
    ///
    /// A cancelled purchase resolves with `Ok` and `user_cancelled == true`.
    /// A second call for a product whose purchase is still in flight fails
    /// with `OperationAlreadyInProgress`.
    async fn purchase(
        &self,
        product: StoreProduct,
        package: Option<Package>,
        promotional_offer: Option<PromotionalOffer>,
    ) -> Result<PurchaseResultData, PurchasesError>;

    /// Signs `discount` and purchases with the resulting offer. Nothing is
    /// submitted if signing fails.
    async fn purchase_with_discount(
        &self,
        product: StoreProduct,
        package: Option<Package>,
        discount: StoreProductDiscount,
    ) -> Result<PurchaseResultData, PurchasesError>;

    /// Posts a freshly refreshed receipt to the backend.
    async fn restore_purchases(&self) -> Result<CustomerInfo, PurchasesError>;

    /// Invoked when the transaction stream replays historical transactions.
    async fn transactions_updated(&self) -> Result<CustomerInfo, PurchasesError>;

    async fn promotional_offer(
        &self,
        discount: &StoreProductDiscount,
        product: &StoreProduct,
    ) -> Result<PromotionalOffer, PurchasesError>;

    async fn show_manage_subscription(&self) -> Result<(), PurchasesError>;

    async fn begin_refund_request(
        &self,
        target: RefundRequestTarget,
    ) -> Result<RefundRequestStatus, PurchasesError>;
}

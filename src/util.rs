use std::sync::Arc;

use tokio::{sync::broadcast, task::JoinHandle};

use crate::{
    config::PurchasesConfig,
    data::{
        datasources::{
            backend_datasource::BackendDatasourceImpl,
            customer_info_cache_datasource::InMemoryCustomerInfoCache,
            receipt_fetcher::{ReceiptFetcherImpl, ReceiptRefreshDatasource},
            sk1_payment_queue_datasource::Sk1PaymentQueueDatasource,
            sk2_store_datasource::Sk2StoreDatasource,
            store_helpers_datasource::{BeginRefundRequestHelper, ManageSubscriptionsHelper},
        },
        repositories::purchases_orchestrator::{OrchestratorDatasources, PurchasesOrchestrator},
    },
    domain::{
        entities::{
            customer_info::CustomerInfo,
            package::Package,
            promotional_offer::PromotionalOffer,
            purchase_result::{PurchaseResultData, RefundRequestStatus, RefundRequestTarget},
            store_product::{StoreProduct, StoreProductDiscount},
            store_transaction::StoreTransaction,
            system_info::SystemInfo,
        },
        repositories::purchases_repository::PurchasesRepository,
    },
    errors::PurchasesError,
};

pub struct PurchasesUtil<R: PurchasesRepository> {
    purchases_repository: Arc<R>,
}

impl<R: PurchasesRepository> PurchasesUtil<R> {
    pub fn from_repository(purchases_repository: R) -> Self {
        Self {
            purchases_repository: Arc::new(purchases_repository),
        }
    }

    pub async fn purchase(
        &self,
        product: StoreProduct,
        package: Option<Package>,
        promotional_offer: Option<PromotionalOffer>,
    ) -> Result<PurchaseResultData, PurchasesError> {
        self.purchases_repository
            .purchase(product, package, promotional_offer)
            .await
    }

    pub async fn purchase_with_discount(
        &self,
        product: StoreProduct,
        package: Option<Package>,
        discount: StoreProductDiscount,
    ) -> Result<PurchaseResultData, PurchasesError> {
        self.purchases_repository
            .purchase_with_discount(product, package, discount)
            .await
    }

    pub async fn restore_purchases(&self) -> Result<CustomerInfo, PurchasesError> {
        self.purchases_repository.restore_purchases().await
    }

    pub async fn transactions_updated(&self) -> Result<CustomerInfo, PurchasesError> {
        self.purchases_repository.transactions_updated().await
    }

    pub async fn promotional_offer(
        &self,
        discount: &StoreProductDiscount,
        product: &StoreProduct,
    ) -> Result<PromotionalOffer, PurchasesError> {
        self.purchases_repository
            .promotional_offer(discount, product)
            .await
    }

    pub async fn show_manage_subscription(&self) -> Result<(), PurchasesError> {
        self.purchases_repository.show_manage_subscription().await
    }

    pub async fn begin_refund_request_for_product(
        &self,
        product_identifier: &str,
    ) -> Result<RefundRequestStatus, PurchasesError> {
        self.purchases_repository
            .begin_refund_request(RefundRequestTarget::Product(product_identifier.to_string()))
            .await
    }

    pub async fn begin_refund_request_for_entitlement(
        &self,
        entitlement_identifier: &str,
    ) -> Result<RefundRequestStatus, PurchasesError> {
        self.purchases_repository
            .begin_refund_request(RefundRequestTarget::Entitlement(
                entitlement_identifier.to_string(),
            ))
            .await
    }

    pub async fn begin_refund_request_for_active_entitlement(
        &self,
    ) -> Result<RefundRequestStatus, PurchasesError> {
        self.purchases_repository
            .begin_refund_request(RefundRequestTarget::ActiveEntitlement)
            .await
    }
}

/// Completion-style entry points. Each spawns the async call and invokes the
/// completion exactly once with its outcome. Must be called within a tokio
/// runtime.
impl<R: PurchasesRepository + 'static> PurchasesUtil<R> {
    /// The completion receives `(transaction, customer_info, error,
    /// user_cancelled)`.
    pub fn purchase_with_completion<F>(
        &self,
        product: StoreProduct,
        package: Option<Package>,
        promotional_offer: Option<PromotionalOffer>,
        completion: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Option<StoreTransaction>, Option<CustomerInfo>, Option<PurchasesError>, bool)
            + Send
            + 'static,
    {
        let repository = Arc::clone(&self.purchases_repository);
        tokio::spawn(async move {
            match repository
                .purchase(product, package, promotional_offer)
                .await
            {
                Ok(data) => completion(
                    data.transaction,
                    data.customer_info,
                    None,
                    data.user_cancelled,
                ),
                Err(e) => completion(None, None, Some(e), false),
            }
        })
    }

    pub fn restore_purchases_with_completion<F>(&self, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<CustomerInfo, PurchasesError>) + Send + 'static,
    {
        let repository = Arc::clone(&self.purchases_repository);
        tokio::spawn(async move { completion(repository.restore_purchases().await) })
    }

    pub fn promotional_offer_with_completion<F>(
        &self,
        discount: StoreProductDiscount,
        product: StoreProduct,
        completion: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<PromotionalOffer, PurchasesError>) + Send + 'static,
    {
        let repository = Arc::clone(&self.purchases_repository);
        tokio::spawn(async move {
            completion(repository.promotional_offer(&discount, &product).await)
        })
    }

    pub fn show_manage_subscription_with_completion<F>(&self, completion: F) -> JoinHandle<()>
    where
        F: FnOnce(Option<PurchasesError>) + Send + 'static,
    {
        let repository = Arc::clone(&self.purchases_repository);
        tokio::spawn(async move { completion(repository.show_manage_subscription().await.err()) })
    }

    pub fn begin_refund_request_with_completion<F>(
        &self,
        target: RefundRequestTarget,
        completion: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<RefundRequestStatus, PurchasesError>) + Send + 'static,
    {
        let repository = Arc::clone(&self.purchases_repository);
        tokio::spawn(async move { completion(repository.begin_refund_request(target).await) })
    }
}

/// Host-provided platform bindings.
pub struct PlatformDatasources {
    pub payment_queue: Arc<dyn Sk1PaymentQueueDatasource>,
    pub store: Arc<dyn Sk2StoreDatasource>,
    pub receipt_refresh: Arc<dyn ReceiptRefreshDatasource>,
    pub manage_subscriptions_helper: Arc<dyn ManageSubscriptionsHelper>,
    pub begin_refund_request_helper: Arc<dyn BeginRefundRequestHelper>,
    pub system_info: SystemInfo,
}

impl PurchasesUtil<PurchasesOrchestrator> {
    /// Builds the orchestrator over the HTTP backend and starts observing
    /// transactions.
    pub async fn new(
        config: PurchasesConfig,
        platform: PlatformDatasources,
    ) -> Result<Self, PurchasesError> {
        let config = config.validate()?;
        let datasources = OrchestratorDatasources {
            backend: Arc::new(BackendDatasourceImpl::new(
                &config.backend_base_url,
                &config.api_key,
            )),
            receipt_fetcher: Arc::new(ReceiptFetcherImpl::new(
                platform.receipt_refresh,
                platform.system_info,
            )),
            payment_queue: platform.payment_queue,
            store: platform.store,
            customer_info_cache: Arc::new(InMemoryCustomerInfoCache::new()),
            manage_subscriptions_helper: platform.manage_subscriptions_helper,
            begin_refund_request_helper: platform.begin_refund_request_helper,
        };
        let orchestrator = PurchasesOrchestrator::new(config, datasources);
        orchestrator.start();
        Ok(Self::from_repository(orchestrator))
    }

    pub fn customer_info_updates(&self) -> broadcast::Receiver<CustomerInfo> {
        self.purchases_repository.customer_info_updates()
    }

    pub fn cached_customer_info(&self) -> Option<CustomerInfo> {
        self.purchases_repository.cached_customer_info()
    }

    pub fn stop(&self) {
        self.purchases_repository.stop();
    }
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::PurchasesConfig,
    data::{
        datasources::{
            backend_datasource::{
                BackendDatasource, PostOfferRequest, PostReceiptRequest, ProductRequestData,
            },
            customer_info_cache_datasource::CustomerInfoCacheDatasource,
            receipt_fetcher::ReceiptFetcher,
            sk1_payment_queue_datasource::{Sk1Payment, Sk1PaymentQueueDatasource},
            sk1_transaction_source::Sk1TransactionSource,
            sk2_store_datasource::{Sk2PurchaseOptions, Sk2PurchaseResult, Sk2StoreDatasource},
            sk2_transaction_source::Sk2TransactionSource,
            store_helpers_datasource::{BeginRefundRequestHelper, ManageSubscriptionsHelper},
        },
        repositories::pending_transaction_registry::{
            Claim, PendingTransactionRegistry, Resolution,
        },
    },
    domain::{
        entities::{
            customer_info::CustomerInfo,
            package::Package,
            promotional_offer::PromotionalOffer,
            purchase_intent::{IntentState, PurchaseIntent},
            purchase_result::{PurchaseResultData, RefundRequestStatus, RefundRequestTarget},
            receipt_refresh_policy::ReceiptRefreshPolicy,
            store_product::{DiscountType, Sk1Product, Sk2Product, StoreProduct, StoreProductDiscount},
            store_transaction::{
                StoreTransaction, TransactionFailure, TransactionSource, TransactionState,
                TransactionUpdate,
            },
        },
        repositories::purchases_repository::PurchasesRepository,
    },
    errors::PurchasesError,
};

const CUSTOMER_INFO_UPDATES_CAPACITY: usize = 16;

/// Collaborators the orchestrator is built from. Platform-facing ones are
/// supplied by the host; the rest have default implementations in this
/// crate.
pub struct OrchestratorDatasources {
    pub backend: Arc<dyn BackendDatasource>,
    pub receipt_fetcher: Arc<dyn ReceiptFetcher>,
    pub payment_queue: Arc<dyn Sk1PaymentQueueDatasource>,
    pub store: Arc<dyn Sk2StoreDatasource>,
    pub customer_info_cache: Arc<dyn CustomerInfoCacheDatasource>,
    pub manage_subscriptions_helper: Arc<dyn ManageSubscriptionsHelper>,
    pub begin_refund_request_helper: Arc<dyn BeginRefundRequestHelper>,
}

#[derive(Default)]
struct OrchestratorState {
    registry: PendingTransactionRegistry,
    sk1_source: Option<Arc<Sk1TransactionSource>>,
    sk2_source: Option<Sk2TransactionSource>,
    consumer: Option<JoinHandle<()>>,
}

/// Routes store transactions to the backend and resolves purchase calls.
///
/// Both transaction sources feed one channel drained by a single consumer
/// task, so updates are claimed in arrival order. Every purchased or
/// restored transaction is posted at most once per claim. The receipt post
/// runs on its own task and always completes (finish included) even if the
/// purchasing caller goes away; its outcome is then published on
/// `customer_info_updates` instead.
///
/// All mutable state sits behind one lock that is never held across an
/// await point or while calling back into caller code.
#[derive(Clone)]
pub struct PurchasesOrchestrator {
    config: Arc<PurchasesConfig>,
    datasources: Arc<OrchestratorDatasources>,
    state: Arc<Mutex<OrchestratorState>>,
    customer_info_updates: broadcast::Sender<CustomerInfo>,
}

impl PurchasesOrchestrator {
    pub fn new(config: PurchasesConfig, datasources: OrchestratorDatasources) -> Self {
        let (customer_info_updates, _) = broadcast::channel(CUSTOMER_INFO_UPDATES_CAPACITY);
        Self {
            config: Arc::new(config),
            datasources: Arc::new(datasources),
            state: Arc::new(Mutex::new(OrchestratorState::default())),
            customer_info_updates,
        }
    }

    pub fn config(&self) -> &PurchasesConfig {
        &self.config
    }

    /// Starts observing both transaction sources. The StoreKit 2 stream is
    /// only subscribed to when the configuration opts into it. Idempotent;
    /// must be called within a tokio runtime.
    pub fn start(&self) {
        let (sender, receiver) = mpsc::unbounded_channel::<TransactionUpdate>();
        let sk1_source = Arc::new(Sk1TransactionSource::new(sender.clone()));
        {
            let mut state = self.lock_state();
            if state.consumer.is_some() {
                return;
            }
            sk1_source.start();
            state.sk1_source = Some(Arc::clone(&sk1_source));
            if self.config.listens_for_store_kit_2_transactions() {
                debug!("Listening for StoreKit 2 transactions.");
                state.sk2_source = Some(Sk2TransactionSource::listen(
                    self.datasources.store.transaction_updates(),
                    sender,
                ));
            }
            state.consumer = Some(tokio::spawn(
                self.clone().consume_transaction_updates(receiver),
            ));
            self.datasources.payment_queue.set_observer(Some(sk1_source));
        }
        info!(
            app_user_id = %self.config.app_user_id,
            observer_mode = self.config.observer_mode(),
            "Purchases orchestrator started."
        );
    }

    /// Stops both sources. Receipt posts already in flight run to
    /// completion; nothing new is delivered.
    pub fn stop(&self) {
        let sk2_source = {
            let mut state = self.lock_state();
            // The consumer exits on its own once every sender is gone.
            state.consumer.take();
            if let Some(source) = state.sk1_source.take() {
                source.stop();
                self.datasources.payment_queue.set_observer(None);
            }
            state.sk2_source.take()
        };
        if let Some(source) = sk2_source {
            source.cancel();
        }
        info!("Purchases orchestrator stopped.");
    }

    pub fn is_listening_for_store_kit_2_transactions(&self) -> bool {
        self.lock_state().sk2_source.is_some()
    }

    /// Customer info produced outside of a purchase call: renewals, other
    /// devices, and purchases whose caller went away before resolution.
    pub fn customer_info_updates(&self) -> broadcast::Receiver<CustomerInfo> {
        self.customer_info_updates.subscribe()
    }

    pub fn cached_customer_info(&self) -> Option<CustomerInfo> {
        self.datasources
            .customer_info_cache
            .cached_customer_info(&self.config.app_user_id)
    }

    fn lock_state(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn consume_transaction_updates(self, mut receiver: mpsc::UnboundedReceiver<TransactionUpdate>) {
        while let Some(update) = receiver.recv().await {
            self.handle_transaction_update(update).await;
        }
        debug!("Transaction update channel closed.");
    }

    async fn handle_transaction_update(&self, update: TransactionUpdate) {
        let TransactionUpdate { transaction, state } = update;
        match state {
            TransactionState::Purchasing => {
                debug!(
                    product_id = %transaction.product_identifier,
                    "Transaction is purchasing."
                );
            }
            TransactionState::Deferred => self.handle_deferred_transaction(&transaction),
            TransactionState::Failed(failure) => {
                self.handle_failed_transaction(transaction, failure).await
            }
            TransactionState::Purchased | TransactionState::Restored => {
                let claim = self.lock_state().registry.claim(&transaction);
                match claim {
                    Claim::Duplicate => debug!(
                        transaction_id = ?transaction.transaction_identifier,
                        source = ?transaction.source,
                        "Dropping already claimed transaction."
                    ),
                    Claim::Solicited(intent) => self.spawn_receipt_post(transaction, Some(intent)),
                    Claim::Unsolicited => self.spawn_receipt_post(transaction, None),
                }
            }
        }
    }

    fn handle_deferred_transaction(&self, transaction: &StoreTransaction) {
        let pending = self.lock_state().registry.take_unclaimed_resolver(transaction);
        match pending {
            Some((correlation_key, resolver)) => {
                info!(%correlation_key, "Purchase deferred, payment is pending.");
                let _ = resolver.send(Err(PurchasesError::PaymentPending));
            }
            None => debug!(
                product_id = %transaction.product_identifier,
                "Deferred transaction without a pending purchase."
            ),
        }
    }

    async fn handle_failed_transaction(
        &self,
        transaction: StoreTransaction,
        failure: TransactionFailure,
    ) {
        let pending = {
            let mut state = self.lock_state();
            match transaction.transaction_identifier.as_deref() {
                Some(id) if state.registry.is_claimed(id) => {
                    debug!(transaction_id = id, "Dropping already handled failure.");
                    return;
                }
                _ => state.registry.take_unclaimed_resolver(&transaction),
            }
        };

        self.finish_transaction_if_needed(&transaction).await;
        if let Some(id) = transaction.transaction_identifier.as_deref() {
            self.lock_state().registry.complete(id);
        }

        let resolution = match failure {
            TransactionFailure::UserCancelled => Ok(PurchaseResultData::cancelled()),
            TransactionFailure::Error { message } => {
                Err(PurchasesError::UnknownPurchase { message })
            }
        };
        match pending {
            Some((correlation_key, resolver)) => {
                info!(%correlation_key, cancelled = resolution.is_ok(), "Purchase failed.");
                let _ = resolver.send(resolution);
            }
            None => warn!(
                product_id = %transaction.product_identifier,
                "Failed transaction without a pending purchase."
            ),
        }
    }

    fn spawn_receipt_post(&self, transaction: StoreTransaction, intent: Option<PurchaseIntent>) {
        let this = self.clone();
        tokio::spawn(async move {
            this.process_transaction(transaction, intent).await;
        });
    }

    /// Posts the receipt for a claimed transaction and delivers the outcome
    /// to the waiting caller, or to the unsolicited path if there is none.
    async fn process_transaction(&self, transaction: StoreTransaction, intent: Option<PurchaseIntent>) {
        let result = self.post_receipt_for(&transaction, intent.as_ref()).await;

        if let Some(id) = transaction.transaction_identifier.as_deref() {
            let mut state = self.lock_state();
            match result {
                Ok(_) => state.registry.complete(id),
                Err(_) => state.registry.release(id),
            }
        }

        let resolution = result.map(|info| PurchaseResultData::purchased(transaction, info));
        let undelivered = match &intent {
            Some(intent) => self.deliver(&intent.correlation_key, resolution),
            None => Err(resolution),
        };
        if let Err(resolution) = undelivered {
            self.publish_unsolicited(resolution);
        }
    }

    async fn post_receipt_for(
        &self,
        transaction: &StoreTransaction,
        intent: Option<&PurchaseIntent>,
    ) -> Result<CustomerInfo, PurchasesError> {
        let receipt_data = self.receipt_data(ReceiptRefreshPolicy::OnlyIfEmpty).await?;
        if let Some(intent) = intent {
            self.lock_state()
                .registry
                .advance(&intent.correlation_key, IntentState::Posting);
        }

        let product_data = match intent {
            Some(intent) => product_request_data(&intent.product),
            None => ProductRequestData {
                product_identifier: transaction.product_identifier.clone(),
                price_micros: None,
                currency_code: None,
                subscription_group_identifier: None,
            },
        };
        let request = PostReceiptRequest {
            receipt_data,
            app_user_id: self.config.app_user_id.clone(),
            is_restore: intent.is_none() && self.config.observer_mode(),
            observer_mode: self.config.observer_mode(),
            product_data: Some(product_data),
            offering_identifier: intent
                .and_then(|i| i.package.as_ref())
                .map(|p| p.offering_identifier.clone()),
            promotional_offer: intent.and_then(|i| i.promotional_offer.clone()),
        };
        debug!(
            transaction_id = ?transaction.transaction_identifier,
            product_id = %transaction.product_identifier,
            is_restore = request.is_restore,
            "Posting receipt."
        );
        let customer_info = self.datasources.backend.post_receipt(request).await?;
        self.store_customer_info(&customer_info);
        self.finish_transaction_if_needed(transaction).await;
        Ok(customer_info)
    }

    /// Hands a resolution to the waiting caller. Gives it back if nobody is
    /// waiting anymore.
    fn deliver(&self, correlation_key: &str, resolution: Resolution) -> Result<(), Resolution> {
        let resolution = match resolution {
            Err(PurchasesError::PurchaseCancelled) => Ok(PurchaseResultData::cancelled()),
            other => other,
        };
        let resolver = self.lock_state().registry.take_resolver(correlation_key);
        match resolver {
            Some(resolver) => resolver.send(resolution),
            None => Err(resolution),
        }
    }

    fn publish_unsolicited(&self, resolution: Resolution) {
        match resolution {
            Ok(PurchaseResultData {
                transaction,
                customer_info: Some(customer_info),
                ..
            }) => {
                info!(
                    transaction_id = ?transaction.and_then(|t| t.transaction_identifier),
                    "Publishing customer info for unsolicited transaction."
                );
                // No subscribers is not an error.
                let _ = self.customer_info_updates.send(customer_info);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to process unsolicited transaction."),
        }
    }

    fn store_customer_info(&self, customer_info: &CustomerInfo) {
        let _state = self.lock_state();
        self.datasources
            .customer_info_cache
            .cache_customer_info(&self.config.app_user_id, customer_info.clone());
    }

    async fn finish_transaction_if_needed(&self, transaction: &StoreTransaction) {
        if self.config.observer_mode() {
            debug!(
                transaction_id = ?transaction.transaction_identifier,
                "Observer mode, leaving transaction unfinished."
            );
            return;
        }
        match transaction.source {
            TransactionSource::Legacy => self.datasources.payment_queue.finish_transaction(transaction),
            TransactionSource::Stream => self.datasources.store.finish(transaction).await,
        }
    }

    async fn receipt_data(&self, policy: ReceiptRefreshPolicy) -> Result<Vec<u8>, PurchasesError> {
        match self.datasources.receipt_fetcher.receipt_data(policy).await {
            Some(data) if !data.is_empty() => Ok(data),
            _ => {
                warn!(?policy, "Receipt is missing.");
                Err(PurchasesError::MissingReceiptFile)
            }
        }
    }

    /// Posts the whole receipt without a specific transaction.
    async fn sync_receipt(&self, policy: ReceiptRefreshPolicy) -> Result<CustomerInfo, PurchasesError> {
        let receipt_data = self.receipt_data(policy).await?;
        let request = PostReceiptRequest {
            receipt_data,
            app_user_id: self.config.app_user_id.clone(),
            is_restore: self.config.observer_mode(),
            observer_mode: self.config.observer_mode(),
            product_data: None,
            offering_identifier: None,
            promotional_offer: None,
        };
        let customer_info = self.datasources.backend.post_receipt(request).await?;
        self.store_customer_info(&customer_info);
        Ok(customer_info)
    }

    fn submit_sk1_payment(&self, product: &Sk1Product, intent: &PurchaseIntent) {
        let payment = Sk1Payment {
            product_identifier: product.product_identifier.clone(),
            quantity: 1,
            application_username: Some(self.config.app_user_id.clone()),
            discount: intent
                .promotional_offer
                .as_ref()
                .map(|o| o.signed_data.clone()),
        };
        self.datasources.payment_queue.add_payment(payment);
    }

    /// Runs the platform purchase on an orchestrator-owned task. Its result
    /// is handled even after the caller detached.
    fn spawn_sk2_purchase(&self, product: Sk2Product, intent: PurchaseIntent) {
        let this = self.clone();
        tokio::spawn(async move {
            this.submit_sk2_purchase(&product, &intent).await;
        });
    }

    async fn submit_sk2_purchase(&self, product: &Sk2Product, intent: &PurchaseIntent) {
        let options = Sk2PurchaseOptions {
            promotional_offer: intent
                .promotional_offer
                .as_ref()
                .map(|o| o.signed_data.clone()),
            app_account_token: None,
        };
        let resolution = match self.datasources.store.purchase(product, options).await {
            Ok(Sk2PurchaseResult::Success(verification)) => match verification.into_update() {
                Ok(update) => {
                    self.handle_transaction_update(update).await;
                    return;
                }
                Err((transaction, reason)) => Err(PurchasesError::store_problem(format!(
                    "Transaction {} failed verification: {reason}",
                    transaction.id
                ))),
            },
            Ok(Sk2PurchaseResult::UserCancelled) => Ok(PurchaseResultData::cancelled()),
            Ok(Sk2PurchaseResult::Pending) => Err(PurchasesError::PaymentPending),
            Err(e) => Err(e),
        };
        if let Err(Err(e)) = self.deliver(&intent.correlation_key, resolution) {
            debug!(error = %e, "Purchase error with nobody waiting.");
        }
    }
}

/// Detaches the caller's intent if the purchase future is dropped before it
/// resolves.
struct DetachOnDrop<'a> {
    orchestrator: &'a PurchasesOrchestrator,
    correlation_key: &'a str,
}

impl Drop for DetachOnDrop<'_> {
    fn drop(&mut self) {
        if self
            .orchestrator
            .lock_state()
            .registry
            .detach(self.correlation_key)
        {
            info!(
                correlation_key = self.correlation_key,
                "Purchase caller went away, outcome will be published as unsolicited."
            );
        }
    }
}

fn product_request_data(product: &StoreProduct) -> ProductRequestData {
    ProductRequestData {
        product_identifier: product.product_identifier().to_string(),
        price_micros: Some(product.price_micros()),
        currency_code: product.currency_code().map(str::to_string),
        subscription_group_identifier: product.subscription_group_identifier().map(str::to_string),
    }
}

#[async_trait]
impl PurchasesRepository for PurchasesOrchestrator {
    async fn purchase(
        &self,
        product: StoreProduct,
        package: Option<Package>,
        promotional_offer: Option<PromotionalOffer>,
    ) -> Result<PurchaseResultData, PurchasesError> {
        if let Some(offer) = &promotional_offer {
            if !offer.is_signed_for_discount() {
                return Err(PurchasesError::promotional_offer(
                    "The offer is not signed for its discount.",
                ));
            }
        }
        self.start();

        let (intent, receiver) = self
            .lock_state()
            .registry
            .register(product, package, promotional_offer)?;
        let _detach = DetachOnDrop {
            orchestrator: self,
            correlation_key: &intent.correlation_key,
        };
        info!(
            product_id = intent.product_identifier(),
            correlation_key = %intent.correlation_key,
            store_kit_version = ?intent.product.store_kit_version(),
            "Purchasing product."
        );

        match &intent.product {
            StoreProduct::StoreKit1(product) => self.submit_sk1_payment(product, &intent),
            StoreProduct::StoreKit2(product) => {
                self.spawn_sk2_purchase(product.clone(), intent.clone())
            }
        }

        receiver.await.unwrap_or_else(|_| {
            Err(PurchasesError::UnknownPurchase {
                message: Some("The purchase was abandoned.".to_string()),
            })
        })
    }

    async fn purchase_with_discount(
        &self,
        product: StoreProduct,
        package: Option<Package>,
        discount: StoreProductDiscount,
    ) -> Result<PurchaseResultData, PurchasesError> {
        let offer = self.promotional_offer(&discount, &product).await?;
        self.purchase(product, package, Some(offer)).await
    }

    async fn restore_purchases(&self) -> Result<CustomerInfo, PurchasesError> {
        self.start();
        info!("Restoring purchases.");
        self.sync_receipt(ReceiptRefreshPolicy::Always).await
    }

    async fn transactions_updated(&self) -> Result<CustomerInfo, PurchasesError> {
        debug!("Syncing receipt after transaction replay.");
        self.sync_receipt(ReceiptRefreshPolicy::OnlyIfEmpty).await
    }

    async fn promotional_offer(
        &self,
        discount: &StoreProductDiscount,
        product: &StoreProduct,
    ) -> Result<PromotionalOffer, PurchasesError> {
        let offer_identifier = discount
            .offer_identifier
            .clone()
            .ok_or_else(|| PurchasesError::promotional_offer("The discount has no identifier."))?;
        if discount.discount_type != DiscountType::Promotional {
            return Err(PurchasesError::promotional_offer(format!(
                "Discount '{offer_identifier}' is not a promotional offer."
            )));
        }
        if !discount.is_payment_mode_consistent() {
            return Err(PurchasesError::promotional_offer(format!(
                "Discount '{offer_identifier}' has a price inconsistent with its payment mode."
            )));
        }
        let subscription_group_identifier = product
            .subscription_group_identifier()
            .ok_or_else(|| {
                PurchasesError::promotional_offer(format!(
                    "Product '{}' has no subscription group.",
                    product.product_identifier()
                ))
            })?
            .to_string();

        let receipt_data = self.receipt_data(ReceiptRefreshPolicy::OnlyIfEmpty).await?;
        let request = PostOfferRequest {
            app_user_id: self.config.app_user_id.clone(),
            receipt_data,
            product_identifier: product.product_identifier().to_string(),
            offer_identifier: offer_identifier.clone(),
            subscription_group_identifier,
        };
        let signed_data = self
            .datasources
            .backend
            .post_offer(request)
            .await
            .map_err(|e| PurchasesError::promotional_offer(e.message))?;
        debug!(offer_id = %offer_identifier, "Promotional offer signed.");
        Ok(PromotionalOffer {
            discount: discount.clone(),
            signed_data,
        })
    }

    async fn show_manage_subscription(&self) -> Result<(), PurchasesError> {
        self.datasources
            .manage_subscriptions_helper
            .show_manage_subscriptions()
            .await
    }

    async fn begin_refund_request(
        &self,
        target: RefundRequestTarget,
    ) -> Result<RefundRequestStatus, PurchasesError> {
        info!(?target, "Beginning refund request.");
        self.datasources
            .begin_refund_request_helper
            .begin_refund_request(target)
            .await
    }
}

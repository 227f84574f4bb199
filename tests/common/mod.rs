//! Test doubles for the platform and backend collaborators of the
//! orchestrator.

#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, Once,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures_util::{stream::BoxStream, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use purchases_orchestrator::{
    config::PurchasesConfig,
    data::{
        datasources::{
            backend_datasource::{BackendDatasource, PostOfferRequest, PostReceiptRequest},
            customer_info_cache_datasource::InMemoryCustomerInfoCache,
            receipt_fetcher::ReceiptFetcher,
            sk1_payment_queue_datasource::{
                PaymentQueueObserver, Sk1ErrorCode, Sk1Payment, Sk1PaymentQueueDatasource,
                Sk1PaymentTransaction, Sk1TransactionError, Sk1TransactionState,
            },
            sk2_store_datasource::{
                Sk2PurchaseOptions, Sk2PurchaseResult, Sk2StoreDatasource, Sk2Transaction,
                Sk2VerificationResult,
            },
            store_helpers_datasource::{BeginRefundRequestHelper, ManageSubscriptionsHelper},
        },
        repositories::purchases_orchestrator::{OrchestratorDatasources, PurchasesOrchestrator},
    },
    domain::entities::{
        customer_info::CustomerInfo,
        promotional_offer::{PromotionalOffer, SignedData},
        purchase_result::{RefundRequestStatus, RefundRequestTarget},
        receipt_refresh_policy::ReceiptRefreshPolicy,
        store_product::{
            DiscountType, PaymentMode, PeriodUnit, Sk1Product, Sk2Product, Sk2ProductType,
            StoreProduct, StoreProductDiscount, SubscriptionPeriod,
        },
        store_transaction::StoreTransaction,
    },
    errors::{BackendError, PurchasesError},
};

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn customer_info(original_app_user_id: &str) -> CustomerInfo {
    let date = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    CustomerInfo {
        request_date: date,
        first_seen: date,
        original_app_user_id: original_app_user_id.to_string(),
        management_url: None,
        subscriptions: BTreeMap::new(),
        other_purchases: BTreeMap::new(),
        entitlements: BTreeMap::new(),
    }
}

pub fn monthly() -> SubscriptionPeriod {
    SubscriptionPeriod {
        value: 1,
        unit: PeriodUnit::Month,
    }
}

pub fn promotional_discount(offer_identifier: &str) -> StoreProductDiscount {
    StoreProductDiscount {
        offer_identifier: Some(offer_identifier.to_string()),
        currency_code: Some("USD".to_string()),
        price_micros: 990_000,
        payment_mode: PaymentMode::PayAsYouGo,
        subscription_period: monthly(),
        number_of_periods: 3,
        discount_type: DiscountType::Promotional,
    }
}

pub fn signed_data(offer_identifier: &str) -> SignedData {
    SignedData {
        identifier: offer_identifier.to_string(),
        key_identifier: "key1".to_string(),
        nonce: Uuid::new_v4(),
        signature: "signature".to_string(),
        timestamp: 1_717_243_200_000,
    }
}

pub fn signed_offer(offer_identifier: &str) -> PromotionalOffer {
    PromotionalOffer {
        discount: promotional_discount(offer_identifier),
        signed_data: signed_data(offer_identifier),
    }
}

pub fn sk1_product(id: &str) -> StoreProduct {
    StoreProduct::StoreKit1(Sk1Product {
        product_identifier: id.to_string(),
        localized_title: format!("{id} title"),
        price_micros: 2_990_000,
        currency_code: Some("USD".to_string()),
        subscription_group_identifier: Some("group1".to_string()),
        subscription_period: Some(monthly()),
        introductory_discount: None,
        discounts: vec![promotional_discount("offerid1")],
    })
}

pub fn sk2_product(id: &str) -> StoreProduct {
    StoreProduct::StoreKit2(Sk2Product {
        id: id.to_string(),
        display_name: format!("{id} title"),
        product_type: Sk2ProductType::AutoRenewable,
        price_micros: 2_990_000,
        currency_code: "USD".to_string(),
        subscription_group_id: Some("group1".to_string()),
        subscription_period: Some(monthly()),
        introductory_offer: None,
        promotional_offers: vec![promotional_discount("offerid1")],
    })
}

pub fn sk1_transaction(
    id: Option<&str>,
    product_id: &str,
    state: Sk1TransactionState,
) -> Sk1PaymentTransaction {
    let error = match state {
        Sk1TransactionState::Failed => Some(Sk1TransactionError {
            code: Sk1ErrorCode::PaymentCancelled,
            message: None,
        }),
        _ => None,
    };
    Sk1PaymentTransaction {
        transaction_identifier: id.map(str::to_string),
        product_identifier: product_id.to_string(),
        transaction_date: None,
        quantity: 1,
        state,
        error,
    }
}

pub fn sk2_transaction(id: &str, product_id: &str) -> Sk2Transaction {
    Sk2Transaction {
        id: id.to_string(),
        original_id: id.to_string(),
        product_id: product_id.to_string(),
        purchase_date: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        purchased_quantity: 1,
        jws_representation: format!("jws.{id}"),
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

pub struct MockBackend {
    pub post_receipt_requests: Mutex<Vec<PostReceiptRequest>>,
    pub post_receipt_result: Mutex<Result<CustomerInfo, BackendError>>,
    pub post_offer_requests: Mutex<Vec<PostOfferRequest>>,
    pub post_offer_result: Mutex<Result<SignedData, BackendError>>,
    /// When set, `post_receipt` records the request and then waits for a
    /// notification before returning.
    pub post_receipt_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            post_receipt_requests: Mutex::new(vec![]),
            post_receipt_result: Mutex::new(Ok(customer_info("CI1"))),
            post_offer_requests: Mutex::new(vec![]),
            post_offer_result: Mutex::new(Ok(signed_data("offerid1"))),
            post_receipt_gate: Mutex::new(None),
        })
    }

    pub fn post_receipt_count(&self) -> usize {
        self.post_receipt_requests.lock().unwrap().len()
    }

    pub fn last_post_receipt(&self) -> PostReceiptRequest {
        self.post_receipt_requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no receipt was posted")
    }

    pub fn post_offer_count(&self) -> usize {
        self.post_offer_requests.lock().unwrap().len()
    }

    pub fn set_post_receipt_result(&self, result: Result<CustomerInfo, BackendError>) {
        *self.post_receipt_result.lock().unwrap() = result;
    }

    pub fn gate_post_receipt(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.post_receipt_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl BackendDatasource for MockBackend {
    async fn post_receipt(
        &self,
        request: PostReceiptRequest,
    ) -> Result<CustomerInfo, BackendError> {
        self.post_receipt_requests.lock().unwrap().push(request);
        let gate = self.post_receipt_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.post_receipt_result.lock().unwrap().clone()
    }

    async fn post_offer(&self, request: PostOfferRequest) -> Result<SignedData, BackendError> {
        self.post_offer_requests.lock().unwrap().push(request);
        self.post_offer_result.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Receipt
// ---------------------------------------------------------------------------

pub struct MockReceiptFetcher {
    pub data: Mutex<Option<Vec<u8>>>,
    pub policies: Mutex<Vec<ReceiptRefreshPolicy>>,
}

impl MockReceiptFetcher {
    pub fn new(data: Option<&[u8]>) -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(data.map(<[u8]>::to_vec)),
            policies: Mutex::new(vec![]),
        })
    }

    pub fn policies(&self) -> Vec<ReceiptRefreshPolicy> {
        self.policies.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReceiptFetcher for MockReceiptFetcher {
    async fn receipt_data(&self, refresh_policy: ReceiptRefreshPolicy) -> Option<Vec<u8>> {
        self.policies.lock().unwrap().push(refresh_policy);
        self.data.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Payment queue
// ---------------------------------------------------------------------------

/// Calls the registered observer synchronously from `add_payment`, the way a
/// store that completes instantly would.
pub struct MockPaymentQueue {
    pub observer: Mutex<Option<Arc<dyn PaymentQueueObserver>>>,
    pub payments: Mutex<Vec<Sk1Payment>>,
    pub finished: Mutex<Vec<StoreTransaction>>,
    /// State reported for the next payment, or `None` to stay silent.
    pub respond_with: Mutex<Option<Sk1TransactionState>>,
    pub failure: Mutex<Option<Sk1TransactionError>>,
    pub next_transaction_identifier: Mutex<String>,
}

impl MockPaymentQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            observer: Mutex::new(None),
            payments: Mutex::new(vec![]),
            finished: Mutex::new(vec![]),
            respond_with: Mutex::new(Some(Sk1TransactionState::Purchased)),
            failure: Mutex::new(None),
            next_transaction_identifier: Mutex::new("T1".to_string()),
        })
    }

    pub fn respond_with(&self, state: Option<Sk1TransactionState>) {
        *self.respond_with.lock().unwrap() = state;
    }

    pub fn fail_with(&self, code: Sk1ErrorCode, message: Option<&str>) {
        *self.respond_with.lock().unwrap() = Some(Sk1TransactionState::Failed);
        *self.failure.lock().unwrap() = Some(Sk1TransactionError {
            code,
            message: message.map(str::to_string),
        });
    }

    /// Reports transactions as if the queue had observed them on its own.
    pub fn deliver(&self, transactions: Vec<Sk1PaymentTransaction>) {
        let observer = self.observer.lock().unwrap().clone();
        if let Some(observer) = observer {
            observer.updated_transactions(transactions);
        }
    }

    pub fn has_observer(&self) -> bool {
        self.observer.lock().unwrap().is_some()
    }

    pub fn payment_count(&self) -> usize {
        self.payments.lock().unwrap().len()
    }

    pub fn finished_identifiers(&self) -> Vec<Option<String>> {
        self.finished
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.transaction_identifier.clone())
            .collect()
    }
}

impl Sk1PaymentQueueDatasource for MockPaymentQueue {
    fn set_observer(&self, observer: Option<Arc<dyn PaymentQueueObserver>>) {
        *self.observer.lock().unwrap() = observer;
    }

    fn add_payment(&self, payment: Sk1Payment) {
        let product_identifier = payment.product_identifier.clone();
        self.payments.lock().unwrap().push(payment);
        let Some(state) = *self.respond_with.lock().unwrap() else {
            return;
        };
        let transaction_identifier = match state {
            Sk1TransactionState::Failed => None,
            _ => Some(self.next_transaction_identifier.lock().unwrap().clone()),
        };
        let error = match state {
            Sk1TransactionState::Failed => self.failure.lock().unwrap().clone(),
            _ => None,
        };
        self.deliver(vec![Sk1PaymentTransaction {
            transaction_identifier,
            product_identifier,
            transaction_date: None,
            quantity: 1,
            state,
            error,
        }]);
    }

    fn finish_transaction(&self, transaction: &StoreTransaction) {
        self.finished.lock().unwrap().push(transaction.clone());
    }
}

// ---------------------------------------------------------------------------
// StoreKit 2
// ---------------------------------------------------------------------------

pub struct MockSk2Store {
    pub transaction_updates_calls: AtomicUsize,
    pub stream_senders: Mutex<Vec<mpsc::UnboundedSender<Sk2VerificationResult>>>,
    pub purchase_result: Mutex<Result<Sk2PurchaseResult, PurchasesError>>,
    pub purchase_options: Mutex<Vec<Sk2PurchaseOptions>>,
    pub finished: Mutex<Vec<StoreTransaction>>,
    /// Also emit successful purchases on the update stream.
    pub echo_purchases_on_stream: Mutex<bool>,
    /// When set, `purchase` records the options and then waits for a
    /// notification before returning.
    pub purchase_gate: Mutex<Option<Arc<Notify>>>,
}

impl MockSk2Store {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            transaction_updates_calls: AtomicUsize::new(0),
            stream_senders: Mutex::new(vec![]),
            purchase_result: Mutex::new(Ok(Sk2PurchaseResult::UserCancelled)),
            purchase_options: Mutex::new(vec![]),
            finished: Mutex::new(vec![]),
            echo_purchases_on_stream: Mutex::new(false),
            purchase_gate: Mutex::new(None),
        })
    }

    pub fn gate_purchase(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.purchase_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn purchase_count(&self) -> usize {
        self.purchase_options.lock().unwrap().len()
    }

    pub fn transaction_updates_call_count(&self) -> usize {
        self.transaction_updates_calls.load(Ordering::SeqCst)
    }

    pub fn set_purchase_result(&self, result: Result<Sk2PurchaseResult, PurchasesError>) {
        *self.purchase_result.lock().unwrap() = result;
    }

    pub fn emit(&self, update: Sk2VerificationResult) {
        for sender in self.stream_senders.lock().unwrap().iter() {
            let _ = sender.send(update.clone());
        }
    }

    pub fn finished_identifiers(&self) -> Vec<Option<String>> {
        self.finished
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.transaction_identifier.clone())
            .collect()
    }
}

#[async_trait]
impl Sk2StoreDatasource for MockSk2Store {
    async fn purchase(
        &self,
        _product: &Sk2Product,
        options: Sk2PurchaseOptions,
    ) -> Result<Sk2PurchaseResult, PurchasesError> {
        self.purchase_options.lock().unwrap().push(options);
        let gate = self.purchase_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let result = self.purchase_result.lock().unwrap().clone();
        if *self.echo_purchases_on_stream.lock().unwrap() {
            if let Ok(Sk2PurchaseResult::Success(verification)) = &result {
                self.emit(verification.clone());
            }
        }
        result
    }

    async fn finish(&self, transaction: &StoreTransaction) {
        self.finished.lock().unwrap().push(transaction.clone());
    }

    fn transaction_updates(&self) -> BoxStream<'static, Sk2VerificationResult> {
        self.transaction_updates_calls.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.stream_senders.lock().unwrap().push(sender);
        UnboundedReceiverStream::new(receiver).boxed()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub struct MockManageSubscriptions {
    pub result: Mutex<Result<(), PurchasesError>>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ManageSubscriptionsHelper for MockManageSubscriptions {
    async fn show_manage_subscriptions(&self) -> Result<(), PurchasesError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result.lock().unwrap().clone()
    }
}

pub struct MockBeginRefundRequest {
    pub result: Mutex<Result<RefundRequestStatus, PurchasesError>>,
    pub targets: Mutex<Vec<RefundRequestTarget>>,
}

#[async_trait]
impl BeginRefundRequestHelper for MockBeginRefundRequest {
    async fn begin_refund_request(
        &self,
        target: RefundRequestTarget,
    ) -> Result<RefundRequestStatus, PurchasesError> {
        self.targets.lock().unwrap().push(target);
        self.result.lock().unwrap().clone()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct TestContext {
    pub orchestrator: PurchasesOrchestrator,
    pub backend: Arc<MockBackend>,
    pub receipt_fetcher: Arc<MockReceiptFetcher>,
    pub payment_queue: Arc<MockPaymentQueue>,
    pub store: Arc<MockSk2Store>,
    pub manage_subscriptions: Arc<MockManageSubscriptions>,
    pub refund: Arc<MockBeginRefundRequest>,
}

impl TestContext {
    pub fn new(config: PurchasesConfig) -> Self {
        init_tracing();
        let backend = MockBackend::new();
        let receipt_fetcher = MockReceiptFetcher::new(Some(&b"receipt-data"[..]));
        let payment_queue = MockPaymentQueue::new();
        let store = MockSk2Store::new();
        let manage_subscriptions = Arc::new(MockManageSubscriptions {
            result: Mutex::new(Ok(())),
            calls: AtomicUsize::new(0),
        });
        let refund = Arc::new(MockBeginRefundRequest {
            result: Mutex::new(Ok(RefundRequestStatus::Success)),
            targets: Mutex::new(vec![]),
        });
        let orchestrator = PurchasesOrchestrator::new(
            config,
            OrchestratorDatasources {
                backend: backend.clone(),
                receipt_fetcher: receipt_fetcher.clone(),
                payment_queue: payment_queue.clone(),
                store: store.clone(),
                customer_info_cache: Arc::new(InMemoryCustomerInfoCache::new()),
                manage_subscriptions_helper: manage_subscriptions.clone(),
                begin_refund_request_helper: refund.clone(),
            },
        );
        Self {
            orchestrator,
            backend,
            receipt_fetcher,
            payment_queue,
            store,
            manage_subscriptions,
            refund,
        }
    }

    pub fn default_config() -> PurchasesConfig {
        PurchasesConfig::new("api-key", "app-user-1")
    }
}

/// Polls `condition` until it holds, failing the test after a second.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Gives spawned tasks a chance to run before asserting that something did
/// not happen.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

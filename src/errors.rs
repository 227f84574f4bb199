use thiserror::Error;

/// Failure reported by the entitlement backend.
///
/// `retryable` is true for transport failures and 5xx responses. The
/// orchestrator never retries on its own; the flag is informational for the
/// caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    /// Backend-specific error code, when the response body carried one.
    pub code: Option<i64>,
    /// HTTP status, when a response was received at all.
    pub status: Option<u16>,
    pub retryable: bool,
}

impl BackendError {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            code: None,
            status: None,
            retryable,
        }
    }

    pub fn with_status(message: impl Into<String>, status: u16, code: Option<i64>) -> Self {
        Self {
            message: message.into(),
            code,
            status: Some(status),
            retryable: status >= 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PurchasesError {
    #[error("The receipt is missing.")]
    MissingReceiptFile,

    #[error("Error verifying or signing the promotional offer: {message}")]
    PromotionalOffer { message: String },

    #[error("There was an error communicating with the backend: {0}")]
    Backend(#[from] BackendError),

    /// Only used between the platform adapters and the resolution layer.
    /// Callers observe cancellation as `user_cancelled == true` instead.
    #[error("Purchase was cancelled.")]
    PurchaseCancelled,

    #[error("Unknown error during purchase.{}", fmt_detail(.message))]
    UnknownPurchase { message: Option<String> },

    #[error("There was a problem with the store: {message}")]
    StoreProblem { message: String },

    #[error("The payment is pending.")]
    PaymentPending,

    #[error("A purchase of '{product_identifier}' is already in progress.")]
    OperationAlreadyInProgress { product_identifier: String },

    #[error("Customer info error: {message}")]
    CustomerInfo { message: String },

    #[error("Error when trying to begin refund request: {message}")]
    BeginRefundRequest { message: String },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },
}

impl PurchasesError {
    pub fn promotional_offer(message: impl Into<String>) -> Self {
        Self::PromotionalOffer {
            message: message.into(),
        }
    }

    pub fn store_problem(message: impl Into<String>) -> Self {
        Self::StoreProblem {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

fn fmt_detail(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(" {m}"),
        None => String::new(),
    }
}

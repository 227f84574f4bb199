use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{
    domain::entities::customer_info::{
        CustomerInfo, EntitlementInfo, OtherPurchaseInfo, SubscriptionInfo,
    },
    errors::{BackendError, PurchasesError},
};

/// Response body of `GET /subscribers/{app_user_id}` and `POST /receipts`.
#[derive(Debug, Deserialize)]
pub(crate) struct CustomerInfoResponseModel {
    pub(crate) request_date: DateTime<Utc>,
    pub(crate) subscriber: SubscriberModel,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriberModel {
    pub(crate) first_seen: DateTime<Utc>,
    #[serde(default)]
    pub(crate) original_app_user_id: String,
    pub(crate) management_url: Option<String>,
    #[serde(default)]
    pub(crate) subscriptions: BTreeMap<String, SubscriptionModel>,
    #[serde(default)]
    pub(crate) other_purchases: BTreeMap<String, OtherPurchaseModel>,
    #[serde(default)]
    pub(crate) entitlements: BTreeMap<String, EntitlementModel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubscriptionModel {
    pub(crate) purchase_date: Option<DateTime<Utc>>,
    pub(crate) original_purchase_date: Option<DateTime<Utc>>,
    pub(crate) expires_date: Option<DateTime<Utc>>,
    pub(crate) period_type: Option<String>,
    pub(crate) store: Option<String>,
    #[serde(default)]
    pub(crate) is_sandbox: bool,
    pub(crate) unsubscribe_detected_at: Option<DateTime<Utc>>,
    pub(crate) billing_issues_detected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OtherPurchaseModel {
    pub(crate) purchase_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EntitlementModel {
    pub(crate) product_identifier: String,
    pub(crate) purchase_date: Option<DateTime<Utc>>,
    pub(crate) expires_date: Option<DateTime<Utc>>,
}

impl From<CustomerInfoResponseModel> for CustomerInfo {
    fn from(m: CustomerInfoResponseModel) -> Self {
        let s = m.subscriber;
        CustomerInfo {
            request_date: m.request_date,
            first_seen: s.first_seen,
            original_app_user_id: s.original_app_user_id,
            management_url: s.management_url,
            subscriptions: s
                .subscriptions
                .into_iter()
                .map(|(id, sub)| {
                    (
                        id,
                        SubscriptionInfo {
                            purchase_date: sub.purchase_date,
                            original_purchase_date: sub.original_purchase_date,
                            expires_date: sub.expires_date,
                            period_type: sub.period_type,
                            store: sub.store,
                            is_sandbox: sub.is_sandbox,
                            unsubscribe_detected_at: sub.unsubscribe_detected_at,
                            billing_issues_detected_at: sub.billing_issues_detected_at,
                        },
                    )
                })
                .collect(),
            other_purchases: s
                .other_purchases
                .into_iter()
                .map(|(id, p)| {
                    (
                        id,
                        OtherPurchaseInfo {
                            purchase_date: p.purchase_date,
                        },
                    )
                })
                .collect(),
            entitlements: s
                .entitlements
                .into_iter()
                .map(|(id, e)| {
                    (
                        id,
                        EntitlementInfo {
                            product_identifier: e.product_identifier,
                            purchase_date: e.purchase_date,
                            expires_date: e.expires_date,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl CustomerInfo {
    /// Parses a backend customer info response body.
    pub fn from_json(body: &str) -> Result<Self, PurchasesError> {
        let model: CustomerInfoResponseModel = serde_json::from_str(body).map_err(|e| {
            BackendError::new(format!("Failed to parse customer info: {e}"), false)
        })?;
        Ok(model.into())
    }
}

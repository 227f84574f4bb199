use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Snapshot of a subscriber's entitlement state as returned by the backend.
///
/// Immutable: every successful receipt post replaces the cached snapshot
/// wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerInfo {
    pub request_date: DateTime<Utc>,
    pub first_seen: DateTime<Utc>,
    pub original_app_user_id: String,
    pub management_url: Option<String>,
    /// Keyed by product identifier.
    pub subscriptions: BTreeMap<String, SubscriptionInfo>,
    /// Non-subscription purchases, keyed by product identifier.
    pub other_purchases: BTreeMap<String, OtherPurchaseInfo>,
    /// Keyed by entitlement identifier.
    pub entitlements: BTreeMap<String, EntitlementInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionInfo {
    pub purchase_date: Option<DateTime<Utc>>,
    pub original_purchase_date: Option<DateTime<Utc>>,
    pub expires_date: Option<DateTime<Utc>>,
    pub period_type: Option<String>,
    pub store: Option<String>,
    pub is_sandbox: bool,
    pub unsubscribe_detected_at: Option<DateTime<Utc>>,
    pub billing_issues_detected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OtherPurchaseInfo {
    pub purchase_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntitlementInfo {
    pub product_identifier: String,
    pub purchase_date: Option<DateTime<Utc>>,
    pub expires_date: Option<DateTime<Utc>>,
}

impl EntitlementInfo {
    /// Lifetime entitlements have no expiration date and are always active.
    pub fn is_active_at(&self, date: DateTime<Utc>) -> bool {
        self.expires_date.map(|expires| expires > date).unwrap_or(true)
    }
}

impl CustomerInfo {
    /// Entitlements active as of the backend's response date, so the result
    /// doesn't drift with the local clock.
    pub fn active_entitlements(&self) -> Vec<&str> {
        self.entitlements
            .iter()
            .filter(|(_, e)| e.is_active_at(self.request_date))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    pub fn active_subscriptions(&self) -> Vec<&str> {
        self.subscriptions
            .iter()
            .filter(|(_, s)| {
                s.expires_date
                    .map(|expires| expires > self.request_date)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

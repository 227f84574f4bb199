use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use crate::domain::entities::customer_info::CustomerInfo;

/// Last known entitlement snapshot per app user.
pub trait CustomerInfoCacheDatasource: Send + Sync {
    fn cached_customer_info(&self, app_user_id: &str) -> Option<CustomerInfo>;

    /// Replaces the snapshot for `app_user_id`.
    fn cache_customer_info(&self, app_user_id: &str, customer_info: CustomerInfo);
}

#[derive(Default)]
pub struct InMemoryCustomerInfoCache {
    entries: RwLock<HashMap<String, CustomerInfo>>,
}

impl InMemoryCustomerInfoCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CustomerInfoCacheDatasource for InMemoryCustomerInfoCache {
    fn cached_customer_info(&self, app_user_id: &str) -> Option<CustomerInfo> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(app_user_id)
            .cloned()
    }

    fn cache_customer_info(&self, app_user_id: &str, customer_info: CustomerInfo) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(app_user_id.to_string(), customer_info);
    }
}

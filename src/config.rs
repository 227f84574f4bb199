use serde::Deserialize;

use crate::errors::PurchasesError;

pub const DEFAULT_BACKEND_BASE_URL: &str = "https://api.revenuecat.com/v1";

const ENV_API_KEY: &str = "PURCHASES_API_KEY";
const ENV_APP_USER_ID: &str = "PURCHASES_APP_USER_ID";
const ENV_BACKEND_BASE_URL: &str = "PURCHASES_BACKEND_BASE_URL";
const ENV_FINISH_TRANSACTIONS: &str = "PURCHASES_FINISH_TRANSACTIONS";
const ENV_STORE_KIT_2_SETTING: &str = "PURCHASES_STORE_KIT_2_SETTING";

/// Controls whether the StoreKit 2 transaction stream is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKit2Setting {
    Disabled,
    /// StoreKit 2 may be used for product lookups, but transactions are only
    /// observed through the legacy payment queue.
    #[default]
    EnabledOnlyForOptimizations,
    EnabledForCompatibleDevices,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchasesConfig {
    pub api_key: String,
    pub app_user_id: String,
    #[serde(default = "default_backend_base_url")]
    pub backend_base_url: String,
    /// When false the host app finishes transactions itself (observer mode).
    #[serde(default = "default_finish_transactions")]
    pub finish_transactions: bool,
    #[serde(default)]
    pub store_kit_2_setting: StoreKit2Setting,
}

fn default_backend_base_url() -> String {
    DEFAULT_BACKEND_BASE_URL.to_string()
}

fn default_finish_transactions() -> bool {
    true
}

impl PurchasesConfig {
    pub fn new(api_key: impl Into<String>, app_user_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            app_user_id: app_user_id.into(),
            backend_base_url: default_backend_base_url(),
            finish_transactions: default_finish_transactions(),
            store_kit_2_setting: StoreKit2Setting::default(),
        }
    }

    pub fn with_finish_transactions(mut self, finish_transactions: bool) -> Self {
        self.finish_transactions = finish_transactions;
        self
    }

    pub fn with_store_kit_2_setting(mut self, setting: StoreKit2Setting) -> Self {
        self.store_kit_2_setting = setting;
        self
    }

    pub fn with_backend_base_url(mut self, url: impl Into<String>) -> Self {
        self.backend_base_url = url.into();
        self
    }

    pub fn from_json(json: &str) -> Result<Self, PurchasesError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            PurchasesError::configuration(format!("failed to parse configuration: {e}"))
        })?;
        config.validate()
    }

    /// Reads `PURCHASES_*` environment variables. Only the API key and app
    /// user ID are required.
    pub fn from_env() -> Result<Self, PurchasesError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PurchasesError> {
        let required = |key: &str| {
            lookup(key)
                .ok_or_else(|| PurchasesError::configuration(format!("{key} is not set")))
        };
        let mut config = Self::new(required(ENV_API_KEY)?, required(ENV_APP_USER_ID)?);
        if let Some(url) = lookup(ENV_BACKEND_BASE_URL) {
            config.backend_base_url = url;
        }
        if let Some(value) = lookup(ENV_FINISH_TRANSACTIONS) {
            config.finish_transactions = value.parse().map_err(|_| {
                PurchasesError::configuration(format!(
                    "{ENV_FINISH_TRANSACTIONS} must be 'true' or 'false', got '{value}'"
                ))
            })?;
        }
        if let Some(value) = lookup(ENV_STORE_KIT_2_SETTING) {
            config.store_kit_2_setting = serde_json::from_value(serde_json::Value::String(
                value.clone(),
            ))
            .map_err(|_| {
                PurchasesError::configuration(format!(
                    "unrecognized {ENV_STORE_KIT_2_SETTING} '{value}'"
                ))
            })?;
        }
        config.validate()
    }

    pub(crate) fn validate(self) -> Result<Self, PurchasesError> {
        if self.api_key.trim().is_empty() {
            return Err(PurchasesError::configuration("api_key must not be empty"));
        }
        if self.app_user_id.trim().is_empty() {
            return Err(PurchasesError::configuration(
                "app_user_id must not be empty",
            ));
        }
        Ok(self)
    }

    /// Observer mode: the host app, not this SDK, finishes transactions.
    pub fn observer_mode(&self) -> bool {
        !self.finish_transactions
    }

    pub fn listens_for_store_kit_2_transactions(&self) -> bool {
        self.store_kit_2_setting == StoreKit2Setting::EnabledForCompatibleDevices
    }
}

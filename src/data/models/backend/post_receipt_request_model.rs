use serde::Serialize;
use serde_repr::Serialize_repr;
use serde_with::skip_serializing_none;

use crate::{
    data::datasources::{backend_datasource::PostReceiptRequest, utils::encode_fetch_token},
    domain::entities::store_product::PaymentMode,
};

/// Body of `POST /receipts`.
#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub(crate) struct PostReceiptRequestModel {
    /// Base64-encoded receipt.
    pub(crate) fetch_token: String,
    pub(crate) app_user_id: String,
    pub(crate) is_restore: bool,
    pub(crate) observer_mode: bool,
    pub(crate) product_id: Option<String>,
    /// Price in the store's currency units, not micros.
    pub(crate) price: Option<f64>,
    pub(crate) currency: Option<String>,
    pub(crate) subscription_group_id: Option<String>,
    pub(crate) presented_offering_identifier: Option<String>,
    pub(crate) offers: Option<Vec<OfferModel>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OfferModel {
    pub(crate) offer_identifier: String,
    pub(crate) price: f64,
    pub(crate) payment_mode: PaymentModeModel,
}

/// Integer encoding the backend uses for discount payment modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr)]
#[repr(u8)]
pub(crate) enum PaymentModeModel {
    PayAsYouGo = 0,
    PayUpFront = 1,
    FreeTrial = 2,
}

impl From<PaymentMode> for PaymentModeModel {
    fn from(mode: PaymentMode) -> Self {
        match mode {
            PaymentMode::PayAsYouGo => PaymentModeModel::PayAsYouGo,
            PaymentMode::PayUpFront => PaymentModeModel::PayUpFront,
            PaymentMode::FreeTrial => PaymentModeModel::FreeTrial,
        }
    }
}

pub(crate) fn micros_to_price(micros: i64) -> f64 {
    micros as f64 / 1_000_000.0
}

impl From<&PostReceiptRequest> for PostReceiptRequestModel {
    fn from(r: &PostReceiptRequest) -> Self {
        let product = r.product_data.as_ref();
        PostReceiptRequestModel {
            fetch_token: encode_fetch_token(&r.receipt_data),
            app_user_id: r.app_user_id.clone(),
            is_restore: r.is_restore,
            observer_mode: r.observer_mode,
            product_id: product.map(|p| p.product_identifier.clone()),
            price: product.and_then(|p| p.price_micros).map(micros_to_price),
            currency: product.and_then(|p| p.currency_code.clone()),
            subscription_group_id: product.and_then(|p| p.subscription_group_identifier.clone()),
            presented_offering_identifier: r.offering_identifier.clone(),
            offers: r.promotional_offer.as_ref().map(|offer| {
                vec![OfferModel {
                    offer_identifier: offer.signed_data.identifier.clone(),
                    price: micros_to_price(offer.discount.price_micros),
                    payment_mode: offer.discount.payment_mode.into(),
                }]
            }),
        }
    }
}

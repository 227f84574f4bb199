use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /offers`.
#[derive(Debug, Serialize)]
pub(crate) struct PostOfferRequestModel {
    pub(crate) app_user_id: String,
    pub(crate) fetch_token: String,
    pub(crate) generate_offers: Vec<GenerateOfferModel>,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateOfferModel {
    pub(crate) offer_id: String,
    pub(crate) product_id: String,
    pub(crate) subscription_group: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PostOfferResponseModel {
    pub(crate) offers: Vec<OfferSignatureModel>,
}

/// One entry per requested offer. Exactly one of `signature_data` and
/// `signature_error` is expected to be present.
#[derive(Debug, Deserialize)]
pub(crate) struct OfferSignatureModel {
    pub(crate) offer_id: String,
    pub(crate) key_id: Option<String>,
    pub(crate) signature_data: Option<SignatureDataModel>,
    pub(crate) signature_error: Option<SignatureErrorModel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignatureDataModel {
    pub(crate) nonce: Uuid,
    pub(crate) signature: String,
    pub(crate) timestamp: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SignatureErrorModel {
    pub(crate) code: Option<i64>,
    pub(crate) message: String,
}

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    data::{
        datasources::utils::{decode_body, encode_fetch_token, error_from_response},
        models::backend::{
            customer_info_response_model::CustomerInfoResponseModel,
            post_offer_model::{GenerateOfferModel, PostOfferRequestModel, PostOfferResponseModel},
            post_receipt_request_model::PostReceiptRequestModel,
        },
    },
    domain::entities::{
        customer_info::CustomerInfo, promotional_offer::PromotionalOffer,
        promotional_offer::SignedData,
    },
    errors::BackendError,
};

/// Purchase context attached to a receipt post.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRequestData {
    pub product_identifier: String,
    /// Unknown for transactions observed outside of a purchase call.
    pub price_micros: Option<i64>,
    pub currency_code: Option<String>,
    pub subscription_group_identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostReceiptRequest {
    pub receipt_data: Vec<u8>,
    pub app_user_id: String,
    pub is_restore: bool,
    pub observer_mode: bool,
    pub product_data: Option<ProductRequestData>,
    pub offering_identifier: Option<String>,
    pub promotional_offer: Option<PromotionalOffer>,
}

impl PostReceiptRequest {
    /// Identifier of the signed offer included in this post, if any.
    pub fn offer_identifier(&self) -> Option<&str> {
        self.promotional_offer
            .as_ref()
            .map(|o| o.signed_data.identifier.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOfferRequest {
    pub app_user_id: String,
    pub receipt_data: Vec<u8>,
    pub product_identifier: String,
    pub offer_identifier: String,
    pub subscription_group_identifier: String,
}

#[async_trait]
pub trait BackendDatasource: Send + Sync {
    /// Post Receipt:
    ///
    /// Sends proof of purchase to the backend and returns the subscriber's
    /// updated entitlement state. Retries are left to the caller.
    async fn post_receipt(&self, request: PostReceiptRequest)
        -> Result<CustomerInfo, BackendError>;

    /// Post Offer:
    ///
    /// Requests a signature for a promotional offer.
    async fn post_offer(&self, request: PostOfferRequest) -> Result<SignedData, BackendError>;
}

pub struct BackendDatasourceImpl {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[async_trait]
impl BackendDatasource for BackendDatasourceImpl {
    async fn post_receipt(
        &self,
        request: PostReceiptRequest,
    ) -> Result<CustomerInfo, BackendError> {
        let url = format!("{}/receipts", self.base_url);
        let body = PostReceiptRequestModel::from(&request);
        let m: CustomerInfoResponseModel = self.callout(&url, &body, "PostReceipt").await?;
        Ok(m.into())
    }

    async fn post_offer(&self, request: PostOfferRequest) -> Result<SignedData, BackendError> {
        let url = format!("{}/offers", self.base_url);
        let body = PostOfferRequestModel {
            app_user_id: request.app_user_id.clone(),
            fetch_token: encode_fetch_token(&request.receipt_data),
            generate_offers: vec![GenerateOfferModel {
                offer_id: request.offer_identifier.clone(),
                product_id: request.product_identifier.clone(),
                subscription_group: request.subscription_group_identifier.clone(),
            }],
        };
        let m: PostOfferResponseModel = self.callout(&url, &body, "PostOffer").await?;
        signed_data_from_response(m, &request.offer_identifier)
    }
}

impl BackendDatasourceImpl {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn callout<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        function_name: &str,
    ) -> Result<T, BackendError> {
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                BackendError::new(format!("{function_name} failed to send; {e}"), true)
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            BackendError::new(format!("{function_name} response unreadable; {e}"), true)
        })?;

        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &text, function_name));
        }
        decode_body(&text, function_name)
    }
}

fn signed_data_from_response(
    m: PostOfferResponseModel,
    offer_identifier: &str,
) -> Result<SignedData, BackendError> {
    let offer = m
        .offers
        .into_iter()
        .find(|o| o.offer_id == offer_identifier)
        .ok_or_else(|| {
            BackendError::new(
                format!("PostOffer response did not include offer '{offer_identifier}'"),
                false,
            )
        })?;
    if let Some(err) = offer.signature_error {
        return Err(BackendError {
            message: err.message,
            code: err.code,
            status: None,
            retryable: false,
        });
    }
    let data = offer.signature_data.ok_or_else(|| {
        BackendError::new("PostOffer response did not include signature data", false)
    })?;
    Ok(SignedData {
        identifier: offer.offer_id,
        key_identifier: offer.key_id.unwrap_or_default(),
        nonce: data.nonce,
        signature: data.signature,
        timestamp: data.timestamp,
    })
}

use uuid::Uuid;

use super::store_product::StoreProductDiscount;

/// Backend-issued signature authorizing a promotional discount.
///
/// Single-use and time-bound: a fresh one is requested for every purchase
/// attempt and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedData {
    /// The offer identifier the signature was issued for.
    pub identifier: String,
    pub key_identifier: String,
    pub nonce: Uuid,
    pub signature: String,
    /// Milliseconds since the epoch at which the signature was generated.
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromotionalOffer {
    pub discount: StoreProductDiscount,
    pub signed_data: SignedData,
}

impl PromotionalOffer {
    /// A signature is usable when it is non-empty and was issued for this
    /// offer's discount.
    pub(crate) fn is_signed_for_discount(&self) -> bool {
        !self.signed_data.signature.is_empty()
            && self.discount.offer_identifier.as_deref()
                == Some(self.signed_data.identifier.as_str())
    }
}

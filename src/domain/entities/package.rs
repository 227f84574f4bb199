use super::store_product::StoreProduct;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageType {
    Unknown,
    Custom,
    Lifetime,
    Annual,
    SixMonth,
    ThreeMonth,
    TwoMonth,
    Monthly,
    Weekly,
}

/// A product as presented inside an offering. The offering identifier is
/// forwarded to the backend with the receipt so that the purchase can be
/// attributed to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub identifier: String,
    pub package_type: PackageType,
    pub store_product: StoreProduct,
    pub offering_identifier: String,
}

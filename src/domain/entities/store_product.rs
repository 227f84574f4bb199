#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKitVersion {
    StoreKit1,
    StoreKit2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductCategory {
    Subscription,
    NonSubscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionPeriod {
    pub value: u32,
    pub unit: PeriodUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    /// The customer pays over one or more billing periods.
    PayAsYouGo,
    /// The customer pays once, up front.
    PayUpFront,
    FreeTrial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscountType {
    Introductory,
    Promotional,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreProductDiscount {
    /// Identifier configured for promotional offers. Introductory discounts
    /// don't have one.
    pub offer_identifier: Option<String>,
    pub currency_code: Option<String>,
    pub price_micros: i64,
    pub payment_mode: PaymentMode,
    pub subscription_period: SubscriptionPeriod,
    pub number_of_periods: u32,
    pub discount_type: DiscountType,
}

impl StoreProductDiscount {
    /// Whether the price agrees with the payment mode. Free trials cost
    /// nothing; paid modes must charge something.
    pub(crate) fn is_payment_mode_consistent(&self) -> bool {
        match self.payment_mode {
            PaymentMode::FreeTrial => self.price_micros == 0,
            PaymentMode::PayAsYouGo | PaymentMode::PayUpFront => self.price_micros > 0,
        }
    }
}

/// Product as surfaced by the original payment-queue API.
///
/// There is no explicit product type; subscriptions are recognized by the
/// presence of a subscription period.
#[derive(Debug, Clone, PartialEq)]
pub struct Sk1Product {
    pub product_identifier: String,
    pub localized_title: String,
    pub price_micros: i64,
    pub currency_code: Option<String>,
    pub subscription_group_identifier: Option<String>,
    pub subscription_period: Option<SubscriptionPeriod>,
    pub introductory_discount: Option<StoreProductDiscount>,
    pub discounts: Vec<StoreProductDiscount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sk2ProductType {
    Consumable,
    NonConsumable,
    AutoRenewable,
    NonRenewable,
}

/// Product as surfaced by the async StoreKit 2 API.
#[derive(Debug, Clone, PartialEq)]
pub struct Sk2Product {
    pub id: String,
    pub display_name: String,
    pub product_type: Sk2ProductType,
    pub price_micros: i64,
    pub currency_code: String,
    pub subscription_group_id: Option<String>,
    pub subscription_period: Option<SubscriptionPeriod>,
    pub introductory_offer: Option<StoreProductDiscount>,
    pub promotional_offers: Vec<StoreProductDiscount>,
}

/// A product from either platform generation. Purchase submission dispatches
/// on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreProduct {
    StoreKit1(Sk1Product),
    StoreKit2(Sk2Product),
}

impl StoreProduct {
    pub fn product_identifier(&self) -> &str {
        match self {
            StoreProduct::StoreKit1(p) => &p.product_identifier,
            StoreProduct::StoreKit2(p) => &p.id,
        }
    }

    pub fn localized_title(&self) -> &str {
        match self {
            StoreProduct::StoreKit1(p) => &p.localized_title,
            StoreProduct::StoreKit2(p) => &p.display_name,
        }
    }

    pub fn price_micros(&self) -> i64 {
        match self {
            StoreProduct::StoreKit1(p) => p.price_micros,
            StoreProduct::StoreKit2(p) => p.price_micros,
        }
    }

    pub fn currency_code(&self) -> Option<&str> {
        match self {
            StoreProduct::StoreKit1(p) => p.currency_code.as_deref(),
            StoreProduct::StoreKit2(p) => Some(&p.currency_code),
        }
    }

    pub fn subscription_group_identifier(&self) -> Option<&str> {
        match self {
            StoreProduct::StoreKit1(p) => p.subscription_group_identifier.as_deref(),
            StoreProduct::StoreKit2(p) => p.subscription_group_id.as_deref(),
        }
    }

    pub fn subscription_period(&self) -> Option<SubscriptionPeriod> {
        match self {
            StoreProduct::StoreKit1(p) => p.subscription_period,
            StoreProduct::StoreKit2(p) => p.subscription_period,
        }
    }

    pub fn introductory_discount(&self) -> Option<&StoreProductDiscount> {
        match self {
            StoreProduct::StoreKit1(p) => p.introductory_discount.as_ref(),
            StoreProduct::StoreKit2(p) => p.introductory_offer.as_ref(),
        }
    }

    /// Promotional discounts configured for the product.
    pub fn discounts(&self) -> &[StoreProductDiscount] {
        match self {
            StoreProduct::StoreKit1(p) => &p.discounts,
            StoreProduct::StoreKit2(p) => &p.promotional_offers,
        }
    }

    pub fn product_category(&self) -> ProductCategory {
        match self {
            StoreProduct::StoreKit1(p) => match p.subscription_period {
                Some(_) => ProductCategory::Subscription,
                None => ProductCategory::NonSubscription,
            },
            StoreProduct::StoreKit2(p) => match p.product_type {
                Sk2ProductType::AutoRenewable | Sk2ProductType::NonRenewable => {
                    ProductCategory::Subscription
                }
                Sk2ProductType::Consumable | Sk2ProductType::NonConsumable => {
                    ProductCategory::NonSubscription
                }
            },
        }
    }

    pub fn store_kit_version(&self) -> StoreKitVersion {
        match self {
            StoreProduct::StoreKit1(_) => StoreKitVersion::StoreKit1,
            StoreProduct::StoreKit2(_) => StoreKitVersion::StoreKit2,
        }
    }
}

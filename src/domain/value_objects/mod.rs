//! Value Objects for the storefront

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StorefrontError};

/// Carrier-facing SKU derived from a catalog id
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    pub fn for_product(product_id: i64) -> Self { Self(format!("SKU-{}", product_id)) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_uppercase() } }
    pub fn inr(amount: Decimal) -> Self { Self::new(amount, "INR") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }

    /// Amount in the currency's smallest unit (paise for INR), as payment gateways expect.
    pub fn minor_units(&self) -> Result<i64> {
        let scaled = (self.amount * Decimal::ONE_HUNDRED).round();
        scaled.to_i64().ok_or_else(|| StorefrontError::Validation(format!("amount {} out of range", self.amount)))
    }

    pub fn from_minor_units(units: i64, currency: &str) -> Self {
        Self::new(Decimal::new(units, 2), currency)
    }
}

impl Default for Money { fn default() -> Self { Self::zero("INR") } }

/// Six-digit Indian postal index number
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pincode(String);

impl Pincode {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into().trim().to_string();
        if value.len() != 6 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(StorefrontError::Validation(format!("pincode must be 6 digits, got {:?}", value)));
        }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Pincode {
    type Error = StorefrontError;
    fn try_from(value: String) -> Result<Self> { Self::new(value) }
}

impl From<Pincode> for String {
    fn from(p: Pincode) -> Self { p.0 }
}

impl fmt::Display for Pincode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Postal address as captured at checkout
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub pincode: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl Address {
    pub fn is_blank(&self) -> bool { self.line1.trim().is_empty() }

    /// Fill city and state from a postal lookup, keeping anything the customer typed.
    pub fn autofill(&mut self, place: &PostalPlace) {
        if self.city.trim().is_empty() { self.city = place.district.clone(); }
        if self.state.trim().is_empty() { self.state = place.state.clone(); }
    }
}

/// Result of a successful postal lookup
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalPlace {
    pub post_office: String,
    pub district: String,
    pub state: String,
}

pub const MAX_PRODUCT_IMAGES: usize = 5;
pub const MAX_IMAGE_BYTES: usize = 7 * 1024 * 1024;

/// Checks an image before it is handed to object storage.
pub fn validate_image_upload(mime: &str, size_bytes: usize) -> Result<()> {
    if !mime.starts_with("image/") {
        return Err(StorefrontError::Validation(format!("{} is not an image", mime)));
    }
    if size_bytes > MAX_IMAGE_BYTES {
        return Err(StorefrontError::Validation(format!("image is {} bytes, limit is {}", size_bytes, MAX_IMAGE_BYTES)));
    }
    Ok(())
}

//! Outbound collaborators: payment gateway, shipping carrier, postal lookup.
//!
//! Each one is a trait so services can be driven by stubs in tests. Request
//! and response bodies are explicit per call.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::{CarrierShipment, ReturnReason};
use crate::domain::value_objects::{Address, Money, Pincode, PostalPlace, Sku};
use crate::error::{Result, StorefrontError};

pub mod postal;
pub mod razorpay;
pub mod shiprocket;

pub use postal::PostalClient;
pub use razorpay::{RazorpayClient, SignatureVerifier};
pub use shiprocket::ShiprocketClient;

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| StorefrontError::external("http", e.to_string()))
}

/// Gateway-side order the payment widget is opened against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub gateway_order_id: String,
    /// Minor units (paise)
    pub amount: i64,
    pub currency: String,
    pub receipt: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key the widget is initialised with.
    fn key_id(&self) -> &str;
    async fn create_order(&self, amount: &Money, receipt: &str) -> Result<GatewayOrder>;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: Address,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShipmentLine {
    pub name: String,
    pub sku: Sku,
    pub units: i32,
    pub selling_price: Decimal,
    pub hsn: String,
}

/// Parcel size; weight in grams, sides in centimetres.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Package {
    pub weight_grams: i32,
    pub length_cm: i32,
    pub breadth_cm: i32,
    pub height_cm: i32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShipmentRequest {
    pub order_id: String,
    pub order_date: DateTime<Utc>,
    pub comment: String,
    pub billing: Contact,
    pub shipping: Contact,
    pub shipping_is_billing: bool,
    pub lines: Vec<ShipmentLine>,
    pub prepaid: bool,
    pub sub_total: Decimal,
    pub package: Package,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReturnShipmentRequest {
    pub carrier_order_id: String,
    pub pickup: Contact,
    pub reason: ReturnReason,
    pub lines: Vec<ShipmentLine>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnShipment {
    pub return_id: String,
    pub status: Option<String>,
    pub awb: Option<String>,
}

#[async_trait]
pub trait Carrier: Send + Sync {
    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<CarrierShipment>;
    async fn cancel_shipments(&self, carrier_order_ids: &[String]) -> Result<()>;
    async fn create_return(&self, request: &ReturnShipmentRequest) -> Result<ReturnShipment>;
}

#[async_trait]
pub trait PostalLookup: Send + Sync {
    /// Resolves a pincode; `NotFound` when the service knows no post office for it.
    async fn lookup(&self, pincode: &Pincode) -> Result<PostalPlace>;
}

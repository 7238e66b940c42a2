//! Order Aggregate
//!
//! An order is created exactly once, by payment verification, from a verified
//! gateway payment and the shopper's cart snapshot. Line items never change
//! afterwards; only payment/fulfillment status and carrier metadata move.
//!
//! Fulfillment runs `pending → processing → shipped → out_for_delivery → delivered`.
//! `cancelled` branches off before dispatch, `returned` after it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Address;
use crate::error::{Result, StorefrontError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed, Refunded }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FulfillmentStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    OutForDelivery,
    Delivered,
    Cancelled,
    Returned,
}

impl FulfillmentStatus {
    /// Position on the forward delivery path; side branches have none.
    fn step(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Processing => Some(1),
            Self::Shipped => Some(2),
            Self::OutForDelivery => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled | Self::Returned => None,
        }
    }

    pub fn can_transition_to(self, to: FulfillmentStatus) -> bool {
        match to {
            Self::Cancelled => matches!(self, Self::Pending | Self::Processing),
            Self::Returned => matches!(self, Self::Shipped | Self::OutForDelivery | Self::Delivered),
            _ => matches!((self.step(), to.step()), (Some(from), Some(next)) if next > from),
        }
    }

    pub fn is_terminal(self) -> bool { matches!(self, Self::Cancelled | Self::Returned) }

    /// Shiprocket webhook `status_code` vocabulary.
    pub fn from_carrier_code(code: i64) -> Option<Self> {
        match code {
            1 | 2 => Some(Self::Processing),
            3 | 4 => Some(Self::Shipped),
            5 => Some(Self::OutForDelivery),
            6 => Some(Self::Delivered),
            7 => Some(Self::Returned),
            8 => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: i64,
    pub product_name: String,
    pub product_price: Decimal,
    pub product_image: String,
    pub quantity: i32,
    pub subtotal: Decimal,
}

/// Append-only tracking/audit entry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderEvent {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(order_id: Uuid, status: impl Into<String>, note: Option<String>, created_at: DateTime<Utc>) -> Self {
        Self { id: Uuid::now_v7(), order_id, status: status.into(), note, created_at }
    }
}

/// Contact and address data the shopper submitted at checkout
#[derive(Clone, Debug, Default, Serialize, Deserialize, Validate)]
pub struct OrderDetails {
    #[validate(length(min = 1, max = 200))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub total_amount: Decimal,
}

impl OrderDetails {
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if self.shipping_address.is_blank() {
            return Err(StorefrontError::Validation("shipping address is required".into()));
        }
        Ok(())
    }
}

/// One line of the cart snapshot submitted with a payment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: i64,
    pub product_name: String,
    pub product_price: Decimal,
    #[serde(default)]
    pub product_image: String,
    pub quantity: i32,
}

/// Identifiers of a captured gateway payment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
}

/// Carrier-side shipment as returned by order creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierShipment {
    pub carrier_order_id: String,
    pub awb: Option<String>,
    pub courier: Option<String>,
    pub label_url: Option<String>,
}

pub fn tracking_url(awb: &str) -> String { format!("https://www.shiprocket.in/tracking/{}", awb) }

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub address_snapshot: Option<Address>,
    pub total_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub payment_method: String,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub shiprocket_order_id: Option<String>,
    pub awb: Option<String>,
    pub courier: Option<String>,
    pub tracking_url: Option<String>,
    pub label_url: Option<String>,
    pub notes: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl Order {
    /// Builds a paid order and its line items. `total_amount` must equal the sum of line subtotals.
    pub fn place(user_id: Uuid, details: OrderDetails, lines: &[CheckoutLine], payment: &GatewayPayment) -> Result<(Self, Vec<OrderItem>)> {
        details.check()?;
        if lines.is_empty() {
            return Err(StorefrontError::Validation("order has no items".into()));
        }
        let id = Uuid::now_v7();
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            if line.quantity < 1 {
                return Err(StorefrontError::Validation(format!("quantity for product {} must be at least 1", line.product_id)));
            }
            items.push(OrderItem {
                id: Uuid::now_v7(), order_id: id, product_id: line.product_id,
                product_name: line.product_name.clone(), product_price: line.product_price,
                product_image: line.product_image.clone(), quantity: line.quantity,
                subtotal: line.product_price * Decimal::from(line.quantity),
            });
        }
        let computed: Decimal = items.iter().map(|i| i.subtotal).sum();
        if computed != details.total_amount {
            return Err(StorefrontError::Validation(format!("total {} does not match items {}", details.total_amount, computed)));
        }

        let now = Utc::now();
        let billing = details.billing_address.filter(|a| !a.is_blank()).unwrap_or_else(|| details.shipping_address.clone());
        let mut order = Self {
            id, user_id, customer_name: details.customer_name, customer_email: details.customer_email,
            customer_phone: details.customer_phone, shipping_address: details.shipping_address,
            billing_address: billing, address_snapshot: None, total_amount: computed,
            payment_status: PaymentStatus::Paid, fulfillment_status: FulfillmentStatus::Pending,
            payment_method: "razorpay".into(), gateway_order_id: payment.gateway_order_id.clone(),
            gateway_payment_id: payment.gateway_payment_id.clone(), shiprocket_order_id: None, awb: None,
            courier: None, tracking_url: None, label_url: None,
            notes: Some(format!("Razorpay Payment ID: {}, Order ID: {}", payment.gateway_payment_id, payment.gateway_order_id)),
            shipped_at: None, delivered_at: None, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::OrderPlaced { order_id: id, user_id, total: computed });
        Ok((order, items))
    }

    pub fn has_shipment(&self) -> bool { self.shiprocket_order_id.is_some() }

    /// Moves fulfillment forward (or to a side branch) and returns the timeline entry to append.
    pub fn transition(&mut self, to: FulfillmentStatus, note: Option<String>) -> Result<OrderEvent> {
        let from = self.fulfillment_status;
        if !from.can_transition_to(to) {
            return Err(StorefrontError::transition("order", from, to));
        }
        let now = Utc::now();
        self.fulfillment_status = to;
        match to {
            FulfillmentStatus::Shipped if self.shipped_at.is_none() => self.shipped_at = Some(now),
            FulfillmentStatus::Delivered => self.delivered_at = Some(now),
            _ => {}
        }
        self.updated_at = now;
        self.raise_event(DomainEvent::FulfillmentChanged { order_id: self.id, from, to });
        if to == FulfillmentStatus::Cancelled {
            self.raise_event(DomainEvent::OrderCancelled { order_id: self.id });
        }
        Ok(OrderEvent::new(self.id, to.as_ref(), note, now))
    }

    pub fn ensure_cancellable(&self) -> Result<()> {
        if self.fulfillment_status.can_transition_to(FulfillmentStatus::Cancelled) { Ok(()) }
        else { Err(StorefrontError::transition("order", self.fulfillment_status, FulfillmentStatus::Cancelled)) }
    }

    /// Records the carrier shipment and freezes the address it was dispatched to.
    pub fn attach_shipment(&mut self, shipment: &CarrierShipment) {
        self.shiprocket_order_id = Some(shipment.carrier_order_id.clone());
        if let Some(awb) = shipment.awb.as_deref() { self.record_tracking(awb, shipment.courier.as_deref()); }
        else if shipment.courier.is_some() { self.courier = shipment.courier.clone(); }
        self.label_url = shipment.label_url.clone().or(self.label_url.take());
        if self.address_snapshot.is_none() { self.address_snapshot = Some(self.shipping_address.clone()); }
        self.updated_at = Utc::now();
    }

    pub fn record_tracking(&mut self, awb: &str, courier: Option<&str>) {
        if !awb.is_empty() {
            self.awb = Some(awb.to_string());
            self.tracking_url = Some(tracking_url(awb));
        }
        if let Some(c) = courier.filter(|c| !c.is_empty()) { self.courier = Some(c.to_string()); }
        self.updated_at = Utc::now();
    }

    pub fn set_payment_status(&mut self, status: PaymentStatus) { self.payment_status = status; self.updated_at = Utc::now(); }

    /// Address a return pickup should default to.
    pub fn pickup_address(&self) -> &Address { self.address_snapshot.as_ref().unwrap_or(&self.shipping_address) }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FulfillmentStatus::*;

    fn details(total: i64) -> OrderDetails {
        OrderDetails {
            customer_name: "Asha".into(), customer_email: "asha@example.com".into(), customer_phone: Some("9800000000".into()),
            shipping_address: Address { line1: "12 Clay Lane".into(), city: "Mumbai".into(), state: "Maharashtra".into(), pincode: "400001".into(), ..Default::default() },
            billing_address: None, total_amount: Decimal::new(total, 0),
        }
    }

    fn line(id: i64, price: i64, qty: i32) -> CheckoutLine {
        CheckoutLine { product_id: id, product_name: "Vase".into(), product_price: Decimal::new(price, 0), product_image: String::new(), quantity: qty }
    }

    fn payment() -> GatewayPayment { GatewayPayment { gateway_order_id: "order_1".into(), gateway_payment_id: "pay_1".into() } }

    #[test]
    fn test_place_order() {
        let (mut order, items) = Order::place(Uuid::new_v4(), details(500), &[line(7, 250, 2)], &payment()).unwrap();
        assert_eq!(order.total_amount, Decimal::new(500, 0));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].subtotal, Decimal::new(500, 0));
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.fulfillment_status, Pending);
        assert_eq!(order.billing_address, order.shipping_address);
        assert!(matches!(order.take_events()[0], DomainEvent::OrderPlaced { .. }));
    }

    #[test]
    fn test_place_rejects_tampered_total() {
        assert!(Order::place(Uuid::new_v4(), details(100), &[line(7, 250, 2)], &payment()).is_err());
    }

    #[test]
    fn test_transition_edges() {
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Shipped));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(Delivered.can_transition_to(Returned));
        assert!(!Shipped.can_transition_to(Pending));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Processing.can_transition_to(Returned));
        assert!(!Cancelled.can_transition_to(Processing));
        assert!(!Delivered.can_transition_to(Delivered));
    }

    #[test]
    fn test_shipped_to_pending_fails() {
        let (mut order, _) = Order::place(Uuid::new_v4(), details(500), &[line(7, 250, 2)], &payment()).unwrap();
        order.transition(Shipped, None).unwrap();
        let err = order.transition(Pending, None).unwrap_err();
        assert!(matches!(err, StorefrontError::InvalidTransition { .. }));
        assert_eq!(order.fulfillment_status, Shipped);
        assert!(order.shipped_at.is_some());
    }

    #[test]
    fn test_carrier_codes() {
        assert_eq!(FulfillmentStatus::from_carrier_code(3), Some(Shipped));
        assert_eq!(FulfillmentStatus::from_carrier_code(6), Some(Delivered));
        assert_eq!(FulfillmentStatus::from_carrier_code(42), None);
    }

    #[test]
    fn test_attach_shipment_freezes_address() {
        let (mut order, _) = Order::place(Uuid::new_v4(), details(500), &[line(7, 250, 2)], &payment()).unwrap();
        order.attach_shipment(&CarrierShipment { carrier_order_id: "SR1".into(), awb: Some("AWB9".into()), courier: Some("Delhivery".into()), label_url: None });
        order.shipping_address.line1 = "changed".into();
        assert_eq!(order.address_snapshot.as_ref().unwrap().line1, "12 Clay Lane");
        assert_eq!(order.tracking_url.as_deref(), Some("https://www.shiprocket.in/tracking/AWB9"));
    }
}

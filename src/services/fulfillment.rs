//! Order fulfillment: owner and admin reads, status moves, carrier shipments,
//! cancellation and the inbound carrier webhook.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clients::{Carrier, Contact, Package, ShipmentLine, ShipmentRequest};
use crate::domain::aggregates::{FulfillmentStatus, Order, OrderEvent, OrderItem, PaymentStatus};
use crate::domain::value_objects::Sku;
use crate::error::{Result, StorefrontError};
use crate::messaging::EventPublisher;
use crate::session::{require, require_admin, Session};
use crate::store::{OrderFilter, Store};

pub const DEFAULT_WEIGHT_GRAMS: i32 = 500;
pub const DEFAULT_DIMENSIONS_CM: (i32, i32, i32) = (20, 15, 10);
pub const DEFAULT_HSN: &str = "6911";

#[derive(Clone, Debug, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShipmentView {
    pub order_id: Uuid,
    pub carrier_order_id: String,
    pub awb: Option<String>,
    pub courier: Option<String>,
    pub tracking_url: Option<String>,
    /// True when the order already had a shipment and no carrier call was made.
    pub existing: bool,
}

impl ShipmentView {
    fn of(order: &Order, carrier_order_id: String, existing: bool) -> Self {
        Self {
            order_id: order.id, carrier_order_id, awb: order.awb.clone(), courier: order.courier.clone(),
            tracking_url: order.tracking_url.clone(), existing,
        }
    }
}

/// Carrier status push
#[derive(Clone, Debug, Deserialize)]
pub struct CarrierWebhook {
    pub order_id: serde_json::Value,
    #[serde(default)]
    pub status: Option<String>,
    pub status_code: Option<i64>,
    #[serde(default)]
    pub awb_code: Option<String>,
    #[serde(default)]
    pub courier_name: Option<String>,
    #[serde(default)]
    pub tracking_data: Vec<TrackingEntry>,
}

impl CarrierWebhook {
    fn carrier_order_id(&self) -> Option<String> {
        match &self.order_id {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct TrackingEntry {
    pub status: String,
    #[serde(default)]
    pub status_code: Option<i64>,
    pub status_date: String,
    #[serde(default)]
    pub status_location: Option<String>,
}

impl TrackingEntry {
    /// Timeline note: `"<status> - <location>"`, or the bare status when no location is given.
    pub fn note(&self) -> String {
        match self.status_location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
            Some(location) => format!("{} - {}", self.status, location),
            None => self.status.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WebhookOutcome {
    pub order_id: Uuid,
    pub fulfillment_status: FulfillmentStatus,
    pub status_changed: bool,
    pub events_recorded: usize,
}

fn parse_carrier_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).map(|d| d.with_timezone(&Utc)).ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok().map(|n| Utc.from_utc_datetime(&n)))
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%d %m %Y %H:%M:%S").ok().map(|n| Utc.from_utc_datetime(&n)))
}

/// Package weight is the sum over lines, sides the largest of any line; zero means unknown.
/// Weight saturates at `i32::MAX` grams.
pub fn package_for(lines: &[(i32, Option<i32>, Option<i32>, Option<i32>, Option<i32>)]) -> Package {
    let mut p = Package { weight_grams: 0, length_cm: 0, breadth_cm: 0, height_cm: 0 };
    for (qty, weight, length, width, height) in lines {
        p.weight_grams = p.weight_grams.saturating_add(weight.unwrap_or(0).saturating_mul(*qty));
        p.length_cm = p.length_cm.max(length.unwrap_or(0));
        p.breadth_cm = p.breadth_cm.max(width.unwrap_or(0));
        p.height_cm = p.height_cm.max(height.unwrap_or(0));
    }
    if p.weight_grams == 0 { p.weight_grams = DEFAULT_WEIGHT_GRAMS; }
    if p.length_cm == 0 { p.length_cm = DEFAULT_DIMENSIONS_CM.0; }
    if p.breadth_cm == 0 { p.breadth_cm = DEFAULT_DIMENSIONS_CM.1; }
    if p.height_cm == 0 { p.height_cm = DEFAULT_DIMENSIONS_CM.2; }
    p
}

#[derive(Clone)]
pub struct FulfillmentService {
    store: Arc<dyn Store>,
    carrier: Arc<dyn Carrier>,
    events: EventPublisher,
}

impl FulfillmentService {
    pub fn new(store: Arc<dyn Store>, carrier: Arc<dyn Carrier>, events: EventPublisher) -> Self { Self { store, carrier, events } }

    pub async fn list_my_orders(&self, session: Option<&Session>) -> Result<Vec<Order>> {
        let s = require(session)?;
        self.store.list_orders(&OrderFilter { user_id: Some(s.user_id), status: None }).await
    }

    pub async fn get_order(&self, session: Option<&Session>, id: Uuid) -> Result<OrderView> {
        let order = self.visible_order(session, id).await?;
        let items = self.store.order_items(id).await?;
        Ok(OrderView { order, items })
    }

    pub async fn order_timeline(&self, session: Option<&Session>, id: Uuid) -> Result<Vec<OrderEvent>> {
        self.visible_order(session, id).await?;
        self.store.order_events(id).await
    }

    pub async fn list_orders(&self, session: Option<&Session>, status: Option<FulfillmentStatus>) -> Result<Vec<Order>> {
        require_admin(session)?;
        self.store.list_orders(&OrderFilter { user_id: None, status }).await
    }

    /// Admin override. Moves forward any number of steps, never backward; cancelling goes through the carrier first.
    #[instrument(skip(self, session))]
    pub async fn update_fulfillment_status(&self, session: Option<&Session>, id: Uuid, status: FulfillmentStatus, note: Option<String>) -> Result<Order> {
        require_admin(session)?;
        if status == FulfillmentStatus::Cancelled {
            return self.cancel(id, note).await;
        }
        let mut order = self.load(id).await?;
        let event = order.transition(status, note.or_else(|| Some("Updated by admin".into())))?;
        self.store.update_order(&order, Some(&event)).await?;
        info!(order_id = %id, status = %status, "fulfillment status updated");
        self.events.publish(order.take_events()).await;
        Ok(order)
    }

    #[instrument(skip(self, session))]
    pub async fn update_payment_status(&self, session: Option<&Session>, id: Uuid, status: PaymentStatus) -> Result<Order> {
        require_admin(session)?;
        let mut order = self.load(id).await?;
        order.set_payment_status(status);
        let event = OrderEvent::new(id, format!("payment_{}", status), None, order.updated_at);
        self.store.update_order(&order, Some(&event)).await?;
        Ok(order)
    }

    pub async fn create_shipment(&self, session: Option<&Session>, id: Uuid) -> Result<ShipmentView> {
        require_admin(session)?;
        self.ensure_shipment(id).await
    }

    pub async fn cancel_order(&self, session: Option<&Session>, id: Uuid, note: Option<String>) -> Result<Order> {
        require_admin(session)?;
        self.cancel(id, note).await
    }

    /// Books the carrier shipment for a paid order. Calling it again returns the
    /// existing shipment without contacting the carrier.
    #[instrument(skip(self))]
    pub async fn ensure_shipment(&self, id: Uuid) -> Result<ShipmentView> {
        let mut order = self.load(id).await?;
        if let Some(existing) = order.shiprocket_order_id.clone() {
            return Ok(ShipmentView::of(&order, existing, true));
        }
        if !matches!(order.fulfillment_status, FulfillmentStatus::Pending | FulfillmentStatus::Processing) {
            return Err(StorefrontError::transition("order", order.fulfillment_status, "shipment_created"));
        }

        let request = self.shipment_request(&order).await?;
        let shipment = self.carrier.create_shipment(&request).await?;
        order.attach_shipment(&shipment);
        let event = if order.fulfillment_status == FulfillmentStatus::Pending {
            Some(order.transition(FulfillmentStatus::Processing, Some(format!("Shipment {} created", shipment.carrier_order_id)))?)
        } else {
            None
        };
        self.store.update_order(&order, event.as_ref()).await?;
        info!(order_id = %id, carrier_order_id = %shipment.carrier_order_id, "shipment created");
        self.events.publish(order.take_events()).await;
        Ok(ShipmentView::of(&order, shipment.carrier_order_id, false))
    }

    /// Applies a carrier status push. Unknown codes and edges the state machine
    /// rejects leave the status alone; tracking data is still recorded.
    #[instrument(skip(self, hook), fields(status_code = ?hook.status_code))]
    pub async fn handle_webhook(&self, hook: CarrierWebhook) -> Result<WebhookOutcome> {
        let carrier_id = hook.carrier_order_id().ok_or_else(|| StorefrontError::Validation("order_id is required".into()))?;
        let mut order = self.store.find_order_by_carrier_id(&carrier_id).await?
            .ok_or_else(|| StorefrontError::NotFound(format!("Order for carrier id {}", carrier_id)))?;

        if hook.awb_code.is_some() || hook.courier_name.is_some() {
            order.record_tracking(hook.awb_code.as_deref().unwrap_or_default(), hook.courier_name.as_deref());
        }

        let mut recorded = 0;
        let mut latest: Option<DateTime<Utc>> = None;
        for entry in &hook.tracking_data {
            let Some(at) = parse_carrier_time(&entry.status_date) else {
                warn!(order_id = %order.id, date = %entry.status_date, "skipping tracking entry with unreadable date");
                continue;
            };
            latest = latest.max(Some(at));
            let event = OrderEvent::new(order.id, entry.status.clone(), Some(entry.note()), at);
            if self.store.append_order_event(&event).await? {
                recorded += 1;
            }
        }

        let mut status_event = None;
        match hook.status_code.and_then(FulfillmentStatus::from_carrier_code) {
            Some(to) if to == order.fulfillment_status => {}
            Some(to) if order.fulfillment_status.can_transition_to(to) => {
                let note = hook.status.clone().or_else(|| Some(format!("Carrier status {}", to)));
                let mut event = order.transition(to, note)?;
                if let Some(at) = latest { event.created_at = at; }
                status_event = Some(event);
            }
            Some(to) => warn!(order_id = %order.id, from = %order.fulfillment_status, to = %to, "ignoring carrier transition"),
            None => info!(order_id = %order.id, code = ?hook.status_code, "carrier status code not mapped"),
        }

        let changed = status_event.is_some();
        self.store.update_order(&order, status_event.as_ref()).await?;
        if changed { recorded += 1; }
        self.events.publish(order.take_events()).await;
        Ok(WebhookOutcome { order_id: order.id, fulfillment_status: order.fulfillment_status, status_changed: changed, events_recorded: recorded })
    }

    async fn cancel(&self, id: Uuid, note: Option<String>) -> Result<Order> {
        let mut order = self.load(id).await?;
        order.ensure_cancellable()?;
        if let Some(carrier_id) = order.shiprocket_order_id.clone() {
            self.carrier.cancel_shipments(&[carrier_id]).await?;
        }
        let event = order.transition(FulfillmentStatus::Cancelled, note.or_else(|| Some("Order cancelled".into())))?;
        self.store.update_order(&order, Some(&event)).await?;
        info!(order_id = %id, "order cancelled");
        self.events.publish(order.take_events()).await;
        Ok(order)
    }

    async fn shipment_request(&self, order: &Order) -> Result<ShipmentRequest> {
        let items = self.store.order_items(order.id).await?;
        let mut dims = Vec::with_capacity(items.len());
        let mut lines = Vec::with_capacity(items.len());
        for item in &items {
            let product = self.store.get_product(item.product_id).await?;
            let p = product.as_ref();
            dims.push((item.quantity, p.and_then(|p| p.weight_grams), p.and_then(|p| p.length_cm), p.and_then(|p| p.width_cm), p.and_then(|p| p.height_cm)));
            lines.push(ShipmentLine {
                name: item.product_name.clone(),
                sku: Sku::for_product(item.product_id),
                units: item.quantity,
                selling_price: item.product_price,
                hsn: p.and_then(|p| p.hsn.clone()).unwrap_or_else(|| DEFAULT_HSN.to_string()),
            });
        }
        let phone = order.customer_phone.clone().or_else(|| order.shipping_address.phone.clone()).unwrap_or_default();
        let contact = |address: &crate::domain::value_objects::Address| Contact {
            name: order.customer_name.clone(), email: order.customer_email.clone(),
            phone: address.phone.clone().unwrap_or_else(|| phone.clone()), address: address.clone(),
        };
        Ok(ShipmentRequest {
            order_id: order.id.to_string(),
            order_date: order.created_at,
            comment: order.notes.clone().unwrap_or_default(),
            billing: contact(&order.billing_address),
            shipping: contact(&order.shipping_address),
            shipping_is_billing: order.billing_address == order.shipping_address,
            lines,
            prepaid: order.payment_method == "razorpay",
            sub_total: items.iter().map(|i| i.subtotal).sum::<Decimal>(),
            package: package_for(&dims),
        })
    }

    async fn visible_order(&self, session: Option<&Session>, id: Uuid) -> Result<Order> {
        let s = require(session)?;
        let order = self.load(id).await?;
        if order.user_id != s.user_id && !s.is_admin {
            return Err(StorefrontError::NotFound(format!("Order {}", id)));
        }
        Ok(order)
    }

    async fn load(&self, id: Uuid) -> Result<Order> {
        self.store.get_order(id).await?.ok_or_else(|| StorefrontError::NotFound(format!("Order {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_defaults_and_sums() {
        let p = package_for(&[(2, None, None, None, None)]);
        assert_eq!((p.weight_grams, p.length_cm, p.breadth_cm, p.height_cm), (500, 20, 15, 10));
        let p = package_for(&[(2, Some(300), Some(25), None, Some(8)), (1, Some(150), Some(10), Some(12), Some(30))]);
        assert_eq!(p.weight_grams, 750);
        assert_eq!((p.length_cm, p.breadth_cm, p.height_cm), (25, 12, 30));
    }

    #[test]
    fn test_package_weight_saturates() {
        let p = package_for(&[(3, Some(i32::MAX), None, None, None), (2, Some(1_000_000_000), None, None, None)]);
        assert_eq!(p.weight_grams, i32::MAX);
    }

    #[test]
    fn test_tracking_note_includes_location() {
        let entry: TrackingEntry = serde_json::from_value(serde_json::json!({
            "status": "Picked Up", "status_date": "2024-03-01 12:30:00", "status_location": "Mumbai"
        })).unwrap();
        assert_eq!(entry.note(), "Picked Up - Mumbai");
        let entry = TrackingEntry { status_location: None, ..entry };
        assert_eq!(entry.note(), "Picked Up");
        let entry = TrackingEntry { status_location: Some(" ".into()), ..entry };
        assert_eq!(entry.note(), "Picked Up");
    }

    #[test]
    fn test_carrier_time_formats() {
        assert!(parse_carrier_time("2024-03-01 10:15:00").is_some());
        assert!(parse_carrier_time("2024-03-01T10:15:00+05:30").is_some());
        assert!(parse_carrier_time("yesterday").is_none());
    }

    #[test]
    fn test_webhook_order_id_forms() {
        let hook: CarrierWebhook = serde_json::from_value(serde_json::json!({"order_id": 112233, "status_code": 6})).unwrap();
        assert_eq!(hook.carrier_order_id().as_deref(), Some("112233"));
        let hook: CarrierWebhook = serde_json::from_value(serde_json::json!({"order_id": "", "status_code": 6})).unwrap();
        assert!(hook.carrier_order_id().is_none());
    }
}

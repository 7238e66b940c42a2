//! Return requests against delivered orders.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::clients::{Carrier, Contact, ReturnShipmentRequest, ShipmentLine};
use crate::domain::aggregates::{Order, ReturnForm, ReturnRequest, ReturnStatus};
use crate::domain::value_objects::Sku;
use crate::error::{Result, StorefrontError};
use crate::messaging::EventPublisher;
use crate::services::fulfillment::DEFAULT_HSN;
use crate::session::{require, require_admin, Session};
use crate::store::Store;

#[derive(Clone)]
pub struct ReturnService {
    store: Arc<dyn Store>,
    carrier: Arc<dyn Carrier>,
    events: EventPublisher,
}

impl ReturnService {
    pub fn new(store: Arc<dyn Store>, carrier: Arc<dyn Carrier>, events: EventPublisher) -> Self { Self { store, carrier, events } }

    #[instrument(skip(self, session, form), fields(reason = %form.reason))]
    pub async fn request_return(&self, session: Option<&Session>, order_id: Uuid, form: ReturnForm) -> Result<ReturnRequest> {
        let s = require(session)?;
        let order = self.owned_order(s, order_id).await?;
        let existing = self.store.find_return_by_order(order_id).await?;
        let mut request = ReturnRequest::open(&order, existing.as_ref(), form)?;
        self.store.insert_return(&request).await?;
        info!(return_id = %request.id, order_id = %order_id, "return requested");
        self.events.publish(request.take_events()).await;
        Ok(request)
    }

    pub async fn get_return_for_order(&self, session: Option<&Session>, order_id: Uuid) -> Result<Option<ReturnRequest>> {
        let s = require(session)?;
        if !s.is_admin {
            self.owned_order(s, order_id).await?;
        }
        self.store.find_return_by_order(order_id).await
    }

    pub async fn list_returns(&self, session: Option<&Session>, status: Option<ReturnStatus>) -> Result<Vec<ReturnRequest>> {
        require_admin(session)?;
        self.store.list_returns(status).await
    }

    pub async fn approve(&self, session: Option<&Session>, id: Uuid) -> Result<ReturnRequest> {
        require_admin(session)?;
        self.update(id, |r| r.approve()).await
    }

    pub async fn reject(&self, session: Option<&Session>, id: Uuid, reason: &str) -> Result<ReturnRequest> {
        require_admin(session)?;
        self.update(id, |r| r.reject(reason)).await
    }

    /// Books the reverse pickup against the original carrier shipment.
    #[instrument(skip(self, session))]
    pub async fn ship_return(&self, session: Option<&Session>, id: Uuid) -> Result<ReturnRequest> {
        require_admin(session)?;
        let mut request = self.load(id).await?;
        request.ensure_shippable()?;
        let order = self.store.get_order(request.order_id).await?
            .ok_or_else(|| StorefrontError::NotFound(format!("Order {}", request.order_id)))?;
        let carrier_order_id = order.shiprocket_order_id.clone().ok_or(StorefrontError::NoCarrierShipment(order.id))?;

        let lines = self.store.order_items(order.id).await?.into_iter().map(|item| ShipmentLine {
            name: item.product_name,
            sku: Sku::for_product(item.product_id),
            units: item.quantity,
            selling_price: item.product_price,
            hsn: DEFAULT_HSN.to_string(),
        }).collect();
        let pickup = Contact {
            name: order.customer_name.clone(),
            email: order.customer_email.clone(),
            phone: pickup_phone(&request, &order),
            address: request.pickup_address.clone(),
        };
        let shipment = self.carrier.create_return(&ReturnShipmentRequest { carrier_order_id, pickup, reason: request.reason, lines }).await?;

        request.mark_shipped(shipment.return_id, shipment.awb)?;
        self.store.save_return(&request).await?;
        info!(return_id = %id, shipment = ?request.return_shipment_id, "return pickup booked");
        self.events.publish(request.take_events()).await;
        Ok(request)
    }

    pub async fn mark_returned(&self, session: Option<&Session>, id: Uuid) -> Result<ReturnRequest> {
        require_admin(session)?;
        self.update(id, |r| r.mark_returned()).await
    }

    pub async fn refund(&self, session: Option<&Session>, id: Uuid) -> Result<ReturnRequest> {
        require_admin(session)?;
        self.update(id, |r| r.refund()).await
    }

    async fn update(&self, id: Uuid, step: impl FnOnce(&mut ReturnRequest) -> Result<()>) -> Result<ReturnRequest> {
        let mut request = self.load(id).await?;
        step(&mut request)?;
        self.store.save_return(&request).await?;
        info!(return_id = %id, status = %request.status, "return updated");
        self.events.publish(request.take_events()).await;
        Ok(request)
    }

    async fn owned_order(&self, s: &Session, order_id: Uuid) -> Result<Order> {
        self.store.get_order(order_id).await?
            .filter(|o| o.user_id == s.user_id)
            .ok_or_else(|| StorefrontError::NotFound(format!("Order {}", order_id)))
    }

    async fn load(&self, id: Uuid) -> Result<ReturnRequest> {
        self.store.get_return(id).await?.ok_or_else(|| StorefrontError::NotFound(format!("Return request {}", id)))
    }
}

fn pickup_phone(request: &ReturnRequest, order: &Order) -> String {
    request.pickup_address.phone.clone()
        .or_else(|| order.customer_phone.clone())
        .or_else(|| order.shipping_address.phone.clone())
        .unwrap_or_default()
}

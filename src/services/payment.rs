//! Gateway order creation and server-side payment verification.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clients::{PaymentGateway, SignatureVerifier};
use crate::domain::aggregates::{CartItem, CheckoutLine, GatewayPayment, Order, OrderDetails, OrderEvent};
use crate::domain::value_objects::Money;
use crate::error::{Result, StorefrontError};
use crate::messaging::EventPublisher;
use crate::services::outbox::OutboxWorker;
use crate::session::{require, Session};
use crate::store::{OutboxAction, OutboxTask, Store};

#[derive(Clone, Debug, Deserialize)]
pub struct CreateGatewayOrder {
    pub amount: Decimal,
    pub currency: Option<String>,
    pub receipt: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GatewayOrderCreated {
    pub gateway_order_id: String,
    /// Minor units
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

/// Body posted by the client after the widget reports a captured payment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    pub order_details: OrderDetails,
    pub cart_items: Vec<CheckoutLine>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub order_id: Uuid,
    /// The payment had already been recorded; no new order was created.
    #[serde(default)]
    pub replayed: bool,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: SignatureVerifier,
    outbox: OutboxWorker,
    events: EventPublisher,
    currency: String,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: SignatureVerifier,
        outbox: OutboxWorker,
        events: EventPublisher,
        currency: impl Into<String>,
    ) -> Self {
        Self { store, gateway, verifier, outbox, events, currency: currency.into() }
    }

    #[instrument(skip(self, session, request), fields(amount = %request.amount))]
    pub async fn create_gateway_order(&self, session: Option<&Session>, request: CreateGatewayOrder) -> Result<GatewayOrderCreated> {
        require(session)?;
        if request.amount <= Decimal::ZERO {
            return Err(StorefrontError::Validation("amount must be positive".into()));
        }
        let currency = request.currency.unwrap_or_else(|| self.currency.clone());
        let receipt = request.receipt.unwrap_or_else(|| format!("rcpt_{}", Uuid::new_v4().simple()));
        let order = self.gateway.create_order(&Money::new(request.amount, &currency), &receipt).await?;
        Ok(GatewayOrderCreated {
            gateway_order_id: order.gateway_order_id,
            amount: order.amount,
            currency: order.currency,
            key_id: self.gateway.key_id().to_string(),
        })
    }

    /// Records the order for a captured payment.
    ///
    /// Nothing is written unless the signature matches and the submitted cart
    /// matches the shopper's live cart. The same payment id always resolves to
    /// the same order. Cart clearing, stock and shipment run afterwards as
    /// outbox tasks and never undo the order.
    #[instrument(skip(self, session, request), fields(gateway_order_id = %request.razorpay_order_id))]
    pub async fn verify_payment(&self, session: Option<&Session>, request: VerifyPaymentRequest) -> Result<VerifyPaymentResponse> {
        let s = require(session)?;
        self.verifier.verify(&request.razorpay_order_id, &request.razorpay_payment_id, &request.razorpay_signature)?;

        if let Some(existing) = self.store.find_order_by_payment(&request.razorpay_payment_id).await? {
            return self.replay(s, existing);
        }

        let live = self.store.list_cart(s.user_id).await?;
        check_against_cart(&request.cart_items, &live)?;

        let payment = GatewayPayment { gateway_order_id: request.razorpay_order_id, gateway_payment_id: request.razorpay_payment_id };
        let (mut order, items) = Order::place(s.user_id, request.order_details, &request.cart_items, &payment)?;

        let mut tasks = vec![OutboxTask::new(order.id, OutboxAction::ClearCart { user_id: s.user_id })];
        tasks.extend(items.iter().map(|i| OutboxTask::new(order.id, OutboxAction::DecrementStock {
            product_id: i.product_id, quantity: i.quantity, product_name: i.product_name.clone(),
        })));
        tasks.push(OutboxTask::new(order.id, OutboxAction::CreateShipment));
        let placed = OrderEvent::new(order.id, "pending", Some("Order placed".into()), order.created_at);

        if let Err(e) = self.store.insert_order(&order, &items, &placed, &tasks).await {
            // A concurrent verification of the same payment may have won the insert.
            return match self.store.find_order_by_payment(&payment.gateway_payment_id).await? {
                Some(existing) => self.replay(s, existing),
                None => Err(e),
            };
        }
        info!(order_id = %order.id, user_id = %s.user_id, total = %order.total_amount, "order recorded");
        self.events.publish(order.take_events()).await;

        match self.outbox.run_for_order(order.id).await {
            Ok(report) if report.failed > 0 => warn!(order_id = %order.id, failed = report.failed, "order side effects queued for retry"),
            Ok(_) => {}
            Err(e) => error!(order_id = %order.id, step = "outbox", error = %e, "could not run order side effects"),
        }
        Ok(VerifyPaymentResponse { success: true, order_id: order.id, replayed: false })
    }

    fn replay(&self, s: &Session, existing: Order) -> Result<VerifyPaymentResponse> {
        if existing.user_id != s.user_id {
            return Err(StorefrontError::PaymentVerificationFailed("payment already recorded for another account".into()));
        }
        info!(order_id = %existing.id, "payment already verified");
        Ok(VerifyPaymentResponse { success: true, order_id: existing.id, replayed: true })
    }
}

/// The snapshot must name exactly the live cart's products, quantities and prices.
fn check_against_cart(submitted: &[CheckoutLine], live: &[CartItem]) -> Result<()> {
    let mismatch = |why: String| Err(StorefrontError::PaymentVerificationFailed(why));
    if submitted.is_empty() {
        return mismatch("no items submitted".into());
    }
    let live: HashMap<i64, &CartItem> = live.iter().map(|i| (i.product_id, i)).collect();
    if live.len() != submitted.len() {
        return mismatch(format!("cart has {} lines, {} submitted", live.len(), submitted.len()));
    }
    for line in submitted {
        let Some(item) = live.get(&line.product_id) else {
            return mismatch(format!("product {} is not in the cart", line.product_id));
        };
        if item.quantity != line.quantity {
            return mismatch(format!("quantity for product {} is {}, {} submitted", line.product_id, item.quantity, line.quantity));
        }
        if item.product_price != line.product_price {
            return mismatch(format!("price for product {} is {}, {} submitted", line.product_id, item.product_price, line.product_price));
        }
    }
    Ok(())
}

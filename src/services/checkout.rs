//! Shopper-side checkout: form checks, gateway order, payment widget and
//! verification, tracked as one attempt moving through [`CheckoutState`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::clients::PostalLookup;
use crate::domain::aggregates::{CheckoutLine, OrderDetails};
use crate::domain::value_objects::{Address, Pincode};
use crate::error::{Result, StorefrontError};
use crate::services::cart::CartService;
use crate::services::payment::{CreateGatewayOrder, GatewayOrderCreated, PaymentService, VerifyPaymentRequest};
use crate::session::{require, Session};

pub const ORDERS_PATH: &str = "/orders";
pub const REDIRECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CheckoutState {
    #[default]
    Idle,
    FormValidating,
    ScriptLoading,
    GatewayOrderCreated,
    WidgetOpen,
    PaymentSucceeded,
    PaymentFailed,
    WidgetDismissed,
}

/// What the widget is opened with.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WidgetOptions {
    pub key_id: String,
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    pub name: String,
    pub email: String,
    pub contact: Option<String>,
}

/// The widget's success callback payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCallback {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WidgetOutcome {
    Paid(PaymentCallback),
    Failed(String),
    Dismissed,
}

/// The gateway's client-side payment modal.
#[async_trait]
pub trait PaymentWidget: Send + Sync {
    async fn load_script(&self) -> Result<()>;
    async fn open(&self, options: &WidgetOptions) -> WidgetOutcome;
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct CheckoutForm {
    #[validate(length(min = 1, max = 200))]
    pub customer_name: String,
    #[validate(email)]
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    pub path: &'static str,
    pub after: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CheckoutOutcome {
    pub state: CheckoutState,
    pub order_id: Option<Uuid>,
    pub redirect: Option<Redirect>,
    pub failure: Option<String>,
}

/// One checkout attempt; the state history survives a failed run.
#[derive(Clone, Debug, Default)]
pub struct CheckoutAttempt {
    state: CheckoutState,
    history: Vec<CheckoutState>,
}

impl CheckoutAttempt {
    pub fn new() -> Self { Self::default() }
    pub fn state(&self) -> CheckoutState { self.state }
    pub fn history(&self) -> &[CheckoutState] { &self.history }

    fn enter(&mut self, state: CheckoutState) {
        self.history.push(state);
        self.state = state;
    }
}

#[derive(Clone)]
pub struct CheckoutFlow {
    cart: CartService,
    payments: PaymentService,
    postal: Arc<dyn PostalLookup>,
    widget: Arc<dyn PaymentWidget>,
}

impl CheckoutFlow {
    pub fn new(cart: CartService, payments: PaymentService, postal: Arc<dyn PostalLookup>, widget: Arc<dyn PaymentWidget>) -> Self {
        Self { cart, payments, postal, widget }
    }

    /// Resolves the pincode and fills city and state. An unknown pincode is a
    /// validation failure; an unreachable lookup service is not.
    pub async fn verify_address(&self, address: &mut Address) -> Result<()> {
        let pincode = Pincode::new(address.pincode.clone())?;
        match self.postal.lookup(&pincode).await {
            Ok(place) => {
                address.autofill(&place);
                Ok(())
            }
            Err(StorefrontError::NotFound(_)) => Err(StorefrontError::Validation(format!("pincode {} was not found", pincode))),
            Err(e) => {
                warn!(pincode = %pincode, error = %e, "postal lookup unavailable, keeping address as entered");
                Ok(())
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn run(&self, attempt: &mut CheckoutAttempt, session: Option<&Session>, mut form: CheckoutForm) -> Result<CheckoutOutcome> {
        let s = require(session)?;
        attempt.enter(CheckoutState::FormValidating);
        let cart = self.cart.get_cart(Some(s)).await?;
        if cart.items.is_empty() {
            return Err(StorefrontError::Validation("cart is empty".into()));
        }
        form.validate()?;
        if form.shipping_address.is_blank() {
            return Err(StorefrontError::Validation("shipping address is required".into()));
        }
        self.verify_address(&mut form.shipping_address).await?;
        if let Some(billing) = form.billing_address.as_mut().filter(|b| !b.is_blank()) {
            if *billing != form.shipping_address {
                self.verify_address(billing).await?;
            }
        }

        attempt.enter(CheckoutState::ScriptLoading);
        self.widget.load_script().await.map_err(|e| StorefrontError::CheckoutFailed(format!("payment widget unavailable: {}", e)))?;

        let total: Decimal = cart.total_price;
        let gateway: GatewayOrderCreated = self.payments
            .create_gateway_order(Some(s), CreateGatewayOrder { amount: total, currency: None, receipt: None })
            .await
            .map_err(|e| StorefrontError::CheckoutFailed(e.to_string()))?;
        attempt.enter(CheckoutState::GatewayOrderCreated);

        let options = WidgetOptions {
            key_id: gateway.key_id.clone(),
            gateway_order_id: gateway.gateway_order_id.clone(),
            amount: gateway.amount,
            currency: gateway.currency.clone(),
            name: form.customer_name.clone(),
            email: form.customer_email.clone(),
            contact: form.customer_phone.clone(),
        };
        attempt.enter(CheckoutState::WidgetOpen);
        let callback = match self.widget.open(&options).await {
            WidgetOutcome::Paid(callback) => callback,
            WidgetOutcome::Failed(reason) => {
                attempt.enter(CheckoutState::PaymentFailed);
                return Ok(CheckoutOutcome { state: attempt.state(), order_id: None, redirect: None, failure: Some(reason) });
            }
            WidgetOutcome::Dismissed => {
                attempt.enter(CheckoutState::WidgetDismissed);
                return Ok(CheckoutOutcome { state: attempt.state(), order_id: None, redirect: None, failure: None });
            }
        };

        let cart_items = cart.items.iter().map(|i| CheckoutLine {
            product_id: i.product_id,
            product_name: i.product_name.clone(),
            product_price: i.product_price,
            product_image: i.product_image.clone(),
            quantity: i.quantity,
        }).collect();
        let request = VerifyPaymentRequest {
            razorpay_order_id: callback.razorpay_order_id,
            razorpay_payment_id: callback.razorpay_payment_id,
            razorpay_signature: callback.razorpay_signature,
            order_details: OrderDetails {
                customer_name: form.customer_name,
                customer_email: form.customer_email,
                customer_phone: form.customer_phone,
                shipping_address: form.shipping_address,
                billing_address: form.billing_address,
                total_amount: total,
            },
            cart_items,
        };
        let verified = self.payments.verify_payment(Some(s), request).await.map_err(|e| match e {
            StorefrontError::PaymentVerificationFailed(_) => e,
            other => StorefrontError::PaymentVerificationFailed(other.to_string()),
        })?;

        attempt.enter(CheckoutState::PaymentSucceeded);
        // the order is paid; a cart left behind is cleared again by the outbox
        if let Err(e) = self.cart.clear_cart(Some(s)).await {
            warn!(order_id = %verified.order_id, error = %e, "cart not cleared after checkout");
        }
        info!(order_id = %verified.order_id, "checkout complete");
        Ok(CheckoutOutcome {
            state: attempt.state(),
            order_id: Some(verified.order_id),
            redirect: Some(Redirect { path: ORDERS_PATH, after: REDIRECT_DELAY }),
            failure: None,
        })
    }
}

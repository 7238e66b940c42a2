#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use kiln_storefront::api::{AppState, Collaborators};
use kiln_storefront::clients::{
    Carrier, GatewayOrder, PaymentGateway, PostalLookup, ReturnShipment, ReturnShipmentRequest, ShipmentRequest, SignatureVerifier,
};
use kiln_storefront::domain::aggregates::{CarrierShipment, CartItem, CartProduct, CheckoutLine, OrderDetails, Product, ProductDraft};
use kiln_storefront::domain::value_objects::{Address, Money, Pincode, PostalPlace};
use kiln_storefront::messaging::EventPublisher;
use kiln_storefront::services::VerifyPaymentRequest;
use kiln_storefront::store::{CartRepository, MemoryStore, Store};
use kiln_storefront::{Result, Session, StorefrontError};

pub const SECRET: &str = "rzp_test_secret";
pub const KEY_ID: &str = "rzp_test_key";

#[derive(Default)]
pub struct StubGateway {
    pub fail: AtomicBool,
    pub created: AtomicUsize,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn key_id(&self) -> &str { KEY_ID }

    async fn create_order(&self, amount: &Money, receipt: &str) -> Result<GatewayOrder> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorefrontError::external("razorpay", "gateway unavailable"));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(GatewayOrder { gateway_order_id: format!("order_{}", n), amount: amount.minor_units()?, currency: amount.currency().to_string(), receipt: Some(receipt.to_string()) })
    }
}

#[derive(Default)]
pub struct StubCarrier {
    pub fail_create: AtomicBool,
    pub fail_cancel: AtomicBool,
    pub shipments: Mutex<Vec<ShipmentRequest>>,
    pub cancelled: Mutex<Vec<String>>,
    pub returns: Mutex<Vec<ReturnShipmentRequest>>,
}

impl StubCarrier {
    pub fn shipment_count(&self) -> usize { self.shipments.lock().unwrap().len() }
}

#[async_trait]
impl Carrier for StubCarrier {
    async fn create_shipment(&self, request: &ShipmentRequest) -> Result<CarrierShipment> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(StorefrontError::external("shiprocket", "carrier unavailable"));
        }
        let mut shipments = self.shipments.lock().unwrap();
        shipments.push(request.clone());
        Ok(CarrierShipment { carrier_order_id: format!("SR-{}", shipments.len()), awb: None, courier: None, label_url: None })
    }

    async fn cancel_shipments(&self, carrier_order_ids: &[String]) -> Result<()> {
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(StorefrontError::external("shiprocket", "cancel rejected"));
        }
        self.cancelled.lock().unwrap().extend_from_slice(carrier_order_ids);
        Ok(())
    }

    async fn create_return(&self, request: &ReturnShipmentRequest) -> Result<ReturnShipment> {
        let mut returns = self.returns.lock().unwrap();
        returns.push(request.clone());
        Ok(ReturnShipment { return_id: format!("RET-{}", returns.len()), status: Some("NEW".into()), awb: None })
    }
}

pub struct StubPostal;

#[async_trait]
impl PostalLookup for StubPostal {
    async fn lookup(&self, pincode: &Pincode) -> Result<PostalPlace> {
        match pincode.as_str() {
            "400001" => Ok(PostalPlace { post_office: "Mumbai G.P.O.".into(), district: "Mumbai".into(), state: "Maharashtra".into() }),
            _ => Err(StorefrontError::NotFound(format!("Pincode {}", pincode))),
        }
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    pub carrier: Arc<StubCarrier>,
    pub verifier: SignatureVerifier,
}

impl Harness {
    pub fn new() -> Self { Self::with_token(None) }

    pub fn with_token(webhook_token: Option<String>) -> Self { Self::build(webhook_token, |store| store as Arc<dyn Store>) }

    /// Services see `wrap(store)` while seeding and assertions still go to the memory store.
    pub fn wrapping(wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn Store>) -> Self { Self::build(None, wrap) }

    fn build(webhook_token: Option<String>, wrap: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn Store>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(StubGateway::default());
        let carrier = Arc::new(StubCarrier::default());
        let deps = Collaborators {
            gateway: gateway.clone(),
            verifier: SignatureVerifier::new(SECRET),
            carrier: carrier.clone(),
            postal: Arc::new(StubPostal),
        };
        let state = AppState::new(wrap(store.clone()), EventPublisher::log_only(), deps, "INR", webhook_token);
        Self { store, state, gateway, carrier, verifier: SignatureVerifier::new(SECRET) }
    }

    pub async fn seed(&self, id: i64, price: i64, stock: i32) {
        self.store.put_product(Product::create(id, ProductDraft {
            name: format!("Piece {}", id), price: Decimal::new(price, 0), stock_quantity: stock, weight_grams: Some(400), ..Default::default()
        })).await;
    }

    /// Puts a line straight into the cart, without the add-to-cart stock reservation.
    pub async fn put_in_cart(&self, user: &Session, product_id: i64, price: i64, quantity: i32) {
        let mut item = CartItem::new(user.user_id, &CartProduct { id: product_id, name: format!("Piece {}", product_id), price: Decimal::new(price, 0), image: String::new() });
        item.quantity = quantity;
        assert!(self.store.insert_cart_item(&item).await.unwrap());
    }

    pub fn verify_request(&self, payment_id: &str, lines: &[(i64, i64, i32)]) -> VerifyPaymentRequest {
        let gateway_order_id = format!("order_for_{}", payment_id);
        let cart_items: Vec<CheckoutLine> = lines.iter().map(|(id, price, qty)| CheckoutLine {
            product_id: *id, product_name: format!("Piece {}", id), product_price: Decimal::new(*price, 0), product_image: String::new(), quantity: *qty,
        }).collect();
        let total = cart_items.iter().map(|l| l.product_price * Decimal::from(l.quantity)).sum();
        VerifyPaymentRequest {
            razorpay_signature: self.verifier.sign(&gateway_order_id, payment_id).unwrap(),
            razorpay_order_id: gateway_order_id,
            razorpay_payment_id: payment_id.to_string(),
            order_details: details(total),
            cart_items,
        }
    }

    /// Places a paid order for two of product 7 at 250. Product 7 must be seeded.
    pub async fn place_order(&self, user: &Session, payment_id: &str) -> Uuid {
        self.put_in_cart(user, 7, 250, 2).await;
        let response = self.state.payments.verify_payment(Some(user), self.verify_request(payment_id, &[(7, 250, 2)])).await.unwrap();
        response.order_id
    }
}

pub fn mumbai() -> Address {
    Address { line1: "12 Clay Lane".into(), pincode: "400001".into(), phone: Some("9800000000".into()), ..Default::default() }
}

pub fn details(total: Decimal) -> OrderDetails {
    OrderDetails {
        customer_name: "Asha Potter".into(),
        customer_email: "asha@example.com".into(),
        customer_phone: Some("9800000000".into()),
        shipping_address: Address { city: "Mumbai".into(), state: "Maharashtra".into(), ..mumbai() },
        billing_address: None,
        total_amount: total,
    }
}

pub fn shopper() -> Session { Session::shopper(Uuid::new_v4()) }
pub fn admin() -> Session { Session::admin(Uuid::new_v4()) }

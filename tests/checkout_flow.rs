mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal_macros::dec;

use common::{admin, mumbai, shopper, Harness, SECRET};
use kiln_storefront::clients::SignatureVerifier;
use kiln_storefront::domain::aggregates::{
    CartItem, CartProduct, FulfillmentStatus, InventoryMovement, MovementType, Order, OrderEvent, OrderItem, Product, ProductDraft,
    ReturnRequest, ReturnStatus, WishlistItem,
};
use kiln_storefront::services::{CheckoutAttempt, CheckoutFlow, CheckoutForm, CheckoutState, PaymentCallback, PaymentWidget, WidgetOptions, WidgetOutcome};
use kiln_storefront::store::{
    CartRepository, CatalogRepository, MemoryStore, OrderFilter, OrderRepository, OutboxRepository, OutboxTask, ProductFilter,
    ReturnRepository, Store, WishlistRepository,
};
use uuid::Uuid;
use kiln_storefront::{Result, StorefrontError};

#[tokio::test]
async fn test_verified_payment_records_order_and_runs_side_effects() {
    let h = Harness::new();
    h.seed(7, 250, 10).await;
    let user = shopper();
    h.put_in_cart(&user, 7, 250, 2).await;

    let response = h.state.payments.verify_payment(Some(&user), h.verify_request("pay_100", &[(7, 250, 2)])).await.unwrap();
    assert!(response.success);
    assert!(!response.replayed);

    let view = h.state.fulfillment.get_order(Some(&user), response.order_id).await.unwrap();
    assert_eq!(view.order.total_amount, dec!(500));
    assert_eq!(view.items.len(), 1);
    assert_eq!(view.items[0].subtotal, dec!(500));
    assert_eq!(h.store.get_product(7).await.unwrap().unwrap().stock_quantity, 8);
    assert!(h.store.list_cart(user.user_id).await.unwrap().is_empty());

    // shipment booked by the outbox, order moved on
    assert_eq!(h.carrier.shipment_count(), 1);
    assert_eq!(view.order.fulfillment_status, FulfillmentStatus::Processing);
    assert_eq!(view.order.shiprocket_order_id.as_deref(), Some("SR-1"));
    let shipment = h.carrier.shipments.lock().unwrap()[0].clone();
    assert_eq!(shipment.package.weight_grams, 800);
    assert_eq!(shipment.lines[0].sku.as_str(), "SKU-7");
    assert!(shipment.prepaid);
}

#[tokio::test]
async fn test_signature_mismatch_changes_nothing() {
    let h = Harness::new();
    h.seed(7, 250, 10).await;
    let user = shopper();
    h.put_in_cart(&user, 7, 250, 2).await;

    let mut request = h.verify_request("pay_101", &[(7, 250, 2)]);
    request.razorpay_signature = "0".repeat(64);
    let err = h.state.payments.verify_payment(Some(&user), request).await.unwrap_err();
    assert!(matches!(err, StorefrontError::InvalidSignature));

    assert!(h.state.fulfillment.list_orders(Some(&admin()), None).await.unwrap().is_empty());
    assert_eq!(h.store.get_product(7).await.unwrap().unwrap().stock_quantity, 10);
    assert_eq!(h.store.list_cart(user.user_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_replayed_payment_returns_same_order() {
    let h = Harness::new();
    h.seed(7, 250, 10).await;
    let user = shopper();
    let first = h.place_order(&user, "pay_102").await;

    let again = h.state.payments.verify_payment(Some(&user), h.verify_request("pay_102", &[(7, 250, 2)])).await.unwrap();
    assert!(again.replayed);
    assert_eq!(again.order_id, first);
    assert_eq!(h.state.fulfillment.list_my_orders(Some(&user)).await.unwrap().len(), 1);
    assert_eq!(h.store.get_product(7).await.unwrap().unwrap().stock_quantity, 8);

    let stranger = shopper();
    let err = h.state.payments.verify_payment(Some(&stranger), h.verify_request("pay_102", &[(7, 250, 2)])).await.unwrap_err();
    assert!(matches!(err, StorefrontError::PaymentVerificationFailed(_)));
}

#[tokio::test]
async fn test_tampered_cart_snapshot_rejected() {
    let h = Harness::new();
    h.seed(7, 250, 10).await;
    let user = shopper();
    h.put_in_cart(&user, 7, 250, 2).await;

    let err = h.state.payments.verify_payment(Some(&user), h.verify_request("pay_103", &[(7, 1, 2)])).await.unwrap_err();
    assert!(matches!(err, StorefrontError::PaymentVerificationFailed(_)));
    assert!(h.store.find_order_by_payment("pay_103").await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_shipment_is_retried_by_outbox() {
    let h = Harness::new();
    h.seed(7, 250, 10).await;
    h.carrier.fail_create.store(true, Ordering::SeqCst);
    let user = shopper();
    let order_id = h.place_order(&user, "pay_104").await;

    let order = h.store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.fulfillment_status, FulfillmentStatus::Pending);
    assert!(order.shiprocket_order_id.is_none());
    // the order survives; stock and cart steps went through
    assert_eq!(h.store.get_product(7).await.unwrap().unwrap().stock_quantity, 8);

    h.carrier.fail_create.store(false, Ordering::SeqCst);
    let report = h.state.outbox.drain(10).await.unwrap();
    assert_eq!(report.completed, 1);
    let order = h.store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.fulfillment_status, FulfillmentStatus::Processing);
    assert_eq!(h.state.outbox.drain(10).await.unwrap().completed, 0);
}

#[tokio::test]
async fn test_concurrent_add_of_sold_out_product() {
    let h = Harness::new();
    h.seed(9, 400, 0).await;
    let (a, b) = (shopper(), shopper());
    let product = CartProduct { id: 9, name: "Piece 9".into(), price: dec!(400), image: String::new() };

    let (ra, rb) = tokio::join!(
        h.state.cart.add_item(Some(&a), product.clone(), Some(0)),
        h.state.cart.add_item(Some(&b), product.clone(), Some(0)),
    );
    assert!(matches!(ra, Err(StorefrontError::OutOfStock(9))));
    assert!(matches!(rb, Err(StorefrontError::OutOfStock(9))));

    // a stale stock reading still cannot take the last unit twice
    let (ra, rb) = tokio::join!(
        h.state.cart.add_item(Some(&a), product.clone(), Some(1)),
        h.state.cart.add_item(Some(&b), product, Some(1)),
    );
    assert!(ra.is_err() && rb.is_err());
    assert_eq!(h.store.get_product(9).await.unwrap().unwrap().stock_quantity, 0);
}

enum Behaviour { Pay, Fail, Dismiss }

struct StubWidget {
    behaviour: Behaviour,
    verifier: SignatureVerifier,
}

#[async_trait]
impl PaymentWidget for StubWidget {
    async fn load_script(&self) -> Result<()> { Ok(()) }

    async fn open(&self, options: &WidgetOptions) -> WidgetOutcome {
        match self.behaviour {
            Behaviour::Pay => WidgetOutcome::Paid(PaymentCallback {
                razorpay_order_id: options.gateway_order_id.clone(),
                razorpay_payment_id: "pay_widget".into(),
                razorpay_signature: self.verifier.sign(&options.gateway_order_id, "pay_widget").unwrap(),
            }),
            Behaviour::Fail => WidgetOutcome::Failed("card declined".into()),
            Behaviour::Dismiss => WidgetOutcome::Dismissed,
        }
    }
}

fn flow(h: &Harness, behaviour: Behaviour) -> CheckoutFlow {
    let widget = Arc::new(StubWidget { behaviour, verifier: SignatureVerifier::new(SECRET) });
    CheckoutFlow::new(h.state.cart.clone(), h.state.payments.clone(), h.state.postal.clone(), widget)
}

fn form(pincode: &str) -> CheckoutForm {
    CheckoutForm {
        customer_name: "Asha Potter".into(),
        customer_email: "asha@example.com".into(),
        customer_phone: Some("9800000000".into()),
        shipping_address: kiln_storefront::domain::value_objects::Address { pincode: pincode.into(), ..mumbai() },
        billing_address: None,
    }
}

async fn cart_with_vase(h: &Harness) -> kiln_storefront::Session {
    h.seed(7, 250, 10).await;
    let user = shopper();
    let vase = CartProduct { id: 7, name: "Piece 7".into(), price: dec!(250), image: String::new() };
    h.state.cart.add_item(Some(&user), vase, Some(10)).await.unwrap();
    user
}

#[tokio::test]
async fn test_checkout_happy_path() {
    let h = Harness::new();
    let user = cart_with_vase(&h).await;
    let mut attempt = CheckoutAttempt::new();

    let outcome = flow(&h, Behaviour::Pay).run(&mut attempt, Some(&user), form("400001")).await.unwrap();
    assert_eq!(outcome.state, CheckoutState::PaymentSucceeded);
    assert_eq!(outcome.redirect.unwrap().path, "/orders");
    assert_eq!(attempt.history(), &[
        CheckoutState::FormValidating, CheckoutState::ScriptLoading, CheckoutState::GatewayOrderCreated,
        CheckoutState::WidgetOpen, CheckoutState::PaymentSucceeded,
    ]);
    assert!(h.state.cart.get_cart(Some(&user)).await.unwrap().items.is_empty());

    let order = h.store.get_order(outcome.order_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(order.shipping_address.city, "Mumbai");
    assert_eq!(order.shipping_address.state, "Maharashtra");
    // one unit reserved on add, one sold at checkout
    assert_eq!(h.store.get_product(7).await.unwrap().unwrap().stock_quantity, 8);
}

#[tokio::test]
async fn test_unknown_pincode_blocks_checkout() {
    let h = Harness::new();
    let user = cart_with_vase(&h).await;
    let mut attempt = CheckoutAttempt::new();

    let err = flow(&h, Behaviour::Pay).run(&mut attempt, Some(&user), form("000000")).await.unwrap_err();
    assert!(matches!(err, StorefrontError::Validation(_)));
    assert_eq!(attempt.state(), CheckoutState::FormValidating);
    assert_eq!(h.gateway.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_gateway_failure_leaves_cart() {
    let h = Harness::new();
    let user = cart_with_vase(&h).await;
    h.gateway.fail.store(true, Ordering::SeqCst);
    let mut attempt = CheckoutAttempt::new();

    let err = flow(&h, Behaviour::Pay).run(&mut attempt, Some(&user), form("400001")).await.unwrap_err();
    assert!(matches!(err, StorefrontError::CheckoutFailed(_)));
    assert_eq!(h.state.cart.get_cart(Some(&user)).await.unwrap().item_count, 1);
}

#[tokio::test]
async fn test_widget_failure_and_dismissal() {
    let h = Harness::new();
    let user = cart_with_vase(&h).await;

    let mut attempt = CheckoutAttempt::new();
    let outcome = flow(&h, Behaviour::Fail).run(&mut attempt, Some(&user), form("400001")).await.unwrap();
    assert_eq!(outcome.state, CheckoutState::PaymentFailed);
    assert_eq!(outcome.failure.as_deref(), Some("card declined"));

    let mut attempt = CheckoutAttempt::new();
    let outcome = flow(&h, Behaviour::Dismiss).run(&mut attempt, Some(&user), form("400001")).await.unwrap();
    assert_eq!(outcome.state, CheckoutState::WidgetDismissed);
    assert!(outcome.order_id.is_none());
    assert_eq!(h.state.cart.get_cart(Some(&user)).await.unwrap().item_count, 1);
}

#[tokio::test]
async fn test_checkout_requires_session() {
    let h = Harness::new();
    let mut attempt = CheckoutAttempt::new();
    let err = flow(&h, Behaviour::Pay).run(&mut attempt, None, form("400001")).await.unwrap_err();
    assert!(matches!(err, StorefrontError::AuthenticationRequired));
    assert!(attempt.history().is_empty());
}

/// Memory store whose cart clears always fail.
struct StuckCart(Arc<MemoryStore>);

#[async_trait]
impl CartRepository for StuckCart {
    async fn list_cart(&self, user_id: Uuid) -> Result<Vec<CartItem>> { self.0.list_cart(user_id).await }
    async fn insert_cart_item(&self, item: &CartItem) -> Result<bool> { self.0.insert_cart_item(item).await }
    async fn set_cart_quantity(&self, user_id: Uuid, product_id: i64, quantity: i32) -> Result<Option<CartItem>> { self.0.set_cart_quantity(user_id, product_id, quantity).await }
    async fn remove_cart_item(&self, user_id: Uuid, product_id: i64) -> Result<bool> { self.0.remove_cart_item(user_id, product_id).await }
    async fn clear_cart(&self, _user_id: Uuid) -> Result<u64> { Err(StorefrontError::Storage("cart table locked".into())) }
}

#[async_trait]
impl CatalogRepository for StuckCart {
    async fn insert_product(&self, draft: ProductDraft) -> Result<Product> { self.0.insert_product(draft).await }
    async fn save_product(&self, product: &Product) -> Result<()> { self.0.save_product(product).await }
    async fn get_product(&self, id: i64) -> Result<Option<Product>> { self.0.get_product(id).await }
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> { self.0.list_products(filter).await }
    async fn adjust_stock(&self, product_id: i64, delta: i32, movement_type: MovementType, notes: Option<String>) -> Result<(Product, InventoryMovement)> {
        self.0.adjust_stock(product_id, delta, movement_type, notes).await
    }
    async fn list_movements(&self, product_id: Option<i64>, limit: i64) -> Result<Vec<InventoryMovement>> { self.0.list_movements(product_id, limit).await }
}

#[async_trait]
impl WishlistRepository for StuckCart {
    async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>> { self.0.list_wishlist(user_id).await }
    async fn insert_wishlist_item(&self, item: &WishlistItem) -> Result<bool> { self.0.insert_wishlist_item(item).await }
    async fn remove_wishlist_item(&self, user_id: Uuid, product_id: i64) -> Result<bool> { self.0.remove_wishlist_item(user_id, product_id).await }
    async fn clear_wishlist(&self, user_id: Uuid) -> Result<u64> { self.0.clear_wishlist(user_id).await }
}

#[async_trait]
impl OrderRepository for StuckCart {
    async fn insert_order(&self, order: &Order, items: &[OrderItem], placed: &OrderEvent, tasks: &[OutboxTask]) -> Result<()> {
        self.0.insert_order(order, items, placed, tasks).await
    }
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> { self.0.get_order(id).await }
    async fn find_order_by_payment(&self, gateway_payment_id: &str) -> Result<Option<Order>> { self.0.find_order_by_payment(gateway_payment_id).await }
    async fn find_order_by_carrier_id(&self, carrier_order_id: &str) -> Result<Option<Order>> { self.0.find_order_by_carrier_id(carrier_order_id).await }
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> { self.0.list_orders(filter).await }
    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> { self.0.order_items(order_id).await }
    async fn update_order(&self, order: &Order, event: Option<&OrderEvent>) -> Result<()> { self.0.update_order(order, event).await }
    async fn append_order_event(&self, event: &OrderEvent) -> Result<bool> { self.0.append_order_event(event).await }
    async fn order_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>> { self.0.order_events(order_id).await }
}

#[async_trait]
impl ReturnRepository for StuckCart {
    async fn insert_return(&self, request: &ReturnRequest) -> Result<()> { self.0.insert_return(request).await }
    async fn get_return(&self, id: Uuid) -> Result<Option<ReturnRequest>> { self.0.get_return(id).await }
    async fn find_return_by_order(&self, order_id: Uuid) -> Result<Option<ReturnRequest>> { self.0.find_return_by_order(order_id).await }
    async fn list_returns(&self, status: Option<ReturnStatus>) -> Result<Vec<ReturnRequest>> { self.0.list_returns(status).await }
    async fn save_return(&self, request: &ReturnRequest) -> Result<()> { self.0.save_return(request).await }
}

#[async_trait]
impl OutboxRepository for StuckCart {
    async fn pending_tasks(&self, max_attempts: i32, limit: i64) -> Result<Vec<OutboxTask>> { self.0.pending_tasks(max_attempts, limit).await }
    async fn tasks_for_order(&self, order_id: Uuid) -> Result<Vec<OutboxTask>> { self.0.tasks_for_order(order_id).await }
    async fn complete_task(&self, id: Uuid) -> Result<()> { self.0.complete_task(id).await }
    async fn fail_task(&self, id: Uuid, error: &str) -> Result<()> { self.0.fail_task(id, error).await }
}

#[tokio::test]
async fn test_paid_checkout_survives_cart_clear_failure() {
    let h = Harness::wrapping(|store| Arc::new(StuckCart(store)) as Arc<dyn Store>);
    let user = cart_with_vase(&h).await;
    let mut attempt = CheckoutAttempt::new();

    let outcome = flow(&h, Behaviour::Pay).run(&mut attempt, Some(&user), form("400001")).await.unwrap();
    assert_eq!(outcome.state, CheckoutState::PaymentSucceeded);
    assert_eq!(outcome.redirect.unwrap().path, "/orders");
    let order_id = outcome.order_id.unwrap();
    assert!(h.store.get_order(order_id).await.unwrap().is_some());

    // the leftover line stays for the outbox to retry
    assert_eq!(h.store.list_cart(user.user_id).await.unwrap().len(), 1);
    let pending = h.store.tasks_for_order(order_id).await.unwrap();
    assert!(pending.iter().any(|t| !t.is_done() && t.attempts == 1));
}

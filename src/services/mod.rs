//! Application services. Each takes the caller's session explicitly.

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod fulfillment;
pub mod outbox;
pub mod payment;
pub mod returns;
pub mod wishlist;

pub use cart::CartService;
pub use catalog::{CatalogService, ImageUpload};
pub use checkout::{CheckoutAttempt, CheckoutFlow, CheckoutForm, CheckoutOutcome, CheckoutState, PaymentCallback, PaymentWidget, WidgetOptions, WidgetOutcome};
pub use fulfillment::{CarrierWebhook, FulfillmentService, OrderView, ShipmentView, WebhookOutcome};
pub use outbox::OutboxWorker;
pub use payment::{CreateGatewayOrder, GatewayOrderCreated, PaymentService, VerifyPaymentRequest, VerifyPaymentResponse};
pub use returns::ReturnService;
pub use wishlist::WishlistService;

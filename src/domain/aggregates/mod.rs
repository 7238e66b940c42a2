//! Aggregates module
pub mod product;
pub mod cart;
pub mod wishlist;
pub mod order;
pub mod return_request;

pub use product::{InventoryMovement, MovementType, Product, ProductDraft, ProductPatch};
pub use cart::{Cart, CartItem, CartProduct, CartView};
pub use wishlist::WishlistItem;
pub use order::{CarrierShipment, CheckoutLine, FulfillmentStatus, GatewayPayment, Order, OrderDetails, OrderEvent, OrderItem, PaymentStatus};
pub use return_request::{ReturnForm, ReturnReason, ReturnRequest, ReturnStatus};

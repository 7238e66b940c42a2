//! Persistence seam over the managed data store.
//!
//! Every table the storefront touches sits behind one of these traits. Row
//! filtering by owner happens in the services; the stores only answer the
//! queries they are given.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::aggregates::{
    CartItem, FulfillmentStatus, InventoryMovement, MovementType, Order, OrderEvent, OrderItem, Product,
    ProductDraft, ReturnRequest, ReturnStatus, WishlistItem,
};
use crate::error::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub featured_only: bool,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<FulfillmentStatus>,
}

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn insert_product(&self, draft: ProductDraft) -> Result<Product>;
    /// Persists every field except `stock_quantity`.
    async fn save_product(&self, product: &Product) -> Result<()>;
    async fn get_product(&self, id: i64) -> Result<Option<Product>>;
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>>;
    /// Atomically moves stock by `delta` and records the movement.
    /// Fails with `InsufficientStock` and records nothing if the result would be negative.
    async fn adjust_stock(&self, product_id: i64, delta: i32, movement_type: MovementType, notes: Option<String>) -> Result<(Product, InventoryMovement)>;
    async fn list_movements(&self, product_id: Option<i64>, limit: i64) -> Result<Vec<InventoryMovement>>;
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn list_cart(&self, user_id: Uuid) -> Result<Vec<CartItem>>;
    /// Returns false when the (user, product) line already exists.
    async fn insert_cart_item(&self, item: &CartItem) -> Result<bool>;
    async fn set_cart_quantity(&self, user_id: Uuid, product_id: i64, quantity: i32) -> Result<Option<CartItem>>;
    async fn remove_cart_item(&self, user_id: Uuid, product_id: i64) -> Result<bool>;
    async fn clear_cart(&self, user_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait WishlistRepository: Send + Sync {
    async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>>;
    /// Returns false when the product is already saved.
    async fn insert_wishlist_item(&self, item: &WishlistItem) -> Result<bool>;
    async fn remove_wishlist_item(&self, user_id: Uuid, product_id: i64) -> Result<bool>;
    async fn clear_wishlist(&self, user_id: Uuid) -> Result<u64>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Writes the order, its items, its first timeline entry and its side-effect tasks in one unit.
    async fn insert_order(&self, order: &Order, items: &[OrderItem], placed: &OrderEvent, tasks: &[OutboxTask]) -> Result<()>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn find_order_by_payment(&self, gateway_payment_id: &str) -> Result<Option<Order>>;
    async fn find_order_by_carrier_id(&self, carrier_order_id: &str) -> Result<Option<Order>>;
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>>;
    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>>;
    /// Persists status and carrier fields, plus the timeline entry for the change if any.
    async fn update_order(&self, order: &Order, event: Option<&OrderEvent>) -> Result<()>;
    /// Idempotent on (order, status, created_at); returns false for a duplicate.
    async fn append_order_event(&self, event: &OrderEvent) -> Result<bool>;
    async fn order_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>>;
}

#[async_trait]
pub trait ReturnRepository: Send + Sync {
    async fn insert_return(&self, request: &ReturnRequest) -> Result<()>;
    async fn get_return(&self, id: Uuid) -> Result<Option<ReturnRequest>>;
    async fn find_return_by_order(&self, order_id: Uuid) -> Result<Option<ReturnRequest>>;
    async fn list_returns(&self, status: Option<ReturnStatus>) -> Result<Vec<ReturnRequest>>;
    async fn save_return(&self, request: &ReturnRequest) -> Result<()>;
}

/// A side effect of order placement still owed to the shopper.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboxTask {
    pub id: Uuid,
    pub order_id: Uuid,
    pub action: OutboxAction,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboxAction {
    ClearCart { user_id: Uuid },
    DecrementStock { product_id: i64, quantity: i32, product_name: String },
    CreateShipment,
}

impl OutboxTask {
    pub fn new(order_id: Uuid, action: OutboxAction) -> Self {
        Self { id: Uuid::now_v7(), order_id, action, attempts: 0, last_error: None, completed_at: None, created_at: Utc::now() }
    }

    pub fn is_done(&self) -> bool { self.completed_at.is_some() }
}

#[async_trait]
pub trait OutboxRepository: Send + Sync {
    async fn pending_tasks(&self, max_attempts: i32, limit: i64) -> Result<Vec<OutboxTask>>;
    async fn tasks_for_order(&self, order_id: Uuid) -> Result<Vec<OutboxTask>>;
    async fn complete_task(&self, id: Uuid) -> Result<()>;
    async fn fail_task(&self, id: Uuid, error: &str) -> Result<()>;
}

/// Everything the services need from storage.
pub trait Store: CatalogRepository + CartRepository + WishlistRepository + OrderRepository + ReturnRepository + OutboxRepository {}

impl<T> Store for T where T: CatalogRepository + CartRepository + WishlistRepository + OrderRepository + ReturnRepository + OutboxRepository {}

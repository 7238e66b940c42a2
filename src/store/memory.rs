//! In-process store used by tests and by local runs without `DATABASE_URL`.
//!
//! One lock guards every table, so each trait method is atomic the way a
//! single Postgres transaction is.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    CartRepository, CatalogRepository, OrderFilter, OrderRepository, OutboxRepository, OutboxTask, ProductFilter,
    ReturnRepository, WishlistRepository,
};
use crate::domain::aggregates::{
    CartItem, InventoryMovement, MovementType, Order, OrderEvent, OrderItem, Product, ProductDraft, ReturnRequest,
    ReturnStatus, WishlistItem,
};
use crate::error::{Result, StorefrontError};

#[derive(Default)]
struct Tables {
    next_product_id: i64,
    products: BTreeMap<i64, Product>,
    movements: Vec<InventoryMovement>,
    cart: Vec<CartItem>,
    wishlist: Vec<WishlistItem>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
    order_events: Vec<OrderEvent>,
    returns: HashMap<Uuid, ReturnRequest>,
    outbox: Vec<OutboxTask>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// Seeds a product with a fixed id, bypassing the id sequence. Its stock is
    /// recorded as an opening restock so the ledger still sums to it.
    pub async fn put_product(&self, mut product: Product) {
        let opening = std::mem::take(&mut product.stock_quantity);
        let mut t = self.tables.write().await;
        t.next_product_id = t.next_product_id.max(product.id);
        if opening > 0 {
            if let Ok(movement) = product.adjust_stock(opening, MovementType::Restock, Some("Opening stock".into())) {
                t.movements.push(movement);
            }
        }
        t.products.insert(product.id, detached_product(&product));
    }
}

fn detached_product(product: &Product) -> Product {
    let mut stored = product.clone();
    stored.events.clear();
    stored
}

/// Timeline entries are unique on (order, status, created_at).
fn is_recorded(events: &[OrderEvent], event: &OrderEvent) -> bool {
    events.iter().any(|e| e.order_id == event.order_id && e.status == event.status && e.created_at == event.created_at)
}

fn detached_order(order: &Order) -> Order {
    let mut stored = order.clone();
    stored.events.clear();
    stored
}

fn detached_return(request: &ReturnRequest) -> ReturnRequest {
    let mut stored = request.clone();
    stored.events.clear();
    stored
}

#[async_trait]
impl CatalogRepository for MemoryStore {
    async fn insert_product(&self, draft: ProductDraft) -> Result<Product> {
        let mut t = self.tables.write().await;
        let (product, opening) = Product::open(t.next_product_id + 1, draft)?;
        t.next_product_id = product.id;
        t.movements.extend(opening);
        t.products.insert(product.id, detached_product(&product));
        Ok(product)
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        let mut t = self.tables.write().await;
        let stored = t.products.get_mut(&product.id).ok_or_else(|| StorefrontError::NotFound(format!("Product {}", product.id)))?;
        let stock = stored.stock_quantity;
        *stored = detached_product(product);
        stored.stock_quantity = stock;
        Ok(())
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let t = self.tables.read().await;
        let mut products: Vec<Product> = t.products.values()
            .filter(|p| filter.include_inactive || p.is_active)
            .filter(|p| !filter.featured_only || p.is_featured)
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(products)
    }

    async fn adjust_stock(&self, product_id: i64, delta: i32, movement_type: MovementType, notes: Option<String>) -> Result<(Product, InventoryMovement)> {
        let mut t = self.tables.write().await;
        let stored = t.products.get_mut(&product_id).ok_or_else(|| StorefrontError::NotFound(format!("Product {}", product_id)))?;
        let mut product = stored.clone();
        let movement = product.adjust_stock(delta, movement_type, notes)?;
        *stored = detached_product(&product);
        t.movements.push(movement.clone());
        Ok((product, movement))
    }

    async fn list_movements(&self, product_id: Option<i64>, limit: i64) -> Result<Vec<InventoryMovement>> {
        let t = self.tables.read().await;
        Ok(t.movements.iter().rev()
            .filter(|m| product_id.map_or(true, |id| m.product_id == id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn list_cart(&self, user_id: Uuid) -> Result<Vec<CartItem>> {
        Ok(self.tables.read().await.cart.iter().filter(|i| i.user_id == user_id).cloned().collect())
    }

    async fn insert_cart_item(&self, item: &CartItem) -> Result<bool> {
        let mut t = self.tables.write().await;
        if t.cart.iter().any(|i| i.user_id == item.user_id && i.product_id == item.product_id) {
            return Ok(false);
        }
        t.cart.push(item.clone());
        Ok(true)
    }

    async fn set_cart_quantity(&self, user_id: Uuid, product_id: i64, quantity: i32) -> Result<Option<CartItem>> {
        let mut t = self.tables.write().await;
        Ok(t.cart.iter_mut().find(|i| i.user_id == user_id && i.product_id == product_id).map(|i| {
            i.quantity = quantity;
            i.updated_at = Utc::now();
            i.clone()
        }))
    }

    async fn remove_cart_item(&self, user_id: Uuid, product_id: i64) -> Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.cart.len();
        t.cart.retain(|i| !(i.user_id == user_id && i.product_id == product_id));
        Ok(t.cart.len() < before)
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<u64> {
        let mut t = self.tables.write().await;
        let before = t.cart.len();
        t.cart.retain(|i| i.user_id != user_id);
        Ok((before - t.cart.len()) as u64)
    }
}

#[async_trait]
impl WishlistRepository for MemoryStore {
    async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>> {
        Ok(self.tables.read().await.wishlist.iter().filter(|i| i.user_id == user_id).cloned().collect())
    }

    async fn insert_wishlist_item(&self, item: &WishlistItem) -> Result<bool> {
        let mut t = self.tables.write().await;
        if t.wishlist.iter().any(|i| i.user_id == item.user_id && i.product_id == item.product_id) {
            return Ok(false);
        }
        t.wishlist.push(item.clone());
        Ok(true)
    }

    async fn remove_wishlist_item(&self, user_id: Uuid, product_id: i64) -> Result<bool> {
        let mut t = self.tables.write().await;
        let before = t.wishlist.len();
        t.wishlist.retain(|i| !(i.user_id == user_id && i.product_id == product_id));
        Ok(t.wishlist.len() < before)
    }

    async fn clear_wishlist(&self, user_id: Uuid) -> Result<u64> {
        let mut t = self.tables.write().await;
        let before = t.wishlist.len();
        t.wishlist.retain(|i| i.user_id != user_id);
        Ok((before - t.wishlist.len()) as u64)
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem], placed: &OrderEvent, tasks: &[OutboxTask]) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.orders.values().any(|o| o.gateway_payment_id == order.gateway_payment_id) {
            return Err(StorefrontError::PaymentVerificationFailed(format!("payment {} already recorded", order.gateway_payment_id)));
        }
        t.orders.insert(order.id, detached_order(order));
        t.order_items.extend_from_slice(items);
        t.order_events.push(placed.clone());
        t.outbox.extend_from_slice(tasks);
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_payment(&self, gateway_payment_id: &str) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.values().find(|o| o.gateway_payment_id == gateway_payment_id).cloned())
    }

    async fn find_order_by_carrier_id(&self, carrier_order_id: &str) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.values().find(|o| o.shiprocket_order_id.as_deref() == Some(carrier_order_id)).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let t = self.tables.read().await;
        let mut orders: Vec<Order> = t.orders.values()
            .filter(|o| filter.user_id.map_or(true, |u| o.user_id == u))
            .filter(|o| filter.status.map_or(true, |s| o.fulfillment_status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        Ok(self.tables.read().await.order_items.iter().filter(|i| i.order_id == order_id).cloned().collect())
    }

    async fn update_order(&self, order: &Order, event: Option<&OrderEvent>) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.orders.contains_key(&order.id) {
            return Err(StorefrontError::NotFound(format!("Order {}", order.id)));
        }
        t.orders.insert(order.id, detached_order(order));
        if let Some(e) = event.filter(|e| !is_recorded(&t.order_events, e)) {
            t.order_events.push(e.clone());
        }
        Ok(())
    }

    async fn append_order_event(&self, event: &OrderEvent) -> Result<bool> {
        let mut t = self.tables.write().await;
        if is_recorded(&t.order_events, event) { return Ok(false); }
        t.order_events.push(event.clone());
        Ok(true)
    }

    async fn order_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>> {
        let t = self.tables.read().await;
        let mut events: Vec<OrderEvent> = t.order_events.iter().filter(|e| e.order_id == order_id).cloned().collect();
        events.sort_by_key(|e| e.created_at);
        Ok(events)
    }
}

#[async_trait]
impl ReturnRepository for MemoryStore {
    async fn insert_return(&self, request: &ReturnRequest) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(prior) = t.returns.values().find(|r| r.order_id == request.order_id) {
            return Err(StorefrontError::transition("return request", prior.status, ReturnStatus::Pending));
        }
        t.returns.insert(request.id, detached_return(request));
        Ok(())
    }

    async fn get_return(&self, id: Uuid) -> Result<Option<ReturnRequest>> {
        Ok(self.tables.read().await.returns.get(&id).cloned())
    }

    async fn find_return_by_order(&self, order_id: Uuid) -> Result<Option<ReturnRequest>> {
        Ok(self.tables.read().await.returns.values().find(|r| r.order_id == order_id).cloned())
    }

    async fn list_returns(&self, status: Option<ReturnStatus>) -> Result<Vec<ReturnRequest>> {
        let t = self.tables.read().await;
        let mut returns: Vec<ReturnRequest> = t.returns.values().filter(|r| status.map_or(true, |s| r.status == s)).cloned().collect();
        returns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(returns)
    }

    async fn save_return(&self, request: &ReturnRequest) -> Result<()> {
        let mut t = self.tables.write().await;
        if !t.returns.contains_key(&request.id) {
            return Err(StorefrontError::NotFound(format!("Return request {}", request.id)));
        }
        t.returns.insert(request.id, detached_return(request));
        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for MemoryStore {
    async fn pending_tasks(&self, max_attempts: i32, limit: i64) -> Result<Vec<OutboxTask>> {
        let t = self.tables.read().await;
        Ok(t.outbox.iter()
            .filter(|task| !task.is_done() && task.attempts < max_attempts)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn tasks_for_order(&self, order_id: Uuid) -> Result<Vec<OutboxTask>> {
        Ok(self.tables.read().await.outbox.iter().filter(|task| task.order_id == order_id).cloned().collect())
    }

    async fn complete_task(&self, id: Uuid) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(task) = t.outbox.iter_mut().find(|task| task.id == id) {
            task.attempts += 1;
            task.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn fail_task(&self, id: Uuid, error: &str) -> Result<()> {
        let mut t = self.tables.write().await;
        if let Some(task) = t.outbox.iter_mut().find(|task| task.id == id) {
            task.attempts += 1;
            task.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

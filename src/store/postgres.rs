//! Postgres-backed store.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    CartRepository, CatalogRepository, OrderFilter, OrderRepository, OutboxAction, OutboxRepository, OutboxTask,
    ProductFilter, ReturnRepository, WishlistRepository,
};
use crate::domain::aggregates::{
    CartItem, InventoryMovement, MovementType, Order, OrderEvent, OrderItem, Product, ProductDraft, ReturnRequest,
    ReturnStatus, WishlistItem,
};
use crate::domain::value_objects::Address;
use crate::error::{Result, StorefrontError};

const PRODUCT_COLUMNS: &str = "id, name, description, price, original_price, images, stock_quantity, low_stock_threshold, \
    is_featured, is_active, rating, review_count, weight_grams, length_cm, width_cm, height_cm, hsn, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| StorefrontError::Storage(e.to_string()))
    }

    async fn lock_product(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Product> {
        sqlx::query_as::<_, Product>(&format!("SELECT {} FROM products WHERE id = $1 FOR UPDATE", PRODUCT_COLUMNS))
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| StorefrontError::NotFound(format!("Product {}", id)))
    }

    /// Stores the product's new stock level together with the movement that produced it.
    async fn write_movement(tx: &mut Transaction<'_, Postgres>, product: &Product, movement: &InventoryMovement) -> Result<()> {
        sqlx::query("UPDATE products SET stock_quantity = $2, updated_at = $3 WHERE id = $1")
            .bind(product.id).bind(product.stock_quantity).bind(product.updated_at)
            .execute(&mut **tx)
            .await?;
        sqlx::query(
            "INSERT INTO inventory_movements (id, product_id, movement_type, quantity_change, previous_stock, new_stock, notes, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(movement.id).bind(movement.product_id).bind(movement.movement_type.as_ref()).bind(movement.quantity_change)
        .bind(movement.previous_stock).bind(movement.new_stock).bind(&movement.notes).bind(movement.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn parse<T: FromStr>(value: &str, column: &str) -> Result<T> {
    T::from_str(value).map_err(|_| StorefrontError::Storage(format!("unexpected {} value {:?}", column, value)))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[derive(sqlx::FromRow)]
struct MovementRow {
    id: Uuid,
    product_id: i64,
    movement_type: String,
    quantity_change: i32,
    previous_stock: i32,
    new_stock: i32,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for InventoryMovement {
    type Error = StorefrontError;
    fn try_from(r: MovementRow) -> Result<Self> {
        Ok(Self {
            id: r.id, product_id: r.product_id, movement_type: parse(&r.movement_type, "movement_type")?,
            quantity_change: r.quantity_change, previous_stock: r.previous_stock, new_stock: r.new_stock,
            notes: r.notes, created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    shipping_address: Json<Address>,
    billing_address: Json<Address>,
    address_snapshot: Option<Json<Address>>,
    total_amount: Decimal,
    payment_status: String,
    fulfillment_status: String,
    payment_method: String,
    gateway_order_id: String,
    gateway_payment_id: String,
    shiprocket_order_id: Option<String>,
    awb: Option<String>,
    courier: Option<String>,
    tracking_url: Option<String>,
    label_url: Option<String>,
    notes: Option<String>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StorefrontError;
    fn try_from(r: OrderRow) -> Result<Self> {
        Ok(Self {
            id: r.id, user_id: r.user_id, customer_name: r.customer_name, customer_email: r.customer_email,
            customer_phone: r.customer_phone, shipping_address: r.shipping_address.0, billing_address: r.billing_address.0,
            address_snapshot: r.address_snapshot.map(|a| a.0), total_amount: r.total_amount,
            payment_status: parse(&r.payment_status, "payment_status")?,
            fulfillment_status: parse(&r.fulfillment_status, "fulfillment_status")?,
            payment_method: r.payment_method, gateway_order_id: r.gateway_order_id, gateway_payment_id: r.gateway_payment_id,
            shiprocket_order_id: r.shiprocket_order_id, awb: r.awb, courier: r.courier, tracking_url: r.tracking_url,
            label_url: r.label_url, notes: r.notes, shipped_at: r.shipped_at, delivered_at: r.delivered_at,
            created_at: r.created_at, updated_at: r.updated_at, events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReturnRow {
    id: Uuid,
    order_id: Uuid,
    user_id: Uuid,
    reason: String,
    description: Option<String>,
    pickup_address: Json<Address>,
    status: String,
    approved_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    return_shipment_id: Option<String>,
    return_awb: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReturnRow> for ReturnRequest {
    type Error = StorefrontError;
    fn try_from(r: ReturnRow) -> Result<Self> {
        Ok(Self {
            id: r.id, order_id: r.order_id, user_id: r.user_id, reason: parse(&r.reason, "reason")?,
            description: r.description, pickup_address: r.pickup_address.0, status: parse(&r.status, "status")?,
            approved_at: r.approved_at, rejected_at: r.rejected_at, return_shipment_id: r.return_shipment_id,
            return_awb: r.return_awb, created_at: r.created_at, updated_at: r.updated_at, events: vec![],
        })
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: Uuid,
    order_id: Uuid,
    action: Json<OutboxAction>,
    attempts: i32,
    last_error: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<OutboxRow> for OutboxTask {
    fn from(r: OutboxRow) -> Self {
        Self { id: r.id, order_id: r.order_id, action: r.action.0, attempts: r.attempts, last_error: r.last_error, completed_at: r.completed_at, created_at: r.created_at }
    }
}

fn convert<R, T: TryFrom<R, Error = StorefrontError>>(rows: Vec<R>) -> Result<Vec<T>> {
    rows.into_iter().map(<T as TryFrom<R>>::try_from).collect()
}

#[async_trait]
impl CatalogRepository for PgStore {
    async fn insert_product(&self, draft: ProductDraft) -> Result<Product> {
        let opening = draft.stock_quantity;
        let mut tx = self.pool.begin().await?;
        let mut product = sqlx::query_as::<_, Product>(&format!(
            "INSERT INTO products (name, description, price, original_price, images, stock_quantity, low_stock_threshold, \
             is_featured, weight_grams, length_cm, width_cm, height_cm, hsn) \
             VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $9, $10, $11, $12) RETURNING {}",
            PRODUCT_COLUMNS
        ))
        .bind(&draft.name).bind(&draft.description).bind(draft.price).bind(draft.original_price).bind(&draft.images)
        .bind(draft.low_stock_threshold).bind(draft.is_featured)
        .bind(draft.weight_grams).bind(draft.length_cm).bind(draft.width_cm).bind(draft.height_cm).bind(&draft.hsn)
        .fetch_one(&mut *tx)
        .await?;
        if opening > 0 {
            let movement = product.adjust_stock(opening, MovementType::Restock, Some("Opening stock".into()))?;
            Self::write_movement(&mut tx, &product, &movement).await?;
        }
        tx.commit().await?;
        Ok(product)
    }

    async fn save_product(&self, p: &Product) -> Result<()> {
        let result = sqlx::query(
            "UPDATE products SET name = $2, description = $3, price = $4, original_price = $5, images = $6, \
             low_stock_threshold = $7, is_featured = $8, is_active = $9, weight_grams = $10, length_cm = $11, \
             width_cm = $12, height_cm = $13, hsn = $14, updated_at = $15 WHERE id = $1",
        )
        .bind(p.id).bind(&p.name).bind(&p.description).bind(p.price).bind(p.original_price).bind(&p.images)
        .bind(p.low_stock_threshold).bind(p.is_featured).bind(p.is_active).bind(p.weight_grams).bind(p.length_cm)
        .bind(p.width_cm).bind(p.height_cm).bind(&p.hsn).bind(p.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorefrontError::NotFound(format!("Product {}", p.id)));
        }
        Ok(())
    }

    async fn get_product(&self, id: i64) -> Result<Option<Product>> {
        Ok(sqlx::query_as::<_, Product>(&format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        Ok(sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE ($1 OR is_active) AND (NOT $2 OR is_featured) ORDER BY created_at DESC, id DESC",
            PRODUCT_COLUMNS
        ))
        .bind(filter.include_inactive)
        .bind(filter.featured_only)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn adjust_stock(&self, product_id: i64, delta: i32, movement_type: MovementType, notes: Option<String>) -> Result<(Product, InventoryMovement)> {
        let mut tx = self.pool.begin().await?;
        let mut product = Self::lock_product(&mut tx, product_id).await?;
        let movement = product.adjust_stock(delta, movement_type, notes)?;
        Self::write_movement(&mut tx, &product, &movement).await?;
        tx.commit().await?;
        Ok((product, movement))
    }

    async fn list_movements(&self, product_id: Option<i64>, limit: i64) -> Result<Vec<InventoryMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            "SELECT id, product_id, movement_type, quantity_change, previous_stock, new_stock, notes, created_at \
             FROM inventory_movements WHERE ($1::bigint IS NULL OR product_id = $1) ORDER BY created_at DESC LIMIT $2",
        )
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }
}

#[async_trait]
impl CartRepository for PgStore {
    async fn list_cart(&self, user_id: Uuid) -> Result<Vec<CartItem>> {
        Ok(sqlx::query_as::<_, CartItem>("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_cart_item(&self, item: &CartItem) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO cart_items (id, user_id, product_id, product_name, product_price, product_image, quantity, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT (user_id, product_id) DO NOTHING",
        )
        .bind(item.id).bind(item.user_id).bind(item.product_id).bind(&item.product_name).bind(item.product_price)
        .bind(&item.product_image).bind(item.quantity).bind(item.created_at).bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_cart_quantity(&self, user_id: Uuid, product_id: i64, quantity: i32) -> Result<Option<CartItem>> {
        Ok(sqlx::query_as::<_, CartItem>(
            "UPDATE cart_items SET quantity = $3, updated_at = NOW() WHERE user_id = $1 AND product_id = $2 RETURNING *",
        )
        .bind(user_id).bind(product_id).bind(quantity)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn remove_cart_item(&self, user_id: Uuid, product_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id).bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl WishlistRepository for PgStore {
    async fn list_wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>> {
        Ok(sqlx::query_as::<_, WishlistItem>("SELECT * FROM wishlist_items WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_wishlist_item(&self, item: &WishlistItem) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO wishlist_items (id, user_id, product_id, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, product_id) DO NOTHING",
        )
        .bind(item.id).bind(item.user_id).bind(item.product_id).bind(item.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_wishlist_item(&self, user_id: Uuid, product_id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id).bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear_wishlist(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

async fn insert_event(tx: &mut Transaction<'_, Postgres>, e: &OrderEvent) -> Result<u64> {
    let result = sqlx::query(
        "INSERT INTO order_events (id, order_id, status, note, created_at) VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (order_id, status, created_at) DO NOTHING",
    )
    .bind(e.id).bind(e.order_id).bind(&e.status).bind(&e.note).bind(e.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem], placed: &OrderEvent, tasks: &[OutboxTask]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO orders (id, user_id, customer_name, customer_email, customer_phone, shipping_address, billing_address, \
             address_snapshot, total_amount, payment_status, fulfillment_status, payment_method, gateway_order_id, \
             gateway_payment_id, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(order.id).bind(order.user_id).bind(&order.customer_name).bind(&order.customer_email).bind(&order.customer_phone)
        .bind(Json(&order.shipping_address)).bind(Json(&order.billing_address)).bind(order.address_snapshot.as_ref().map(Json))
        .bind(order.total_amount).bind(order.payment_status.as_ref()).bind(order.fulfillment_status.as_ref())
        .bind(&order.payment_method).bind(&order.gateway_order_id).bind(&order.gateway_payment_id).bind(&order.notes)
        .bind(order.created_at).bind(order.updated_at)
        .execute(&mut *tx)
        .await;
        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(StorefrontError::PaymentVerificationFailed(format!("payment {} already recorded", order.gateway_payment_id)));
            }
            return Err(e.into());
        }

        for item in items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, product_name, product_price, product_image, quantity, subtotal) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(item.id).bind(item.order_id).bind(item.product_id).bind(&item.product_name).bind(item.product_price)
            .bind(&item.product_image).bind(item.quantity).bind(item.subtotal)
            .execute(&mut *tx)
            .await?;
        }
        insert_event(&mut tx, placed).await?;
        for task in tasks {
            sqlx::query("INSERT INTO outbox_tasks (id, order_id, action, attempts, created_at) VALUES ($1, $2, $3, $4, $5)")
                .bind(task.id).bind(task.order_id).bind(Json(&task.action)).bind(task.attempts).bind(task.created_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_order_by_payment(&self, gateway_payment_id: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE gateway_payment_id = $1")
            .bind(gateway_payment_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn find_order_by_carrier_id(&self, carrier_order_id: &str) -> Result<Option<Order>> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE shiprocket_order_id = $1")
            .bind(carrier_order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Order::try_from)
            .transpose()
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE ($1::uuid IS NULL OR user_id = $1) AND ($2::text IS NULL OR fulfillment_status = $2) \
             ORDER BY created_at DESC",
        )
        .bind(filter.user_id)
        .bind(filter.status.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        Ok(sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_order(&self, order: &Order, event: Option<&OrderEvent>) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE orders SET payment_status = $2, fulfillment_status = $3, shiprocket_order_id = $4, awb = $5, courier = $6, \
             tracking_url = $7, label_url = $8, address_snapshot = $9, shipped_at = $10, delivered_at = $11, updated_at = $12 \
             WHERE id = $1",
        )
        .bind(order.id).bind(order.payment_status.as_ref()).bind(order.fulfillment_status.as_ref())
        .bind(&order.shiprocket_order_id).bind(&order.awb).bind(&order.courier).bind(&order.tracking_url)
        .bind(&order.label_url).bind(order.address_snapshot.as_ref().map(Json)).bind(order.shipped_at)
        .bind(order.delivered_at).bind(order.updated_at)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorefrontError::NotFound(format!("Order {}", order.id)));
        }
        if let Some(e) = event {
            insert_event(&mut tx, e).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn append_order_event(&self, event: &OrderEvent) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(inserted == 1)
    }

    async fn order_events(&self, order_id: Uuid) -> Result<Vec<OrderEvent>> {
        Ok(sqlx::query_as::<_, OrderEvent>("SELECT * FROM order_events WHERE order_id = $1 ORDER BY created_at")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[async_trait]
impl ReturnRepository for PgStore {
    async fn insert_return(&self, r: &ReturnRequest) -> Result<()> {
        let inserted = sqlx::query(
            "INSERT INTO return_requests (id, order_id, user_id, reason, description, pickup_address, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(r.id).bind(r.order_id).bind(r.user_id).bind(r.reason.as_ref()).bind(&r.description)
        .bind(Json(&r.pickup_address)).bind(r.status.as_ref()).bind(r.created_at).bind(r.updated_at)
        .execute(&self.pool)
        .await;
        match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(StorefrontError::transition("return request", "existing", ReturnStatus::Pending)),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_return(&self, id: Uuid) -> Result<Option<ReturnRequest>> {
        sqlx::query_as::<_, ReturnRow>("SELECT * FROM return_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(ReturnRequest::try_from)
            .transpose()
    }

    async fn find_return_by_order(&self, order_id: Uuid) -> Result<Option<ReturnRequest>> {
        sqlx::query_as::<_, ReturnRow>("SELECT * FROM return_requests WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .map(ReturnRequest::try_from)
            .transpose()
    }

    async fn list_returns(&self, status: Option<ReturnStatus>) -> Result<Vec<ReturnRequest>> {
        let rows = sqlx::query_as::<_, ReturnRow>(
            "SELECT * FROM return_requests WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC",
        )
        .bind(status.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }

    async fn save_return(&self, r: &ReturnRequest) -> Result<()> {
        let result = sqlx::query(
            "UPDATE return_requests SET description = $2, status = $3, approved_at = $4, rejected_at = $5, \
             return_shipment_id = $6, return_awb = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(r.id).bind(&r.description).bind(r.status.as_ref()).bind(r.approved_at).bind(r.rejected_at)
        .bind(&r.return_shipment_id).bind(&r.return_awb).bind(r.updated_at)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StorefrontError::NotFound(format!("Return request {}", r.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxRepository for PgStore {
    async fn pending_tasks(&self, max_attempts: i32, limit: i64) -> Result<Vec<OutboxTask>> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            "SELECT * FROM outbox_tasks WHERE completed_at IS NULL AND attempts < $1 ORDER BY created_at LIMIT $2",
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(OutboxTask::from).collect())
    }

    async fn tasks_for_order(&self, order_id: Uuid) -> Result<Vec<OutboxTask>> {
        let rows = sqlx::query_as::<_, OutboxRow>("SELECT * FROM outbox_tasks WHERE order_id = $1 ORDER BY created_at")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(OutboxTask::from).collect())
    }

    async fn complete_task(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE outbox_tasks SET attempts = attempts + 1, completed_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fail_task(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query("UPDATE outbox_tasks SET attempts = attempts + 1, last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

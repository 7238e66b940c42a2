//! Wishlist entries: a per-user set of saved products

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WishlistItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: i64,
    pub created_at: DateTime<Utc>,
}

impl WishlistItem {
    pub fn new(user_id: Uuid, product_id: i64) -> Self {
        Self { id: Uuid::now_v7(), user_id, product_id, created_at: Utc::now() }
    }
}

//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One cart line. Name, price and image are a snapshot taken when the line was added.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: i64,
    pub product_name: String,
    pub product_price: Decimal,
    pub product_image: String,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(user_id: Uuid, product: &CartProduct) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), user_id, product_id: product.id, product_name: product.name.clone(),
            product_price: product.price, product_image: product.image.clone(), quantity: 1,
            created_at: now, updated_at: now,
        }
    }

    pub fn line_total(&self) -> Decimal { self.product_price * Decimal::from(self.quantity) }
}

/// What the shopper is adding: the product as displayed to them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartProduct {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub image: String,
}

/// A user's cart as read from storage. Totals are derived on every call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn from_items(mut items: Vec<CartItem>) -> Self {
        items.sort_by_key(|i| i.created_at);
        Self { items }
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn line(&self, product_id: i64) -> Option<&CartItem> { self.items.iter().find(|i| i.product_id == product_id) }
    pub fn item_count(&self) -> i64 { self.items.iter().map(|i| i.quantity as i64).sum() }
    pub fn total_price(&self) -> Decimal { self.items.iter().map(CartItem::line_total).sum() }
    pub fn into_items(self) -> Vec<CartItem> { self.items }
}

/// Read model returned to shoppers
#[derive(Clone, Debug, Serialize)]
pub struct CartView {
    pub items: Vec<CartItem>,
    pub item_count: i64,
    pub total_price: Decimal,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        let item_count = cart.item_count();
        let total_price = cart.total_price();
        Self { items: cart.into_items(), item_count, total_price }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_cart_totals() {
        let user = Uuid::new_v4();
        let mut a = CartItem::new(user, &CartProduct { id: 7, name: "Vase".into(), price: Decimal::new(250, 0), image: String::new() });
        a.quantity = 2;
        let b = CartItem::new(user, &CartProduct { id: 9, name: "Cup".into(), price: Decimal::new(9950, 2), image: String::new() });
        let cart = Cart::from_items(vec![a, b]);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total_price(), Decimal::new(59950, 2));
        assert_eq!(cart.line(7).unwrap().line_total(), Decimal::new(500, 0));
    }
}

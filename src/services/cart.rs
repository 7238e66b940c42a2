//! Per-user cart persisted in the store.
//!
//! Adding a product for the first time reserves one unit of stock when the
//! caller knows the available stock. The reservation is a permanent sale
//! movement; there is no release path.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::aggregates::{Cart, CartItem, CartProduct, CartView};
use crate::error::{Result, StorefrontError};
use crate::services::catalog::CatalogService;
use crate::session::{require, Session};
use crate::store::Store;

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
    catalog: CatalogService,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>, catalog: CatalogService) -> Self { Self { store, catalog } }

    pub async fn get_cart(&self, session: Option<&Session>) -> Result<CartView> {
        let s = require(session)?;
        Ok(self.load(s).await?.into())
    }

    #[instrument(skip(self, session, product), fields(product_id = product.id))]
    pub async fn add_item(&self, session: Option<&Session>, product: CartProduct, available_stock: Option<i32>) -> Result<CartView> {
        let s = require(session)?;
        if matches!(available_stock, Some(stock) if stock <= 0) {
            return Err(StorefrontError::OutOfStock(product.id));
        }

        let cart = self.load(s).await?;
        if let Some(line) = cart.line(product.id) {
            return self.increment(s, line.quantity, product.id, available_stock).await;
        }

        let item = CartItem::new(s.user_id, &product);
        if !self.store.insert_cart_item(&item).await? {
            // Another request inserted the line first.
            let current = self.load(s).await?.line(product.id).map(|l| l.quantity).unwrap_or(0);
            return self.increment(s, current, product.id, available_stock).await;
        }

        if available_stock.is_some() {
            if let Err(e) = self.catalog.record_sale(product.id, 1, "Reserved for cart").await {
                self.store.remove_cart_item(s.user_id, product.id).await?;
                return Err(match e {
                    StorefrontError::InsufficientStock { .. } => StorefrontError::OutOfStock(product.id),
                    other => other,
                });
            }
        }
        info!(user_id = %s.user_id, product_id = product.id, "cart line added");
        Ok(self.load(s).await?.into())
    }

    /// Quantities below one are ignored.
    #[instrument(skip(self, session))]
    pub async fn update_quantity(&self, session: Option<&Session>, product_id: i64, quantity: i32) -> Result<CartView> {
        let s = require(session)?;
        if quantity < 1 {
            return Ok(self.load(s).await?.into());
        }
        if self.store.set_cart_quantity(s.user_id, product_id, quantity).await?.is_none() {
            warn!(user_id = %s.user_id, product_id, "quantity update for a product not in the cart");
        }
        Ok(self.load(s).await?.into())
    }

    pub async fn remove_item(&self, session: Option<&Session>, product_id: i64) -> Result<CartView> {
        let s = require(session)?;
        self.store.remove_cart_item(s.user_id, product_id).await?;
        Ok(self.load(s).await?.into())
    }

    pub async fn clear_cart(&self, session: Option<&Session>) -> Result<CartView> {
        let s = require(session)?;
        let removed = self.store.clear_cart(s.user_id).await?;
        info!(user_id = %s.user_id, removed, "cart cleared");
        Ok(Cart::default().into())
    }

    async fn increment(&self, s: &Session, current: i32, product_id: i64, available_stock: Option<i32>) -> Result<CartView> {
        let requested = current + 1;
        if let Some(available) = available_stock.filter(|a| requested > *a) {
            return Err(StorefrontError::InsufficientStock { product_id, requested: requested as i64, available: available as i64 });
        }
        self.store.set_cart_quantity(s.user_id, product_id, requested).await?;
        Ok(self.load(s).await?.into())
    }

    async fn load(&self, s: &Session) -> Result<Cart> {
        Ok(Cart::from_items(self.store.list_cart(s.user_id).await?))
    }
}

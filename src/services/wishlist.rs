use std::sync::Arc;

use tracing::info;

use crate::domain::aggregates::WishlistItem;
use crate::error::{Result, StorefrontError};
use crate::session::{require, Session};
use crate::store::Store;

#[derive(Clone)]
pub struct WishlistService {
    store: Arc<dyn Store>,
}

impl WishlistService {
    pub fn new(store: Arc<dyn Store>) -> Self { Self { store } }

    pub async fn list(&self, session: Option<&Session>) -> Result<Vec<WishlistItem>> {
        let s = require(session)?;
        self.store.list_wishlist(s.user_id).await
    }

    /// Returns false when the product was already saved.
    pub async fn add(&self, session: Option<&Session>, product_id: i64) -> Result<bool> {
        let s = require(session)?;
        if self.store.get_product(product_id).await?.is_none() {
            return Err(StorefrontError::NotFound(format!("Product {}", product_id)));
        }
        let added = self.store.insert_wishlist_item(&WishlistItem::new(s.user_id, product_id)).await?;
        if added {
            info!(user_id = %s.user_id, product_id, "saved to wishlist");
        }
        Ok(added)
    }

    pub async fn remove(&self, session: Option<&Session>, product_id: i64) -> Result<bool> {
        let s = require(session)?;
        self.store.remove_wishlist_item(s.user_id, product_id).await
    }

    pub async fn contains(&self, session: Option<&Session>, product_id: i64) -> Result<bool> {
        Ok(self.list(session).await?.iter().any(|i| i.product_id == product_id))
    }

    pub async fn clear(&self, session: Option<&Session>) -> Result<u64> {
        let s = require(session)?;
        self.store.clear_wishlist(s.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Product, ProductDraft};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_set_semantics() {
        let store = Arc::new(MemoryStore::new());
        store.put_product(Product::create(3, ProductDraft { name: "Teapot".into(), price: Decimal::new(900, 0), ..Default::default() })).await;
        let wishlist = WishlistService::new(store);
        let s = Session::shopper(Uuid::new_v4());

        assert!(wishlist.add(Some(&s), 3).await.unwrap());
        assert!(!wishlist.add(Some(&s), 3).await.unwrap());
        assert!(wishlist.contains(Some(&s), 3).await.unwrap());
        assert_eq!(wishlist.list(Some(&s)).await.unwrap().len(), 1);
        assert!(matches!(wishlist.add(Some(&s), 99).await, Err(StorefrontError::NotFound(_))));
        assert!(wishlist.remove(Some(&s), 3).await.unwrap());
        assert_eq!(wishlist.clear(Some(&s)).await.unwrap(), 0);
        assert!(matches!(wishlist.list(None).await, Err(StorefrontError::AuthenticationRequired)));
    }
}

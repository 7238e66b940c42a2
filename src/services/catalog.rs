//! Product catalog and stock movements.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, instrument};

use crate::domain::aggregates::{InventoryMovement, MovementType, Product, ProductDraft, ProductPatch};
use crate::domain::value_objects::{validate_image_upload, MAX_PRODUCT_IMAGES};
use crate::error::{Result, StorefrontError};
use crate::messaging::EventPublisher;
use crate::session::{require_admin, Session};
use crate::store::{ProductFilter, Store};

/// An image already placed in object storage, described for validation.
#[derive(Clone, Debug, Deserialize)]
pub struct ImageUpload {
    pub url: String,
    pub mime_type: String,
    pub size_bytes: usize,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self { Self { store, events } }

    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn create_product(&self, session: Option<&Session>, draft: ProductDraft) -> Result<Product> {
        require_admin(session)?;
        draft.check()?;
        let mut product = self.store.insert_product(draft).await?;
        info!(product_id = product.id, stock = product.stock_quantity, "product created");
        self.events.publish(product.take_events()).await;
        Ok(product)
    }

    #[instrument(skip(self, patch))]
    pub async fn update_product(&self, session: Option<&Session>, id: i64, patch: ProductPatch) -> Result<Product> {
        require_admin(session)?;
        let mut product = self.find(id).await?;
        product.apply(patch)?;
        self.store.save_product(&product).await?;
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn deactivate_product(&self, session: Option<&Session>, id: i64) -> Result<Product> {
        require_admin(session)?;
        let mut product = self.find(id).await?;
        product.apply(ProductPatch { is_active: Some(false), ..Default::default() })?;
        self.store.save_product(&product).await?;
        info!(product_id = id, "product deactivated");
        Ok(product)
    }

    #[instrument(skip(self, upload), fields(mime = %upload.mime_type, size = upload.size_bytes))]
    pub async fn add_image(&self, session: Option<&Session>, id: i64, upload: ImageUpload) -> Result<Product> {
        require_admin(session)?;
        validate_image_upload(&upload.mime_type, upload.size_bytes)?;
        let mut product = self.find(id).await?;
        if product.images.len() >= MAX_PRODUCT_IMAGES {
            return Err(StorefrontError::Validation(format!("a product holds at most {} images", MAX_PRODUCT_IMAGES)));
        }
        let mut images = product.images.clone();
        images.push(upload.url);
        product.apply(ProductPatch { images: Some(images), ..Default::default() })?;
        self.store.save_product(&product).await?;
        Ok(product)
    }

    /// Inactive products are visible to admins only.
    pub async fn list_products(&self, session: Option<&Session>, filter: ProductFilter) -> Result<Vec<Product>> {
        let is_admin = session.is_some_and(|s| s.is_admin);
        let filter = ProductFilter { include_inactive: filter.include_inactive && is_admin, ..filter };
        self.store.list_products(&filter).await
    }

    pub async fn get_product(&self, session: Option<&Session>, id: i64) -> Result<Product> {
        let product = self.find(id).await?;
        if !product.is_active && !session.is_some_and(|s| s.is_admin) {
            return Err(StorefrontError::NotFound(format!("Product {}", id)));
        }
        Ok(product)
    }

    #[instrument(skip(self))]
    pub async fn restock(&self, session: Option<&Session>, id: i64, quantity: i32, notes: Option<String>) -> Result<(Product, InventoryMovement)> {
        require_admin(session)?;
        if quantity < 1 {
            return Err(StorefrontError::Validation("restock quantity must be at least 1".into()));
        }
        self.move_stock(id, quantity, MovementType::Restock, notes).await
    }

    #[instrument(skip(self))]
    pub async fn adjust(&self, session: Option<&Session>, id: i64, delta: i32, notes: Option<String>) -> Result<(Product, InventoryMovement)> {
        require_admin(session)?;
        if delta == 0 {
            return Err(StorefrontError::Validation("adjustment must change stock".into()));
        }
        self.move_stock(id, delta, MovementType::Adjustment, notes).await
    }

    /// Takes `quantity` units out of stock as a sale. Used by cart reservation and order placement.
    pub async fn record_sale(&self, id: i64, quantity: i32, notes: impl Into<String>) -> Result<(Product, InventoryMovement)> {
        self.move_stock(id, -quantity, MovementType::Sale, Some(notes.into())).await
    }

    pub async fn list_movements(&self, session: Option<&Session>, product_id: Option<i64>, limit: Option<i64>) -> Result<Vec<InventoryMovement>> {
        require_admin(session)?;
        self.store.list_movements(product_id, limit.unwrap_or(100).clamp(1, 1000)).await
    }

    pub async fn low_stock(&self, session: Option<&Session>) -> Result<Vec<Product>> {
        require_admin(session)?;
        let products = self.store.list_products(&ProductFilter::default()).await?;
        Ok(products.into_iter().filter(Product::is_low_stock).collect())
    }

    async fn move_stock(&self, id: i64, delta: i32, movement_type: MovementType, notes: Option<String>) -> Result<(Product, InventoryMovement)> {
        let (mut product, movement) = self.store.adjust_stock(id, delta, movement_type, notes).await?;
        info!(product_id = id, delta, new_stock = movement.new_stock, movement = %movement_type, "stock moved");
        self.events.publish(product.take_events()).await;
        Ok((product, movement))
    }

    async fn find(&self, id: i64) -> Result<Product> {
        self.store.get_product(id).await?.ok_or_else(|| StorefrontError::NotFound(format!("Product {}", id)))
    }
}

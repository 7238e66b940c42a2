//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::events::DomainEvent;
use crate::domain::value_objects::MAX_PRODUCT_IMAGES;
use crate::error::{Result, StorefrontError};

#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    pub images: Vec<String>,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub is_featured: bool,
    pub is_active: bool,
    pub rating: Decimal,
    pub review_count: i32,
    pub weight_grams: Option<i32>,
    pub length_cm: Option<i32>,
    pub width_cm: Option<i32>,
    pub height_cm: Option<i32>,
    pub hsn: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    #[sqlx(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MovementType { Sale, Restock, Adjustment }

/// One recorded stock adjustment. Append-only; `new_stock = previous_stock + quantity_change`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: Uuid,
    pub product_id: i64,
    pub movement_type: MovementType,
    pub quantity_change: i32,
    pub previous_stock: i32,
    pub new_stock: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Admin input for a new catalog entry
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ProductDraft {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    #[serde(default)]
    #[validate(length(max = 5))]
    pub images: Vec<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub stock_quantity: i32,
    #[serde(default = "default_threshold")]
    #[validate(range(min = 0))]
    pub low_stock_threshold: i32,
    #[serde(default)]
    pub is_featured: bool,
    pub weight_grams: Option<i32>,
    pub length_cm: Option<i32>,
    pub width_cm: Option<i32>,
    pub height_cm: Option<i32>,
    pub hsn: Option<String>,
}

fn default_threshold() -> i32 { 5 }

impl ProductDraft {
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        check_price(self.price, self.original_price)
    }
}

/// Admin edit of an existing product. Stock is deliberately absent: it only moves through movements.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct ProductPatch {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub original_price: Option<Option<Decimal>>,
    #[validate(length(max = 5))]
    pub images: Option<Vec<String>>,
    pub low_stock_threshold: Option<i32>,
    pub is_featured: Option<bool>,
    pub is_active: Option<bool>,
    pub weight_grams: Option<i32>,
    pub length_cm: Option<i32>,
    pub width_cm: Option<i32>,
    pub height_cm: Option<i32>,
    pub hsn: Option<String>,
}

fn check_price(price: Decimal, original: Option<Decimal>) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(StorefrontError::Validation("price must be positive".into()));
    }
    if matches!(original, Some(o) if o < Decimal::ZERO) {
        return Err(StorefrontError::Validation("original price cannot be negative".into()));
    }
    Ok(())
}

impl Product {
    pub fn create(id: i64, draft: ProductDraft) -> Self {
        let now = Utc::now();
        Self {
            id, name: draft.name, description: draft.description, price: draft.price,
            original_price: draft.original_price, images: draft.images,
            stock_quantity: draft.stock_quantity, low_stock_threshold: draft.low_stock_threshold,
            is_featured: draft.is_featured, is_active: true, rating: Decimal::ZERO, review_count: 0,
            weight_grams: draft.weight_grams, length_cm: draft.length_cm, width_cm: draft.width_cm,
            height_cm: draft.height_cm, hsn: draft.hsn, created_at: now, updated_at: now, events: vec![],
        }
    }

    /// A new catalog entry at zero stock, with the draft's quantity brought in as an opening restock.
    pub fn open(id: i64, draft: ProductDraft) -> Result<(Self, Option<InventoryMovement>)> {
        let opening = draft.stock_quantity;
        let mut product = Self::create(id, ProductDraft { stock_quantity: 0, ..draft });
        let movement = match opening {
            0 => None,
            n => Some(product.adjust_stock(n, MovementType::Restock, Some("Opening stock".into()))?),
        };
        Ok((product, movement))
    }

    pub fn is_in_stock(&self) -> bool { self.stock_quantity > 0 }
    pub fn is_low_stock(&self) -> bool { self.stock_quantity <= self.low_stock_threshold }

    pub fn apply(&mut self, patch: ProductPatch) -> Result<()> {
        patch.validate()?;
        if let Some(price) = patch.price { check_price(price, None)?; self.price = price; }
        if let Some(name) = patch.name { self.name = name; }
        if let Some(description) = patch.description { self.description = description; }
        if let Some(original) = patch.original_price { self.original_price = original; }
        if let Some(images) = patch.images {
            if images.len() > MAX_PRODUCT_IMAGES { return Err(StorefrontError::Validation("too many images".into())); }
            self.images = images;
        }
        if let Some(t) = patch.low_stock_threshold { self.low_stock_threshold = t.max(0); }
        if let Some(f) = patch.is_featured { self.is_featured = f; }
        if let Some(a) = patch.is_active { self.is_active = a; }
        if patch.weight_grams.is_some() { self.weight_grams = patch.weight_grams; }
        if patch.length_cm.is_some() { self.length_cm = patch.length_cm; }
        if patch.width_cm.is_some() { self.width_cm = patch.width_cm; }
        if patch.height_cm.is_some() { self.height_cm = patch.height_cm; }
        if patch.hsn.is_some() { self.hsn = patch.hsn; }
        self.touch();
        Ok(())
    }

    /// Moves stock by `delta` and returns the movement to record alongside it.
    /// A result below zero fails and leaves the product untouched.
    pub fn adjust_stock(&mut self, delta: i32, movement_type: MovementType, notes: Option<String>) -> Result<InventoryMovement> {
        let previous = self.stock_quantity;
        let new_stock = previous.checked_add(delta).filter(|s| *s >= 0).ok_or(StorefrontError::InsufficientStock {
            product_id: self.id,
            requested: -(delta as i64),
            available: previous as i64,
        })?;
        self.stock_quantity = new_stock;
        self.touch();
        self.raise_event(DomainEvent::StockAdjusted { product_id: self.id, movement_type, quantity_change: delta, new_stock });
        if new_stock <= self.low_stock_threshold && previous > self.low_stock_threshold {
            self.raise_event(DomainEvent::LowStock { product_id: self.id, stock: new_stock, threshold: self.low_stock_threshold });
        }
        Ok(InventoryMovement {
            id: Uuid::now_v7(), product_id: self.id, movement_type, quantity_change: delta,
            previous_stock: previous, new_stock, notes, created_at: Utc::now(),
        })
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

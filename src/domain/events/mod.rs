//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::{FulfillmentStatus, MovementType, ReturnStatus};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    StockAdjusted { product_id: i64, movement_type: MovementType, quantity_change: i32, new_stock: i32 },
    LowStock { product_id: i64, stock: i32, threshold: i32 },
    OrderPlaced { order_id: Uuid, user_id: Uuid, total: Decimal },
    FulfillmentChanged { order_id: Uuid, from: FulfillmentStatus, to: FulfillmentStatus },
    OrderCancelled { order_id: Uuid },
    ReturnStatusChanged { return_id: Uuid, order_id: Uuid, status: ReturnStatus },
}

impl DomainEvent {
    /// Suffix of the subject the event is published under.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StockAdjusted { .. } => "stock_adjusted",
            Self::LowStock { .. } => "low_stock",
            Self::OrderPlaced { .. } => "order_placed",
            Self::FulfillmentChanged { .. } => "fulfillment_changed",
            Self::OrderCancelled { .. } => "order_cancelled",
            Self::ReturnStatusChanged { .. } => "return_status_changed",
        }
    }
}

//! Back-office routes. Every handler's service call checks the admin flag.

use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{get, post, put}, Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::{FulfillmentStatus, InventoryMovement, MovementType, Order, PaymentStatus, Product, ProductDraft, ProductPatch, ReturnRequest, ReturnStatus};
use crate::error::{Result, StorefrontError};
use crate::services::{ImageUpload, ShipmentView};
use crate::session::MaybeSession;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/:id", put(update_product).delete(deactivate_product))
        .route("/products/:id/stock", post(move_stock))
        .route("/products/:id/images", post(add_image))
        .route("/inventory/movements", get(list_movements))
        .route("/inventory/low-stock", get(low_stock))
        .route("/orders", get(list_orders))
        .route("/orders/:id/status", put(update_status))
        .route("/orders/:id/payment", put(update_payment))
        .route("/orders/:id/shipment", post(create_shipment))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/returns", get(list_returns))
        .route("/returns/:id/approve", post(approve_return))
        .route("/returns/:id/reject", post(reject_return))
        .route("/returns/:id/ship", post(ship_return))
        .route("/returns/:id/returned", post(mark_returned))
        .route("/returns/:id/refunded", post(refund_return))
}

#[derive(Debug, Deserialize)] pub struct StockChange { pub movement_type: MovementType, pub quantity: i32, pub notes: Option<String> }
#[derive(Debug, Deserialize)] pub struct MovementParams { pub product_id: Option<i64>, pub limit: Option<i64> }
#[derive(Debug, Deserialize)] pub struct OrderParams { pub status: Option<FulfillmentStatus> }
#[derive(Debug, Deserialize)] pub struct StatusUpdate { pub status: FulfillmentStatus, pub note: Option<String> }
#[derive(Debug, Deserialize)] pub struct PaymentUpdate { pub payment_status: PaymentStatus }
#[derive(Debug, Default, Deserialize)] pub struct CancelRequest { pub note: Option<String> }
#[derive(Debug, Deserialize)] pub struct ReturnParams { pub status: Option<ReturnStatus> }
#[derive(Debug, Deserialize)] pub struct Rejection { pub reason: String }

async fn create_product(State(s): State<AppState>, session: MaybeSession, Json(d): Json<ProductDraft>) -> Result<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_product(session.get(), d).await?)))
}

async fn update_product(State(s): State<AppState>, session: MaybeSession, Path(id): Path<i64>, Json(p): Json<ProductPatch>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.update_product(session.get(), id, p).await?))
}

async fn deactivate_product(State(s): State<AppState>, session: MaybeSession, Path(id): Path<i64>) -> Result<StatusCode> {
    s.catalog.deactivate_product(session.get(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn move_stock(State(s): State<AppState>, session: MaybeSession, Path(id): Path<i64>, Json(r): Json<StockChange>) -> Result<Json<InventoryMovement>> {
    let (_, movement) = match r.movement_type {
        MovementType::Restock => s.catalog.restock(session.get(), id, r.quantity, r.notes).await?,
        MovementType::Adjustment => s.catalog.adjust(session.get(), id, r.quantity, r.notes).await?,
        MovementType::Sale => return Err(StorefrontError::Validation("sales are recorded by checkout".into())),
    };
    Ok(Json(movement))
}

async fn add_image(State(s): State<AppState>, session: MaybeSession, Path(id): Path<i64>, Json(u): Json<ImageUpload>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.add_image(session.get(), id, u).await?))
}

async fn list_movements(State(s): State<AppState>, session: MaybeSession, Query(p): Query<MovementParams>) -> Result<Json<Vec<InventoryMovement>>> {
    Ok(Json(s.catalog.list_movements(session.get(), p.product_id, p.limit).await?))
}

async fn low_stock(State(s): State<AppState>, session: MaybeSession) -> Result<Json<Vec<Product>>> {
    Ok(Json(s.catalog.low_stock(session.get()).await?))
}

async fn list_orders(State(s): State<AppState>, session: MaybeSession, Query(p): Query<OrderParams>) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.fulfillment.list_orders(session.get(), p.status).await?))
}

async fn update_status(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>, Json(r): Json<StatusUpdate>) -> Result<Json<Order>> {
    Ok(Json(s.fulfillment.update_fulfillment_status(session.get(), id, r.status, r.note).await?))
}

async fn update_payment(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>, Json(r): Json<PaymentUpdate>) -> Result<Json<Order>> {
    Ok(Json(s.fulfillment.update_payment_status(session.get(), id, r.payment_status).await?))
}

async fn create_shipment(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>) -> Result<Json<ShipmentView>> {
    Ok(Json(s.fulfillment.create_shipment(session.get(), id).await?))
}

async fn cancel_order(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>, body: Option<Json<CancelRequest>>) -> Result<Json<Order>> {
    let note = body.and_then(|Json(r)| r.note);
    Ok(Json(s.fulfillment.cancel_order(session.get(), id, note).await?))
}

async fn list_returns(State(s): State<AppState>, session: MaybeSession, Query(p): Query<ReturnParams>) -> Result<Json<Vec<ReturnRequest>>> {
    Ok(Json(s.returns.list_returns(session.get(), p.status).await?))
}

async fn approve_return(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>) -> Result<Json<ReturnRequest>> {
    Ok(Json(s.returns.approve(session.get(), id).await?))
}

async fn reject_return(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>, Json(r): Json<Rejection>) -> Result<Json<ReturnRequest>> {
    Ok(Json(s.returns.reject(session.get(), id, &r.reason).await?))
}

async fn ship_return(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>) -> Result<Json<ReturnRequest>> {
    Ok(Json(s.returns.ship_return(session.get(), id).await?))
}

async fn mark_returned(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>) -> Result<Json<ReturnRequest>> {
    Ok(Json(s.returns.mark_returned(session.get(), id).await?))
}

async fn refund_return(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>) -> Result<Json<ReturnRequest>> {
    Ok(Json(s.returns.refund(session.get(), id).await?))
}

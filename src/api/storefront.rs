//! Shopper and public routes.

use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{delete, get, post, put}, Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::domain::aggregates::{CartProduct, CartView, Order, OrderEvent, Product, ReturnForm, ReturnRequest, WishlistItem};
use crate::domain::value_objects::{Pincode, PostalPlace};
use crate::error::Result;
use crate::services::{CreateGatewayOrder, GatewayOrderCreated, OrderView, VerifyPaymentRequest, VerifyPaymentResponse};
use crate::session::MaybeSession;
use crate::store::ProductFilter;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products))
        .route("/products/:id", get(get_product))
        .route("/postal/:pincode", get(lookup_pincode))
        .route("/cart", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/cart/:product_id", put(update_cart_item).delete(remove_cart_item))
        .route("/wishlist", get(list_wishlist).post(add_to_wishlist).delete(clear_wishlist))
        .route("/wishlist/:product_id", delete(remove_from_wishlist))
        .route("/payments/order", post(create_payment_order))
        .route("/payments/verify", post(verify_payment))
        .route("/orders", get(list_my_orders))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/events", get(order_timeline))
        .route("/orders/:id/return", get(get_return).post(request_return))
}

#[derive(Debug, Deserialize)] pub struct AddToCart { pub product_id: i64 }
#[derive(Debug, Deserialize)] pub struct SetQuantity { pub quantity: i32 }
#[derive(Debug, Deserialize)] pub struct SaveProduct { pub product_id: i64 }
#[derive(Debug, Serialize)] pub struct Saved { pub added: bool }
#[derive(Debug, Serialize)] pub struct Removed { pub removed: u64 }

async fn list_products(State(s): State<AppState>, session: MaybeSession, Query(f): Query<ProductFilter>) -> Result<Json<Vec<Product>>> {
    Ok(Json(s.catalog.list_products(session.get(), f).await?))
}

async fn get_product(State(s): State<AppState>, session: MaybeSession, Path(id): Path<i64>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.get_product(session.get(), id).await?))
}

async fn lookup_pincode(State(s): State<AppState>, Path(code): Path<String>) -> Result<Json<PostalPlace>> {
    Ok(Json(s.postal.lookup(&Pincode::new(code)?).await?))
}

async fn get_cart(State(s): State<AppState>, session: MaybeSession) -> Result<Json<CartView>> {
    Ok(Json(s.cart.get_cart(session.get()).await?))
}

/// Price, name and stock come from the catalog, not the request.
async fn add_to_cart(State(s): State<AppState>, session: MaybeSession, Json(r): Json<AddToCart>) -> Result<Json<CartView>> {
    crate::session::require(session.get())?;
    let p = s.catalog.get_product(session.get(), r.product_id).await?;
    let product = CartProduct { id: p.id, name: p.name.clone(), price: p.price, image: p.images.first().cloned().unwrap_or_default() };
    Ok(Json(s.cart.add_item(session.get(), product, Some(p.stock_quantity)).await?))
}

async fn update_cart_item(State(s): State<AppState>, session: MaybeSession, Path(pid): Path<i64>, Json(r): Json<SetQuantity>) -> Result<Json<CartView>> {
    Ok(Json(s.cart.update_quantity(session.get(), pid, r.quantity).await?))
}

async fn remove_cart_item(State(s): State<AppState>, session: MaybeSession, Path(pid): Path<i64>) -> Result<Json<CartView>> {
    Ok(Json(s.cart.remove_item(session.get(), pid).await?))
}

async fn clear_cart(State(s): State<AppState>, session: MaybeSession) -> Result<Json<CartView>> {
    Ok(Json(s.cart.clear_cart(session.get()).await?))
}

async fn list_wishlist(State(s): State<AppState>, session: MaybeSession) -> Result<Json<Vec<WishlistItem>>> {
    Ok(Json(s.wishlist.list(session.get()).await?))
}

async fn add_to_wishlist(State(s): State<AppState>, session: MaybeSession, Json(r): Json<SaveProduct>) -> Result<(StatusCode, Json<Saved>)> {
    let added = s.wishlist.add(session.get(), r.product_id).await?;
    Ok((if added { StatusCode::CREATED } else { StatusCode::OK }, Json(Saved { added })))
}

async fn remove_from_wishlist(State(s): State<AppState>, session: MaybeSession, Path(pid): Path<i64>) -> Result<StatusCode> {
    s.wishlist.remove(session.get(), pid).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_wishlist(State(s): State<AppState>, session: MaybeSession) -> Result<Json<Removed>> {
    Ok(Json(Removed { removed: s.wishlist.clear(session.get()).await? }))
}

async fn create_payment_order(State(s): State<AppState>, session: MaybeSession, Json(r): Json<CreateGatewayOrder>) -> Result<Json<GatewayOrderCreated>> {
    Ok(Json(s.payments.create_gateway_order(session.get(), r).await?))
}

async fn verify_payment(State(s): State<AppState>, session: MaybeSession, Json(r): Json<VerifyPaymentRequest>) -> Result<Json<VerifyPaymentResponse>> {
    Ok(Json(s.payments.verify_payment(session.get(), r).await?))
}

async fn list_my_orders(State(s): State<AppState>, session: MaybeSession) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.fulfillment.list_my_orders(session.get()).await?))
}

async fn get_order(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>) -> Result<Json<OrderView>> {
    Ok(Json(s.fulfillment.get_order(session.get(), id).await?))
}

async fn order_timeline(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>) -> Result<Json<Vec<OrderEvent>>> {
    Ok(Json(s.fulfillment.order_timeline(session.get(), id).await?))
}

async fn request_return(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>, Json(form): Json<ReturnForm>) -> Result<(StatusCode, Json<ReturnRequest>)> {
    Ok((StatusCode::CREATED, Json(s.returns.request_return(session.get(), id, form).await?)))
}

async fn get_return(State(s): State<AppState>, session: MaybeSession, Path(id): Path<Uuid>) -> Result<Json<Option<ReturnRequest>>> {
    Ok(Json(s.returns.get_return_for_order(session.get(), id).await?))
}

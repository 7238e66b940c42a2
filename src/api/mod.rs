//! HTTP surface.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::clients::{Carrier, PaymentGateway, PostalLookup, SignatureVerifier};
use crate::messaging::EventPublisher;
use crate::services::{CartService, CatalogService, FulfillmentService, OutboxWorker, PaymentService, ReturnService, WishlistService};
use crate::store::Store;

pub mod admin;
pub mod storefront;
pub mod webhooks;

/// Everything a handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub cart: CartService,
    pub wishlist: WishlistService,
    pub payments: PaymentService,
    pub fulfillment: FulfillmentService,
    pub returns: ReturnService,
    pub outbox: OutboxWorker,
    pub postal: Arc<dyn PostalLookup>,
    pub webhook_token: Option<String>,
}

/// External collaborators the services are wired to.
pub struct Collaborators {
    pub gateway: Arc<dyn PaymentGateway>,
    pub verifier: SignatureVerifier,
    pub carrier: Arc<dyn Carrier>,
    pub postal: Arc<dyn PostalLookup>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher, deps: Collaborators, currency: &str, webhook_token: Option<String>) -> Self {
        let catalog = CatalogService::new(store.clone(), events.clone());
        let fulfillment = FulfillmentService::new(store.clone(), deps.carrier.clone(), events.clone());
        let outbox = OutboxWorker::new(store.clone(), catalog.clone(), fulfillment.clone());
        Self {
            cart: CartService::new(store.clone(), catalog.clone()),
            wishlist: WishlistService::new(store.clone()),
            payments: PaymentService::new(store.clone(), deps.gateway, deps.verifier, outbox.clone(), events.clone(), currency),
            returns: ReturnService::new(store, deps.carrier, events),
            catalog,
            fulfillment,
            outbox,
            postal: deps.postal,
            webhook_token,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "kiln-storefront"})) }))
        .nest("/api/v1", storefront::routes().merge(webhooks::routes()).nest("/admin", admin::routes()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

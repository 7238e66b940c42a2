//! Inbound carrier status pushes.

use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use tracing::warn;

use super::AppState;
use crate::error::{Result, StorefrontError};
use crate::services::{CarrierWebhook, WebhookOutcome};

pub const WEBHOOK_TOKEN_HEADER: &str = "x-api-key";

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhooks/shiprocket", post(shiprocket))
}

async fn shiprocket(State(s): State<AppState>, headers: HeaderMap, Json(hook): Json<CarrierWebhook>) -> Result<Json<WebhookOutcome>> {
    if let Some(expected) = s.webhook_token.as_deref() {
        let given = headers.get(WEBHOOK_TOKEN_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected) {
            warn!("carrier webhook rejected: bad token");
            return Err(StorefrontError::AuthenticationRequired);
        }
    }
    Ok(Json(s.fulfillment.handle_webhook(hook).await?))
}

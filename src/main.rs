//! Kiln Storefront - order lifecycle and fulfillment service

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kiln_storefront::api::{self, AppState, Collaborators};
use kiln_storefront::clients::{PostalClient, RazorpayClient, ShiprocketClient, SignatureVerifier};
use kiln_storefront::messaging::EventPublisher;
use kiln_storefront::store::{MemoryStore, PgStore, Store};
use kiln_storefront::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, 10).await.context("connecting to DATABASE_URL")?;
            pg.migrate().await.context("running migrations")?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };
    let events = match &config.nats_url {
        Some(url) => EventPublisher::connect(url).await,
        None => EventPublisher::log_only(),
    };

    let deps = Collaborators {
        gateway: Arc::new(RazorpayClient::new(&config.razorpay_base_url, &config.razorpay_key_id, &config.razorpay_key_secret, config.http_timeout)?),
        verifier: SignatureVerifier::new(config.razorpay_key_secret.clone()),
        carrier: Arc::new(ShiprocketClient::new(&config.shiprocket_base_url, config.shiprocket.clone(), &config.shiprocket_pickup_location, config.http_timeout)?),
        postal: Arc::new(PostalClient::new(&config.postal_lookup_url, config.http_timeout)?),
    };
    let state = AppState::new(store, events, deps, &config.currency, config.shiprocket_webhook_token.clone());
    state.outbox.clone().spawn(config.outbox_interval);

    let app = api::router(state);
    tracing::info!("Kiln Storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

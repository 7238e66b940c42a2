use std::time::Duration;

use anyhow::Context;

use crate::clients::shiprocket::ShiprocketCredentials;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub razorpay_key_id: String,
    pub razorpay_key_secret: String,
    pub razorpay_base_url: String,
    pub shiprocket: Option<ShiprocketCredentials>,
    pub shiprocket_base_url: String,
    pub shiprocket_pickup_location: String,
    pub shiprocket_webhook_token: Option<String>,
    pub postal_lookup_url: String,
    pub currency: String,
    pub outbox_interval: Duration,
    pub http_timeout: Duration,
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let shiprocket = match (optional("SHIPROCKET_EMAIL"), optional("SHIPROCKET_PASSWORD")) {
            (Some(email), Some(password)) => Some(ShiprocketCredentials { email, password }),
            _ => None,
        };
        Ok(Self {
            port: var_or("PORT", "8083").parse().context("PORT must be a valid number")?,
            database_url: optional("DATABASE_URL"),
            nats_url: optional("NATS_URL"),
            razorpay_key_id: std::env::var("RAZORPAY_KEY_ID").context("RAZORPAY_KEY_ID must be set")?,
            razorpay_key_secret: std::env::var("RAZORPAY_KEY_SECRET").context("RAZORPAY_KEY_SECRET must be set")?,
            razorpay_base_url: var_or("RAZORPAY_BASE_URL", "https://api.razorpay.com"),
            shiprocket,
            shiprocket_base_url: var_or("SHIPROCKET_BASE_URL", "https://apiv2.shiprocket.in"),
            shiprocket_pickup_location: var_or("SHIPROCKET_PICKUP_LOCATION", "Primary"),
            shiprocket_webhook_token: optional("SHIPROCKET_WEBHOOK_TOKEN"),
            postal_lookup_url: var_or("POSTAL_LOOKUP_URL", "https://api.postalpincode.in"),
            currency: var_or("STORE_CURRENCY", "INR").to_uppercase(),
            outbox_interval: Duration::from_secs(
                var_or("OUTBOX_INTERVAL_SECS", "30").parse().context("OUTBOX_INTERVAL_SECS must be a number of seconds")?,
            ),
            http_timeout: Duration::from_secs(
                var_or("HTTP_TIMEOUT_SECS", "15").parse().context("HTTP_TIMEOUT_SECS must be a number of seconds")?,
            ),
        })
    }
}

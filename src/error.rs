//! Storefront error taxonomy and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Admin privileges required")]
    Forbidden,

    #[error("Product {0} is out of stock")]
    OutOfStock(i64),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock { product_id: i64, requested: i64, available: i64 },

    #[error("Invalid payment signature")]
    InvalidSignature,

    #[error("Payment verification failed: {0}")]
    PaymentVerificationFailed(String),

    #[error("Checkout failed: {0}")]
    CheckoutFailed(String),

    #[error("{service} request failed: {message}")]
    ExternalService { service: &'static str, message: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot move {entity} from {from} to {to}")]
    InvalidTransition { entity: &'static str, from: String, to: String },

    #[error("Order {0} has no carrier shipment")]
    NoCarrierShipment(Uuid),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;

impl StorefrontError {
    pub fn external(service: &'static str, message: impl Into<String>) -> Self {
        Self::ExternalService { service, message: message.into() }
    }

    pub fn transition(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition { entity, from: from.to_string(), to: to.to_string() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::OutOfStock(_) | Self::InsufficientStock { .. } | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::InvalidSignature
            | Self::PaymentVerificationFailed(_)
            | Self::CheckoutFailed(_)
            | Self::Validation(_)
            | Self::NoCarrierShipment(_) => StatusCode::BAD_REQUEST,
            Self::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Failures a caller may retry without changing its request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalService { .. } | Self::Storage(_))
    }
}

impl From<sqlx::Error> for StorefrontError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("Row".to_string()),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for StorefrontError {
    fn from(e: reqwest::Error) -> Self {
        let service = if e.is_timeout() { "upstream (timeout)" } else { "upstream" };
        Self::external(service, e.to_string())
    }
}

impl From<validator::ValidationErrors> for StorefrontError {
    fn from(e: validator::ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    timestamp: String,
}

impl IntoResponse for StorefrontError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

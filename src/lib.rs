//! Kiln Storefront
//!
//! Order lifecycle service for a handcrafted pottery shop.
//!
//! ## Features
//! - Product catalog with an audited stock ledger
//! - Per-user cart and wishlist
//! - Razorpay payment verification with an order outbox
//! - Shiprocket fulfillment, tracking webhooks and returns

pub mod api;
pub mod clients;
pub mod config;
pub mod domain;
pub mod error;
pub mod messaging;
pub mod services;
pub mod session;
pub mod store;

pub use config::Config;
pub use error::{Result, StorefrontError};
pub use session::{MaybeSession, Session};

//! Domain event fan-out. Publishing is fire-and-forget: a failed publish is
//! logged and never fails the operation that raised the event.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::events::DomainEvent;

pub const SUBJECT_PREFIX: &str = "storefront";

#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
    captured: Option<Arc<Mutex<Vec<DomainEvent>>>>,
}

impl EventPublisher {
    /// Events are only logged.
    pub fn log_only() -> Self { Self::default() }

    pub fn nats(client: async_nats::Client) -> Self { Self { nats: Some(client), captured: None } }

    /// Keeps every published event in memory; returns the buffer alongside.
    pub fn capturing() -> (Self, Arc<Mutex<Vec<DomainEvent>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        (Self { nats: None, captured: Some(buffer.clone()) }, buffer)
    }

    pub async fn connect(url: &str) -> Self {
        match async_nats::connect(url).await {
            Ok(client) => {
                info!(url, "publishing domain events to NATS");
                Self::nats(client)
            }
            Err(e) => {
                warn!(url, error = %e, "NATS unavailable, domain events will only be logged");
                Self::log_only()
            }
        }
    }

    pub async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            let subject = format!("{}.{}", SUBJECT_PREFIX, event.kind());
            info!(subject = %subject, event = ?event, "domain event");
            if let Some(client) = &self.nats {
                match serde_json::to_vec(&event) {
                    Ok(payload) => {
                        if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                            warn!(subject = %subject, error = %e, "failed to publish domain event");
                        }
                    }
                    Err(e) => warn!(subject = %subject, error = %e, "failed to encode domain event"),
                }
            }
            if let Some(buffer) = &self.captured {
                buffer.lock().await.push(event);
            }
        }
    }
}

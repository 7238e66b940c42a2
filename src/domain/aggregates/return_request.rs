//! Return Request Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::order::{FulfillmentStatus, Order};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::Address;
use crate::error::{Result, StorefrontError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReturnReason { Defective, WrongItem, NotAsDescribed, ChangedMind, Other }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReturnStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    ReturnShipped,
    Returned,
    Refunded,
}

impl ReturnStatus {
    pub fn can_transition_to(self, to: ReturnStatus) -> bool {
        use ReturnStatus::*;
        matches!(
            (self, to),
            (Pending, Approved) | (Pending, Rejected) | (Approved, ReturnShipped) | (ReturnShipped, Returned) | (Returned, Refunded)
        )
    }
}

/// What the order owner submits
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ReturnForm {
    pub reason: ReturnReason,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub pickup_address: Option<Address>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub reason: ReturnReason,
    pub description: Option<String>,
    pub pickup_address: Address,
    pub status: ReturnStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub return_shipment_id: Option<String>,
    pub return_awb: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) events: Vec<DomainEvent>,
}

impl ReturnRequest {
    /// Opens a return against a delivered order that has none yet.
    pub fn open(order: &Order, existing: Option<&ReturnRequest>, form: ReturnForm) -> Result<Self> {
        form.validate()?;
        if order.fulfillment_status != FulfillmentStatus::Delivered {
            return Err(StorefrontError::transition("order", order.fulfillment_status, "return_requested"));
        }
        if let Some(prior) = existing {
            return Err(StorefrontError::transition("return request", prior.status, ReturnStatus::Pending));
        }
        let pickup_address = form.pickup_address.filter(|a| !a.is_blank()).unwrap_or_else(|| order.pickup_address().clone());
        let now = Utc::now();
        let mut request = Self {
            id: Uuid::now_v7(), order_id: order.id, user_id: order.user_id, reason: form.reason,
            description: form.description, pickup_address, status: ReturnStatus::Pending,
            approved_at: None, rejected_at: None, return_shipment_id: None, return_awb: None,
            created_at: now, updated_at: now, events: vec![],
        };
        request.raise_status();
        Ok(request)
    }

    pub fn approve(&mut self) -> Result<()> {
        self.advance(ReturnStatus::Approved)?;
        self.approved_at = Some(self.updated_at);
        Ok(())
    }

    pub fn reject(&mut self, reason: &str) -> Result<()> {
        if reason.trim().is_empty() {
            return Err(StorefrontError::Validation("rejection reason is required".into()));
        }
        self.advance(ReturnStatus::Rejected)?;
        self.rejected_at = Some(self.updated_at);
        self.description = Some(reason.trim().to_string());
        Ok(())
    }

    /// Precondition check for booking the pickup, run before any carrier call.
    pub fn ensure_shippable(&self) -> Result<()> {
        if self.status.can_transition_to(ReturnStatus::ReturnShipped) { Ok(()) }
        else { Err(StorefrontError::transition("return request", self.status, ReturnStatus::ReturnShipped)) }
    }

    pub fn mark_shipped(&mut self, shipment_id: String, awb: Option<String>) -> Result<()> {
        self.advance(ReturnStatus::ReturnShipped)?;
        self.return_awb = awb.or_else(|| Some(shipment_id.clone()));
        self.return_shipment_id = Some(shipment_id);
        Ok(())
    }

    pub fn mark_returned(&mut self) -> Result<()> { self.advance(ReturnStatus::Returned) }
    pub fn refund(&mut self) -> Result<()> { self.advance(ReturnStatus::Refunded) }

    fn advance(&mut self, to: ReturnStatus) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(StorefrontError::transition("return request", self.status, to));
        }
        self.status = to;
        self.updated_at = Utc::now();
        self.raise_status();
        Ok(())
    }

    fn raise_status(&mut self) {
        self.events.push(DomainEvent::ReturnStatusChanged { return_id: self.id, order_id: self.order_id, status: self.status });
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
}

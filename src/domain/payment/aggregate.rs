//! Payment aggregate.
//!
//! One record per payment attempt against an order. Identity, ownership,
//! amount and method are fixed at creation; everything else changes only
//! through a guarded transition.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Money, PaymentMethod, PaymentStatus, TransitionFields};
use crate::domain::foundation::{
    DomainError, ErrorCode, OrderId, PaymentId, StateMachine, Timestamp, UserId,
};

/// Payment aggregate.
///
/// # Invariants
///
/// - `id` is unique and never reused
/// - `status` only changes along state machine edges
/// - `refund_amount <= amount.amount_minor`
/// - `transaction_id` and `capture_id` are written at most once
/// - `gateway_response` is an object that only gains keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,

    pub order_id: OrderId,

    pub user_id: UserId,

    /// Captured from the order at creation.
    pub amount: Money,

    pub method: PaymentMethod,

    pub status: PaymentStatus,

    /// Stripe PaymentIntent id or PayPal order id.
    pub transaction_id: Option<String>,

    /// PayPal capture id, required to refund a PayPal payment.
    pub capture_id: Option<String>,

    /// Where the payer approves a PayPal order.
    pub approval_url: Option<String>,

    /// Provider payloads keyed by source, for audit.
    pub gateway_response: Value,

    pub failure_reason: Option<String>,

    pub refund_id: Option<String>,

    /// Refunded amount in minor units.
    pub refund_amount: Option<i64>,

    pub processed_at: Option<Timestamp>,

    pub created_at: Timestamp,

    pub updated_at: Timestamp,
}

impl Payment {
    /// Starts a payment in PROCESSING, ready for the gateway call.
    pub fn start(order_id: OrderId, user_id: UserId, amount: Money, method: PaymentMethod) -> Self {
        let now = Timestamp::now();
        Self {
            id: PaymentId::new(),
            order_id,
            user_id,
            amount,
            method,
            status: PaymentStatus::Processing,
            transaction_id: None,
            capture_id: None,
            approval_url: None,
            gateway_response: Value::Object(Map::new()),
            failure_reason: None,
            refund_id: None,
            refund_amount: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True while the outcome is not yet known.
    pub fn is_awaiting_confirmation(&self) -> bool {
        self.status.is_unsettled()
    }

    /// Moves to `new_status` and merges `fields`.
    ///
    /// Used by stores that perform the read-modify-write in process; the
    /// caller is responsible for holding the record exclusively.
    pub fn apply_transition(
        &mut self,
        new_status: PaymentStatus,
        fields: &TransitionFields,
    ) -> Result<(), DomainError> {
        self.status.transition_to(new_status).map_err(|e| {
            DomainError::new(ErrorCode::InvalidStateTransition, e.to_string())
                .with_detail("payment_id", self.id.to_string())
                .with_detail("current", self.status.as_str())
                .with_detail("attempted", new_status.as_str())
        })?;

        if let Some(amount) = fields.refund_amount {
            if amount <= 0 || amount > self.amount.amount_minor {
                return Err(DomainError::new(
                    ErrorCode::ValidationFailed,
                    format!(
                        "Refund amount {} outside 1..={}",
                        amount, self.amount.amount_minor
                    ),
                ));
            }
        }

        self.status = new_status;
        if self.transaction_id.is_none() {
            self.transaction_id = fields.transaction_id.clone();
        }
        if self.capture_id.is_none() {
            self.capture_id = fields.capture_id.clone();
        }
        if fields.approval_url.is_some() {
            self.approval_url = fields.approval_url.clone();
        }
        if fields.failure_reason.is_some() {
            self.failure_reason = fields.failure_reason.clone();
        }
        if fields.refund_id.is_some() {
            self.refund_id = fields.refund_id.clone();
        }
        if fields.refund_amount.is_some() {
            self.refund_amount = fields.refund_amount;
        }
        if fields.processed_at.is_some() {
            self.processed_at = fields.processed_at;
        }
        if let Some(entry) = &fields.gateway_response {
            self.merge_gateway_response(&entry.key, entry.payload.clone());
        }
        self.updated_at = Timestamp::now();
        Ok(())
    }

    fn merge_gateway_response(&mut self, key: &str, payload: Value) {
        if !self.gateway_response.is_object() {
            self.gateway_response = Value::Object(Map::new());
        }
        if let Value::Object(map) = &mut self.gateway_response {
            map.insert(key.to_string(), payload);
        }
    }
}

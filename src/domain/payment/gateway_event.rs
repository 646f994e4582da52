//! Provider-neutral view of a verified webhook event.
//!
//! Each gateway adapter parses its own tagged event union and lowers it into
//! a [`GatewayEvent`]; the reconciler only ever sees this shape.

use serde_json::Value;

use super::{PaymentMethod, TransitionTrigger};
use crate::domain::foundation::PaymentId;

/// A verified inbound event.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    /// Provider's event id (`evt_...`, `WH-...`).
    pub event_id: String,
    /// Provider's event type string, kept for logging.
    pub event_type: String,
    pub method: PaymentMethod,
    pub action: WebhookAction,
    /// Raw provider payload.
    pub payload: Value,
}

impl GatewayEvent {
    /// An authenticated event whose body could not be lowered.
    ///
    /// It is acknowledged like any unhandled type so the provider stops
    /// redelivering it. Id and type are read leniently from the raw JSON.
    pub fn unreadable(
        method: PaymentMethod,
        payload: Value,
        id_field: &str,
        type_field: &str,
    ) -> Self {
        let text = |field: &str| {
            payload
                .get(field)
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string()
        };
        Self {
            event_id: text(id_field),
            event_type: text(type_field),
            method,
            action: WebhookAction::Unhandled,
            payload,
        }
    }

    pub fn is_unhandled(&self) -> bool {
        matches!(self.action, WebhookAction::Unhandled)
    }

    /// Key under which this event is recorded in `Payment::gateway_response`.
    pub fn audit_key(&self) -> String {
        format!("webhook:{}", self.event_type)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookAction {
    /// The event maps onto a row of the transition table.
    Apply(EventTransition),
    /// The event type is not one the payment lifecycle consumes.
    Unhandled,
}

/// What an event asks of the payment it refers to.
#[derive(Debug, Clone, PartialEq)]
pub struct EventTransition {
    pub trigger: TransitionTrigger,
    /// Primary lookup key (PaymentIntent id, PayPal order id).
    pub transaction_id: Option<String>,
    /// Secondary gateway id, tried as a transaction id when the primary misses.
    pub capture_id: Option<String>,
    /// Our payment id, as embedded by us in metadata or `custom_id`.
    pub reference: Option<PaymentId>,
    pub failure_reason: Option<String>,
    pub refund_id: Option<String>,
    /// Refunded amount in minor units when the provider reports it.
    pub refund_amount: Option<i64>,
}

impl EventTransition {
    pub fn new(trigger: TransitionTrigger) -> Self {
        Self {
            trigger,
            transaction_id: None,
            capture_id: None,
            reference: None,
            failure_reason: None,
            refund_id: None,
            refund_amount: None,
        }
    }

    pub fn transaction_id(mut self, id: impl Into<String>) -> Self {
        self.transaction_id = Some(id.into());
        self
    }

    pub fn capture_id(mut self, id: Option<String>) -> Self {
        self.capture_id = id;
        self
    }

    /// Parses a reference we embedded earlier; foreign values are ignored.
    pub fn reference(mut self, raw: Option<&str>) -> Self {
        self.reference = raw.and_then(|r| r.parse().ok());
        self
    }

    pub fn failure_reason(mut self, reason: Option<String>) -> Self {
        self.failure_reason = reason;
        self
    }

    pub fn refund(mut self, refund_id: Option<String>, amount: Option<i64>) -> Self {
        self.refund_id = refund_id;
        self.refund_amount = amount;
        self
    }
}

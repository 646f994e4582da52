//! Transition table and the request/response shapes of a guarded transition.
//!
//! Every mutation of a payment's status names one [`TransitionTrigger`]. The
//! trigger fixes both the target status and the set of statuses the payment
//! must currently be in; anything else is treated as a stale or duplicate
//! event and skipped.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Payment, PaymentStatus};
use crate::domain::foundation::{PaymentId, Timestamp};

/// One row of the payment transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    /// Synchronous gateway call confirmed the charge.
    GatewayCallSucceeded,
    /// Synchronous gateway call declined or failed terminally.
    GatewayCallFailed,
    /// Provider reports the charge or capture succeeded.
    PaymentSucceeded,
    /// Provider reports the charge or capture was denied.
    PaymentFailed,
    /// Payer must complete an extra step (3-D Secure, approval).
    ActionRequired,
    /// Order voided or intent canceled before capture.
    Voided,
    /// Provider reports a refund completed.
    RefundCompleted,
    /// Provider reports a dispute or chargeback.
    DisputeCreated,
    /// Synchronous refund call succeeded.
    RefundSucceeded,
    /// Capture of an approved order is starting.
    CaptureRequested,
}

impl TransitionTrigger {
    pub const ALL: [TransitionTrigger; 10] = [
        TransitionTrigger::GatewayCallSucceeded,
        TransitionTrigger::GatewayCallFailed,
        TransitionTrigger::PaymentSucceeded,
        TransitionTrigger::PaymentFailed,
        TransitionTrigger::ActionRequired,
        TransitionTrigger::Voided,
        TransitionTrigger::RefundCompleted,
        TransitionTrigger::DisputeCreated,
        TransitionTrigger::RefundSucceeded,
        TransitionTrigger::CaptureRequested,
    ];

    /// Statuses the payment must be in for this trigger to apply.
    pub fn allowed_from(&self) -> &'static [PaymentStatus] {
        use PaymentStatus::*;
        match self {
            TransitionTrigger::GatewayCallSucceeded
            | TransitionTrigger::GatewayCallFailed
            | TransitionTrigger::ActionRequired => &[Processing],
            TransitionTrigger::PaymentSucceeded
            | TransitionTrigger::PaymentFailed
            | TransitionTrigger::Voided => &[Pending, Processing],
            TransitionTrigger::RefundCompleted
            | TransitionTrigger::DisputeCreated
            | TransitionTrigger::RefundSucceeded => &[Completed],
            TransitionTrigger::CaptureRequested => &[Pending],
        }
    }

    pub fn target(&self) -> PaymentStatus {
        match self {
            TransitionTrigger::GatewayCallSucceeded | TransitionTrigger::PaymentSucceeded => {
                PaymentStatus::Completed
            }
            TransitionTrigger::GatewayCallFailed
            | TransitionTrigger::PaymentFailed
            | TransitionTrigger::DisputeCreated => PaymentStatus::Failed,
            TransitionTrigger::ActionRequired => PaymentStatus::Pending,
            TransitionTrigger::Voided => PaymentStatus::Cancelled,
            TransitionTrigger::RefundCompleted | TransitionTrigger::RefundSucceeded => {
                PaymentStatus::Refunded
            }
            TransitionTrigger::CaptureRequested => PaymentStatus::Processing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionTrigger::GatewayCallSucceeded => "gateway_call_succeeded",
            TransitionTrigger::GatewayCallFailed => "gateway_call_failed",
            TransitionTrigger::PaymentSucceeded => "payment_succeeded",
            TransitionTrigger::PaymentFailed => "payment_failed",
            TransitionTrigger::ActionRequired => "action_required",
            TransitionTrigger::Voided => "voided",
            TransitionTrigger::RefundCompleted => "refund_completed",
            TransitionTrigger::DisputeCreated => "dispute_created",
            TransitionTrigger::RefundSucceeded => "refund_succeeded",
            TransitionTrigger::CaptureRequested => "capture_requested",
        }
    }
}

/// How the store locates the payment to transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentLookup {
    Id(PaymentId),
    /// Gateway-assigned id; the only key a webhook carries.
    TransactionId(String),
}

impl std::fmt::Display for PaymentLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentLookup::Id(id) => write!(f, "payment_id={}", id),
            PaymentLookup::TransactionId(tx) => write!(f, "transaction_id={}", tx),
        }
    }
}

/// A provider payload retained on the payment for audit.
///
/// Entries are merged into `Payment::gateway_response` under `key`.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponseEntry {
    pub key: String,
    pub payload: Value,
}

impl GatewayResponseEntry {
    pub fn new(key: impl Into<String>, payload: Value) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

/// Optional field updates carried alongside a status change.
///
/// `None` leaves the stored value untouched. `transaction_id` and
/// `capture_id` are set-once: an existing value is never overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionFields {
    pub transaction_id: Option<String>,
    pub capture_id: Option<String>,
    pub approval_url: Option<String>,
    pub failure_reason: Option<String>,
    pub refund_id: Option<String>,
    pub refund_amount: Option<i64>,
    pub processed_at: Option<Timestamp>,
    pub gateway_response: Option<GatewayResponseEntry>,
}

impl TransitionFields {
    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn with_capture_id(mut self, capture_id: Option<String>) -> Self {
        self.capture_id = capture_id;
        self
    }

    pub fn with_approval_url(mut self, approval_url: Option<String>) -> Self {
        self.approval_url = approval_url;
        self
    }

    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    pub fn with_refund(mut self, refund_id: Option<String>, refund_amount: i64) -> Self {
        self.refund_id = refund_id;
        self.refund_amount = Some(refund_amount);
        self
    }

    pub fn processed_now(mut self) -> Self {
        self.processed_at = Some(Timestamp::now());
        self
    }

    pub fn with_gateway_response(mut self, key: impl Into<String>, payload: Value) -> Self {
        self.gateway_response = Some(GatewayResponseEntry::new(key, payload));
        self
    }
}

/// Result of a guarded transition.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    /// The status changed; carries the updated record.
    Applied(Payment),
    /// The payment was not in an allowed status. Stale or duplicate event.
    Skipped(Payment),
}

impl TransitionOutcome {
    pub fn payment(&self) -> &Payment {
        match self {
            TransitionOutcome::Applied(p) | TransitionOutcome::Skipped(p) => p,
        }
    }

    pub fn into_payment(self) -> Payment {
        match self {
            TransitionOutcome::Applied(p) | TransitionOutcome::Skipped(p) => p,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }
}

/// Statuses a guarded transition may actually move from.
///
/// The caller's expected set is intersected with the state machine's sources
/// of `target`, so even an unconditional request cannot regress a payment.
pub fn effective_sources(
    expected: Option<&[PaymentStatus]>,
    target: PaymentStatus,
) -> Vec<PaymentStatus> {
    use crate::domain::foundation::StateMachine;

    let legal = PaymentStatus::sources_of(target);
    match expected {
        Some(expected) => legal.into_iter().filter(|s| expected.contains(s)).collect(),
        None => legal,
    }
}

//! HTTP DTOs (Data Transfer Objects) for payment endpoints.
//!
//! Request and response bodies use camelCase; error bodies keep the
//! `{ error_code, message, details }` shape shared by every endpoint.

use serde::{Deserialize, Serialize};

use crate::application::WebhookOutcome;
use crate::domain::payment::{Payment, PaymentMethod, PaymentStatus};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to pay for an order.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentRequest {
    pub order_id: String,
    pub method: PaymentMethod,
    #[serde(default)]
    pub payment_details: PaymentDetails,
}

/// Provider-specific inputs. Stripe needs a payment method; PayPal needs
/// the URLs the payer returns to after approval.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub return_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

/// Request to refund a completed payment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundPaymentRequest {
    /// Minor units (cents). Omit for a full refund.
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// True while the outcome depends on a payer step or a pending webhook.
    pub awaiting_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            order_id: payment.order_id.to_string(),
            amount: payment.amount.amount_minor,
            currency: payment.amount.currency.to_string(),
            method: payment.method,
            awaiting_confirmation: payment.is_awaiting_confirmation(),
            status: payment.status,
            transaction_id: payment.transaction_id,
            approval_url: payment.approval_url,
            failure_reason: payment.failure_reason,
            refund_id: payment.refund_id,
            refund_amount: payment.refund_amount,
            processed_at: payment.processed_at.map(|t| t.to_rfc3339()),
            created_at: payment.created_at.to_rfc3339(),
            updated_at: payment.updated_at.to_rfc3339(),
        }
    }
}

/// Body returned to the provider for an authenticated webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

impl WebhookAck {
    pub fn for_outcome(outcome: &WebhookOutcome) -> Self {
        Self {
            received: true,
            outcome: Some(outcome.label().to_string()),
        }
    }

    pub fn received() -> Self {
        Self {
            received: true,
            outcome: None,
        }
    }
}

/// Standard error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error_code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: Some(details),
        }
    }
}

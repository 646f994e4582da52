//! Payment-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Validation | 400 |
//! | PaymentNotFound / OrderNotFound | 404 |
//! | OrderAlreadyPaid | 409 |
//! | InvalidState | 409 |
//! | Gateway (retryable) | 503 |
//! | Gateway | 502 |
//! | Infrastructure | 500 |

use std::str::FromStr;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, PaymentId, ValidationError};

use super::PaymentStatus;

/// Errors surfaced by the synchronous payment operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// Malformed request. Raised before any gateway call.
    Validation { field: String, message: String },

    /// Payment absent or not owned by the caller.
    PaymentNotFound(PaymentId),

    /// Order absent or not owned by the caller.
    OrderNotFound(OrderId),

    /// The order has already been paid.
    OrderAlreadyPaid(OrderId),

    /// Operation not allowed in the payment's current status.
    InvalidState {
        current: PaymentStatus,
        attempted: String,
    },

    /// Upstream gateway call failed or timed out.
    Gateway { message: String, retryable: bool },

    /// Storage or other infrastructure failure.
    Infrastructure(String),
}

impl PaymentError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PaymentError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state(current: PaymentStatus, attempted: impl Into<String>) -> Self {
        PaymentError::InvalidState {
            current,
            attempted: attempted.into(),
        }
    }

    pub fn gateway(message: impl Into<String>, retryable: bool) -> Self {
        PaymentError::Gateway {
            message: message.into(),
            retryable,
        }
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        PaymentError::Infrastructure(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            PaymentError::Validation { .. } => ErrorCode::ValidationFailed,
            PaymentError::PaymentNotFound(_) => ErrorCode::PaymentNotFound,
            PaymentError::OrderNotFound(_) => ErrorCode::OrderNotFound,
            PaymentError::OrderAlreadyPaid(_) => ErrorCode::OrderAlreadyPaid,
            PaymentError::InvalidState { .. } => ErrorCode::InvalidStateTransition,
            PaymentError::Gateway { .. } => ErrorCode::GatewayError,
            PaymentError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    pub fn message(&self) -> String {
        match self {
            PaymentError::Validation { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            PaymentError::PaymentNotFound(id) => format!("Payment not found: {}", id),
            PaymentError::OrderNotFound(id) => format!("Order not found: {}", id),
            PaymentError::OrderAlreadyPaid(id) => format!("Order {} has already been paid", id),
            PaymentError::InvalidState { current, attempted } => {
                format!("Cannot {} a payment in {} state", attempted, current)
            }
            PaymentError::Gateway { message, .. } => format!("Payment gateway error: {}", message),
            PaymentError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// True when the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::Gateway { retryable, .. } => *retryable,
            PaymentError::Infrastructure(_) => true,
            _ => false,
        }
    }

    /// True for the conflict family (409).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            PaymentError::OrderAlreadyPaid(_) | PaymentError::InvalidState { .. }
        )
    }
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for PaymentError {}

impl From<ValidationError> for PaymentError {
    fn from(err: ValidationError) -> Self {
        PaymentError::validation(err.field().to_string(), err.to_string())
    }
}

impl From<DomainError> for PaymentError {
    /// Recovers the typed variant from the ids a store attaches as details.
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => PaymentError::Validation {
                field: err.details.get("field").cloned().unwrap_or_default(),
                message: err.message,
            },
            ErrorCode::PaymentNotFound => match detail::<PaymentId>(&err, "payment_id") {
                Some(id) => PaymentError::PaymentNotFound(id),
                None => PaymentError::Infrastructure(err.to_string()),
            },
            ErrorCode::OrderAlreadyPaid => match detail::<OrderId>(&err, "order_id") {
                Some(id) => PaymentError::OrderAlreadyPaid(id),
                None => PaymentError::Infrastructure(err.to_string()),
            },
            ErrorCode::InvalidStateTransition => match detail::<PaymentStatus>(&err, "current") {
                Some(current) => PaymentError::InvalidState {
                    current,
                    attempted: err
                        .details
                        .get("attempted")
                        .cloned()
                        .unwrap_or_else(|| "transition".to_string()),
                },
                None => PaymentError::Infrastructure(err.to_string()),
            },
            _ => PaymentError::Infrastructure(err.to_string()),
        }
    }
}

fn detail<T: FromStr>(err: &DomainError, key: &str) -> Option<T> {
    err.details.get(key).and_then(|v| v.parse().ok())
}

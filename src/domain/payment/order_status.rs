//! Order payment-status projection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::PaymentStatus;
use crate::domain::foundation::ValidationError;

/// The single Order field this subsystem owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl OrderPaymentStatus {
    /// Projection of a payment status onto the order.
    ///
    /// `None` means the order keeps whatever value it already has.
    pub fn projected_from(status: PaymentStatus) -> Option<Self> {
        match status {
            PaymentStatus::Completed => Some(OrderPaymentStatus::Paid),
            PaymentStatus::Failed => Some(OrderPaymentStatus::Failed),
            PaymentStatus::Refunded => Some(OrderPaymentStatus::Refunded),
            PaymentStatus::Pending | PaymentStatus::Processing | PaymentStatus::Cancelled => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::Pending => "PENDING",
            OrderPaymentStatus::Paid => "PAID",
            OrderPaymentStatus::Failed => "FAILED",
            OrderPaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for OrderPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderPaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderPaymentStatus::Pending),
            "PAID" => Ok(OrderPaymentStatus::Paid),
            "FAILED" => Ok(OrderPaymentStatus::Failed),
            "REFUNDED" => Ok(OrderPaymentStatus::Refunded),
            other => Err(ValidationError::invalid_format(
                "payment_status",
                format!("unknown order payment status '{}'", other),
            )),
        }
    }
}

//! Webhook error types.
//!
//! Only authenticity failures are reported back to the provider as non-2xx.
//! Everything that happens after an event is trusted is acknowledged, so a
//! provider never retries an event we have already handled or ignored.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature or transmission headers absent.
    #[error("Missing signature: {0}")]
    MissingSignature(String),

    /// Signature did not verify.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp outside the freshness window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signature header, or a body needed to verify it, could not be parsed.
    ///
    /// Raised only before authentication. Gateways pass an authenticated
    /// body they cannot read on as an unhandled event.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The provider's verification endpoint could not be reached.
    #[error("Verification unavailable: {0}")]
    VerificationUnavailable(String),

    /// Storage failure while reconciling a trusted event.
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),
}

impl WebhookError {
    /// True for failures that mean the event itself cannot be trusted.
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::MissingSignature(_)
                | WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::ParseError(_)
                | WebhookError::VerificationUnavailable(_)
        )
    }

    /// Whether a provider redelivery could change the outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::VerificationUnavailable(_) | WebhookError::Infrastructure(_)
        )
    }

    /// Status code returned to the provider.
    ///
    /// - 400: untrusted event, do not process
    /// - 503: verification endpoint down, redelivery welcome
    /// - 200: trusted event, acknowledged whatever the internal outcome
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::VerificationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            e if e.is_verification_failure() => StatusCode::BAD_REQUEST,
            _ => StatusCode::OK,
        }
    }
}

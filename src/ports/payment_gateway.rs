//! Payment gateway port.
//!
//! One implementation per provider. Stripe confirms in a single call; PayPal
//! creates an order the payer approves out-of-band and is captured later.
//! Both are driven through the same capability set.
//!
//! Business declines are outcomes ([`ChargeOutcome::Declined`]), not errors.
//! A [`GatewayError`] always means the call itself failed.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::{OrderId, PaymentId};
use crate::domain::payment::{GatewayEvent, Money, PaymentError, PaymentMethod, WebhookError};

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider this gateway talks to.
    fn method(&self) -> PaymentMethod;

    /// Creates (and when possible confirms) a charge.
    ///
    /// Stripe: creates a PaymentIntent, confirming it when a payment method
    /// reference is supplied. PayPal: creates an order awaiting approval.
    async fn initiate(&self, request: InitiatePaymentRequest) -> Result<ChargeOutcome, GatewayError>;

    /// Captures a previously approved charge.
    async fn capture(&self, request: CaptureRequest) -> Result<ChargeOutcome, GatewayError>;

    /// Refunds a captured charge. `amount: None` refunds in full.
    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError>;

    /// Current provider-side state of a charge, used by the stale-payment sweep.
    async fn retrieve(&self, transaction_id: &str) -> Result<ChargeOutcome, GatewayError>;

    /// Looks a charge up by our payment id when no transaction id was ever
    /// recorded, e.g. because the initiate call timed out.
    ///
    /// `None` means the provider holds no charge for this payment.
    async fn find_by_reference(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<ChargeOutcome>, GatewayError>;

    /// Cancels an uncaptured charge so it can no longer take funds.
    async fn void(&self, request: VoidRequest) -> Result<Value, GatewayError>;

    /// Authenticates an inbound webhook and lowers it to a [`GatewayEvent`].
    async fn verify_webhook(&self, request: &WebhookRequest) -> Result<GatewayEvent, GatewayError>;
}

// ════════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct InitiatePaymentRequest {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Money,
    /// Stripe PaymentMethod id (`pm_...`). When present the intent is confirmed.
    pub payment_method_ref: Option<String>,
    /// Where the payer returns after approval or 3-D Secure.
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

impl InitiatePaymentRequest {
    /// Key that makes a retried create safe at the provider.
    pub fn idempotency_key(&self) -> String {
        format!("payment-{}", self.payment_id)
    }
}

#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub payment_id: PaymentId,
    pub transaction_id: String,
}

#[derive(Debug, Clone)]
pub struct RefundRequest {
    pub payment_id: PaymentId,
    /// PaymentIntent id (Stripe) or order id (PayPal).
    pub transaction_id: String,
    /// PayPal capture id; refunds are issued against the capture.
    pub capture_id: Option<String>,
    /// Amount to refund. `None` refunds the full captured amount.
    pub amount: Option<Money>,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct VoidRequest {
    pub payment_id: PaymentId,
    pub transaction_id: String,
    pub reason: VoidReason,
}

impl VoidRequest {
    pub fn idempotency_key(&self) -> String {
        format!("void-{}", self.payment_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoidReason {
    /// Payer never finished; the sweep gave up on it.
    Abandoned,
    /// Another payment for the same order completed first.
    Superseded,
}

impl VoidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoidReason::Abandoned => "abandoned",
            VoidReason::Superseded => "superseded",
        }
    }
}

impl RefundRequest {
    pub fn idempotency_key(&self) -> String {
        match &self.amount {
            Some(amount) => format!("refund-{}-{}", self.payment_id, amount.amount_minor),
            None => format!("refund-{}-full", self.payment_id),
        }
    }
}

/// Raw inbound webhook as received over HTTP.
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub body: Vec<u8>,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
}

impl WebhookRequest {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Outcomes
// ════════════════════════════════════════════════════════════════════════════════

/// Business outcome of a charge, capture or status poll.
#[derive(Debug, Clone, PartialEq)]
pub enum ChargeOutcome {
    /// Funds captured.
    Succeeded {
        transaction_id: String,
        capture_id: Option<String>,
        raw: Value,
    },
    /// Waiting on the payer or on the provider (3-D Secure, approval, review).
    ActionRequired {
        transaction_id: String,
        approval_url: Option<String>,
        raw: Value,
    },
    /// Declined by the provider or issuer.
    Declined {
        transaction_id: Option<String>,
        reason: String,
        raw: Value,
    },
}

impl ChargeOutcome {
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            ChargeOutcome::Succeeded { transaction_id, .. }
            | ChargeOutcome::ActionRequired { transaction_id, .. } => Some(transaction_id),
            ChargeOutcome::Declined { transaction_id, .. } => transaction_id.as_deref(),
        }
    }

    pub fn raw(&self) -> &Value {
        match self {
            ChargeOutcome::Succeeded { raw, .. }
            | ChargeOutcome::ActionRequired { raw, .. }
            | ChargeOutcome::Declined { raw, .. } => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefundOutcome {
    /// Refund accepted. `status` is the provider's own value (`succeeded`, `pending`, `COMPLETED`).
    Succeeded {
        refund_id: String,
        status: String,
        raw: Value,
    },
    Declined { reason: String, raw: Value },
}

// ════════════════════════════════════════════════════════════════════════════════
// Errors
// ════════════════════════════════════════════════════════════════════════════════

const WEBHOOK_MISSING_SIGNATURE: &str = "missing_signature";
const WEBHOOK_STALE: &str = "timestamp_out_of_range";
const WEBHOOK_MALFORMED: &str = "malformed";

/// A failed gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: GatewayErrorCode,
    pub message: String,
    /// Provider's error code, if it sent one.
    pub provider_code: Option<String>,
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_code: None,
            retryable: code.is_retryable(),
        }
    }

    pub fn with_provider_code(mut self, code: impl Into<String>) -> Self {
        self.provider_code = Some(code.into());
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::Timeout, message)
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ConnectionFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidRequest, message)
    }

    pub fn invalid_webhook(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidWebhook, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ProviderError, message)
    }

    /// Webhook arrived without the headers needed to authenticate it.
    pub fn missing_signature(header: &str) -> Self {
        Self::invalid_webhook(format!("Missing {} header", header))
            .with_provider_code(WEBHOOK_MISSING_SIGNATURE)
    }

    /// Signed timestamp outside the freshness window.
    pub fn stale_webhook(message: impl Into<String>) -> Self {
        Self::invalid_webhook(message).with_provider_code(WEBHOOK_STALE)
    }

    /// Signature header or body could not be parsed.
    pub fn malformed_webhook(message: impl Into<String>) -> Self {
        Self::invalid_webhook(message).with_provider_code(WEBHOOK_MALFORMED)
    }

    /// Maps a transport error from reqwest.
    ///
    /// Connect failures never reached the provider; anything else might have.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(err.to_string())
        } else if err.is_connect() {
            Self::connection_failed(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }

    /// Maps a non-success HTTP status from the provider.
    pub fn from_status(status: u16, provider: &str, body: &str) -> Self {
        let code = match status {
            401 | 403 => GatewayErrorCode::AuthenticationError,
            404 => GatewayErrorCode::NotFound,
            429 => GatewayErrorCode::RateLimitExceeded,
            400..=499 => GatewayErrorCode::InvalidRequest,
            _ => GatewayErrorCode::ProviderError,
        };
        let mut err = Self::new(code, format!("{} API error ({}): {}", provider, status, body));
        if status >= 500 {
            err.retryable = true;
        }
        err
    }

    /// True when the request may have taken effect at the provider.
    ///
    /// The payment must then stay unsettled until a webhook or the sweep
    /// reveals what happened.
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self.code,
            GatewayErrorCode::Timeout | GatewayErrorCode::NetworkError
        ) || (self.code == GatewayErrorCode::ProviderError && self.retryable)
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<GatewayError> for WebhookError {
    /// Authentication failures keep their reason; any other failure means the
    /// provider could not be asked, so redelivery may succeed.
    fn from(err: GatewayError) -> Self {
        if err.code != GatewayErrorCode::InvalidWebhook {
            return WebhookError::VerificationUnavailable(err.to_string());
        }
        match err.provider_code.as_deref() {
            Some(WEBHOOK_MISSING_SIGNATURE) => WebhookError::MissingSignature(err.message),
            Some(WEBHOOK_STALE) => WebhookError::TimestampOutOfRange,
            Some(WEBHOOK_MALFORMED) => WebhookError::ParseError(err.message),
            _ => WebhookError::InvalidSignature,
        }
    }
}

impl From<GatewayError> for PaymentError {
    fn from(err: GatewayError) -> Self {
        PaymentError::gateway(err.to_string(), err.retryable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayErrorCode {
    /// No response within the configured timeout.
    Timeout,

    /// Could not open a connection; the request was never sent.
    ConnectionFailed,

    /// Transport failed after the request may have been sent.
    NetworkError,

    AuthenticationError,

    InvalidRequest,

    NotFound,

    RateLimitExceeded,

    /// Webhook failed authentication.
    InvalidWebhook,

    /// Provider returned a server error or an unparseable response.
    ProviderError,
}

impl GatewayErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayErrorCode::Timeout
                | GatewayErrorCode::ConnectionFailed
                | GatewayErrorCode::NetworkError
                | GatewayErrorCode::RateLimitExceeded
        )
    }
}

impl std::fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GatewayErrorCode::Timeout => "timeout",
            GatewayErrorCode::ConnectionFailed => "connection_failed",
            GatewayErrorCode::NetworkError => "network_error",
            GatewayErrorCode::AuthenticationError => "authentication_error",
            GatewayErrorCode::InvalidRequest => "invalid_request",
            GatewayErrorCode::NotFound => "not_found",
            GatewayErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            GatewayErrorCode::InvalidWebhook => "invalid_webhook",
            GatewayErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}

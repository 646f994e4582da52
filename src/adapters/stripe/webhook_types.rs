//! Stripe wire types: signature header, event envelope, and the objects the
//! payment lifecycle consumes.
//!
//! [`StripeEvent`] is the closed set of event types we act on. Anything else
//! parses to [`StripeEvent::Unhandled`] with its raw payload kept.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::payment::{EventTransition, TransitionTrigger, WebhookAction};

// ════════════════════════════════════════════════════════════════════════════════
// Signature Parsing
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureParseError {
    MissingHeader,
    MissingTimestamp,
    MissingV1Signature,
    InvalidTimestamp,
    /// A component was not `key=value` or a signature was not hex.
    MalformedComponent,
}

impl std::fmt::Display for SignatureParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingHeader => write!(f, "Missing Stripe-Signature header"),
            Self::MissingTimestamp => write!(f, "Missing timestamp (t=) in signature"),
            Self::MissingV1Signature => write!(f, "Missing v1 signature in header"),
            Self::InvalidTimestamp => write!(f, "Invalid timestamp format"),
            Self::MalformedComponent => write!(f, "Malformed signature component"),
        }
    }
}

impl std::error::Error for SignatureParseError {}

/// Parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
///
/// Stripe sends one `v1` per active endpoint secret, so several may appear
/// while a secret is being rolled.
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureParseError> {
        if header.trim().is_empty() {
            return Err(SignatureParseError::MissingHeader);
        }

        let mut timestamp = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or(SignatureParseError::MalformedComponent)?;
            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse::<i64>()
                            .map_err(|_| SignatureParseError::InvalidTimestamp)?,
                    );
                }
                "v1" => {
                    let bytes =
                        hex_decode(value.trim()).ok_or(SignatureParseError::MalformedComponent)?;
                    v1_signatures.push(bytes);
                }
                // v0 and future schemes are not trusted
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureParseError::MissingTimestamp)?;
        if v1_signatures.is_empty() {
            return Err(SignatureParseError::MissingV1Signature);
        }
        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ════════════════════════════════════════════════════════════════════════════════
// Event Envelope
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeWebhookEvent {
    /// `evt_...`
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,

    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    pub object: Value,
}

// ════════════════════════════════════════════════════════════════════════════════
// Stripe Objects
// ════════════════════════════════════════════════════════════════════════════════

/// PaymentIntent, as returned by the API and embedded in `payment_intent.*` events.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripePaymentIntent {
    /// `pi_...`
    pub id: String,

    /// `requires_payment_method`, `requires_confirmation`, `requires_action`,
    /// `processing`, `requires_capture`, `canceled` or `succeeded`.
    pub status: String,

    #[serde(default)]
    pub amount: i64,

    #[serde(default)]
    pub currency: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    pub last_payment_error: Option<StripeApiErrorDetail>,

    pub next_action: Option<StripeNextAction>,

    pub latest_charge: Option<String>,

    pub cancellation_reason: Option<String>,
}

impl StripePaymentIntent {
    /// Our payment id, embedded as `metadata[payment_id]` at creation.
    pub fn payment_reference(&self) -> Option<&str> {
        self.metadata.get("payment_id").map(String::as_str)
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.last_payment_error.as_ref().map(|e| e.describe())
    }

    /// URL for 3-D Secure or redirect-based confirmation, if any.
    pub fn redirect_url(&self) -> Option<String> {
        self.next_action
            .as_ref()
            .and_then(|a| a.redirect_to_url.as_ref())
            .map(|r| r.url.clone())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeNextAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub redirect_to_url: Option<StripeRedirect>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeRedirect {
    pub url: String,
}

/// Charge object, delivered with `charge.refunded`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeCharge {
    /// `ch_...`
    pub id: String,

    pub payment_intent: Option<String>,

    #[serde(default)]
    pub amount: i64,

    #[serde(default)]
    pub amount_refunded: i64,

    /// True only once the full amount has been refunded.
    #[serde(default)]
    pub refunded: bool,

    #[serde(default)]
    pub metadata: HashMap<String, String>,

    pub refunds: Option<StripeList<StripeRefund>>,
}

impl StripeCharge {
    /// Most recent refund id, when Stripe expanded the list.
    pub fn latest_refund_id(&self) -> Option<String> {
        self.refunds
            .as_ref()
            .and_then(|list| list.data.first())
            .map(|r| r.id.clone())
    }
}

/// Dispute object, delivered with `charge.dispute.created`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeDispute {
    /// `dp_...`
    pub id: String,

    pub charge: Option<String>,

    pub payment_intent: Option<String>,

    #[serde(default)]
    pub amount: i64,

    #[serde(default)]
    pub reason: String,

    #[serde(default)]
    pub status: String,
}

/// Refund object returned by `POST /v1/refunds`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeRefund {
    /// `re_...`
    pub id: String,

    /// `pending`, `requires_action`, `succeeded`, `failed` or `canceled`.
    pub status: String,

    #[serde(default)]
    pub amount: i64,

    pub payment_intent: Option<String>,

    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeList<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// Body of a Stripe error response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeErrorResponse {
    pub error: StripeApiErrorDetail,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeApiErrorDetail {
    /// `card_error`, `invalid_request_error`, `api_error`, ...
    #[serde(rename = "type", default)]
    pub error_type: String,

    pub code: Option<String>,

    pub decline_code: Option<String>,

    pub message: Option<String>,

    /// Present on card errors raised while confirming an intent.
    pub payment_intent: Option<Box<StripePaymentIntent>>,
}

impl StripeApiErrorDetail {
    pub fn describe(&self) -> String {
        let code = self
            .decline_code
            .as_deref()
            .or(self.code.as_deref())
            .unwrap_or("payment_failed");
        match &self.message {
            Some(message) => format!("{}: {}", code, message),
            None => code.to_string(),
        }
    }

    pub fn is_card_error(&self) -> bool {
        self.error_type == "card_error"
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Consumed Events
// ════════════════════════════════════════════════════════════════════════════════

/// The Stripe events the payment lifecycle acts on.
#[derive(Debug, Clone)]
pub enum StripeEvent {
    PaymentIntentSucceeded(StripePaymentIntent),
    PaymentIntentFailed(StripePaymentIntent),
    PaymentIntentRequiresAction(StripePaymentIntent),
    PaymentIntentCanceled(StripePaymentIntent),
    ChargeRefunded(StripeCharge),
    DisputeCreated(StripeDispute),
    Unhandled { event_type: String, raw: Value },
}

impl StripeEvent {
    /// Types the envelope's `data.object` by event type.
    pub fn from_envelope(event: &StripeWebhookEvent) -> Result<Self, serde_json::Error> {
        let object = || event.data.object.clone();
        Ok(match event.event_type.as_str() {
            "payment_intent.succeeded" => {
                StripeEvent::PaymentIntentSucceeded(serde_json::from_value(object())?)
            }
            "payment_intent.payment_failed" => {
                StripeEvent::PaymentIntentFailed(serde_json::from_value(object())?)
            }
            "payment_intent.requires_action" => {
                StripeEvent::PaymentIntentRequiresAction(serde_json::from_value(object())?)
            }
            "payment_intent.canceled" => {
                StripeEvent::PaymentIntentCanceled(serde_json::from_value(object())?)
            }
            "charge.refunded" => StripeEvent::ChargeRefunded(serde_json::from_value(object())?),
            "charge.dispute.created" => {
                StripeEvent::DisputeCreated(serde_json::from_value(object())?)
            }
            other => StripeEvent::Unhandled {
                event_type: other.to_string(),
                raw: object(),
            },
        })
    }

    /// Lowers the event onto a row of the transition table.
    pub fn into_action(self) -> WebhookAction {
        let transition = match self {
            StripeEvent::PaymentIntentSucceeded(pi) => {
                EventTransition::new(TransitionTrigger::PaymentSucceeded)
                    .transaction_id(pi.id.clone())
                    .reference(pi.payment_reference())
            }
            StripeEvent::PaymentIntentFailed(pi) => {
                EventTransition::new(TransitionTrigger::PaymentFailed)
                    .transaction_id(pi.id.clone())
                    .reference(pi.payment_reference())
                    .failure_reason(pi.failure_reason())
            }
            StripeEvent::PaymentIntentRequiresAction(pi) => {
                EventTransition::new(TransitionTrigger::ActionRequired)
                    .transaction_id(pi.id.clone())
                    .reference(pi.payment_reference())
            }
            StripeEvent::PaymentIntentCanceled(pi) => EventTransition::new(TransitionTrigger::Voided)
                .transaction_id(pi.id.clone())
                .reference(pi.payment_reference())
                .failure_reason(pi.cancellation_reason.clone()),
            StripeEvent::ChargeRefunded(charge) => {
                let refund_id = charge.latest_refund_id();
                let mut t = EventTransition::new(TransitionTrigger::RefundCompleted)
                    .reference(charge.metadata.get("payment_id").map(String::as_str))
                    .refund(refund_id, Some(charge.amount_refunded).filter(|a| *a > 0));
                t.transaction_id = charge.payment_intent.clone();
                t
            }
            StripeEvent::DisputeCreated(dispute) => {
                let mut t = EventTransition::new(TransitionTrigger::DisputeCreated)
                    .failure_reason(Some(format!("dispute {}: {}", dispute.id, dispute.reason)));
                t.transaction_id = dispute.payment_intent.clone();
                t
            }
            StripeEvent::Unhandled { .. } => return WebhookAction::Unhandled,
        };
        WebhookAction::Apply(transition)
    }
}

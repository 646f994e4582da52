//! PayPal REST and webhook payload types.
//!
//! Only the fields the payment lifecycle reads are modelled. Everything else
//! is kept as raw JSON in the payment's gateway response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::payment::{
    Currency, EventTransition, Money, TransitionTrigger, WebhookAction,
};

// ════════════════════════════════════════════════════════════════════════════════
// Shared Objects
// ════════════════════════════════════════════════════════════════════════════════

/// PayPal money: a currency code plus a decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PayPalAmount {
    pub currency_code: String,
    pub value: String,
}

impl PayPalAmount {
    pub fn from_money(money: &Money) -> Self {
        Self {
            currency_code: money.currency.as_str().to_string(),
            value: money.to_decimal_string(),
        }
    }

    /// Amount in minor units, if the currency and value are well formed.
    pub fn to_minor(&self) -> Option<i64> {
        let currency = Currency::new(&self.currency_code).ok()?;
        Money::parse_decimal(&self.value, currency)
            .ok()
            .map(|m| m.amount_minor)
    }
}

/// HATEOAS link.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalLink {
    pub href: String,
    pub rel: String,
    #[serde(default)]
    pub method: Option<String>,
}

fn find_link<'a>(links: &'a [PayPalLink], rel: &str) -> Option<&'a PayPalLink> {
    links.iter().find(|l| l.rel.eq_ignore_ascii_case(rel))
}

/// Last path segment of the link pointing at a capture (`.../captures/{id}`).
fn capture_id_from_links(links: &[PayPalLink]) -> Option<String> {
    links
        .iter()
        .filter(|l| l.rel == "up")
        .find_map(|l| l.href.split("/captures/").nth(1))
        .map(|rest| rest.trim_end_matches('/').to_string())
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PayPalStatusDetails {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PayPalRelatedIds {
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PayPalSupplementaryData {
    #[serde(default)]
    pub related_ids: PayPalRelatedIds,
}

// ════════════════════════════════════════════════════════════════════════════════
// Orders, Captures, Refunds
// ════════════════════════════════════════════════════════════════════════════════

/// `/v2/checkout/orders` resource.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalOrder {
    pub id: String,

    /// `CREATED`, `SAVED`, `APPROVED`, `VOIDED`, `COMPLETED` or `PAYER_ACTION_REQUIRED`.
    pub status: String,

    #[serde(default)]
    pub purchase_units: Vec<PayPalPurchaseUnit>,

    #[serde(default)]
    pub links: Vec<PayPalLink>,
}

impl PayPalOrder {
    /// Where the payer approves the order.
    pub fn approval_url(&self) -> Option<String> {
        find_link(&self.links, "approve")
            .or_else(|| find_link(&self.links, "payer-action"))
            .map(|l| l.href.clone())
    }

    /// First capture recorded on the order, once captured.
    pub fn capture(&self) -> Option<&PayPalCapture> {
        self.purchase_units
            .iter()
            .filter_map(|u| u.payments.as_ref())
            .flat_map(|p| p.captures.iter())
            .next()
    }

    /// Our payment id, sent as `custom_id` at creation.
    pub fn payment_reference(&self) -> Option<&str> {
        self.purchase_units
            .iter()
            .find_map(|u| u.custom_id.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalPurchaseUnit {
    pub reference_id: Option<String>,
    pub custom_id: Option<String>,
    pub payments: Option<PayPalPayments>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PayPalPayments {
    #[serde(default)]
    pub captures: Vec<PayPalCapture>,
}

/// `/v2/payments/captures` resource, also the body of `PAYMENT.CAPTURE.*` events.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalCapture {
    pub id: String,

    /// `COMPLETED`, `DECLINED`, `PARTIALLY_REFUNDED`, `PENDING`, `REFUNDED` or `FAILED`.
    pub status: String,

    pub amount: Option<PayPalAmount>,

    pub custom_id: Option<String>,

    pub status_details: Option<PayPalStatusDetails>,

    pub supplementary_data: Option<PayPalSupplementaryData>,
}

impl PayPalCapture {
    /// Checkout order the capture belongs to.
    pub fn order_id(&self) -> Option<String> {
        self.supplementary_data
            .as_ref()
            .and_then(|d| d.related_ids.order_id.clone())
    }

    pub fn status_reason(&self) -> Option<String> {
        self.status_details.as_ref().and_then(|d| d.reason.clone())
    }

    pub fn is_completed(&self) -> bool {
        self.status == "COMPLETED"
    }

    pub fn is_pending(&self) -> bool {
        self.status == "PENDING"
    }
}

/// `/v2/payments/refunds` resource, also the body of `PAYMENT.CAPTURE.REFUNDED`
/// and `PAYMENT.CAPTURE.REVERSED`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalRefund {
    pub id: String,

    /// `CANCELLED`, `FAILED`, `PENDING` or `COMPLETED`.
    pub status: String,

    pub amount: Option<PayPalAmount>,

    pub custom_id: Option<String>,

    pub status_details: Option<PayPalStatusDetails>,

    #[serde(default)]
    pub links: Vec<PayPalLink>,
}

impl PayPalRefund {
    /// Capture the refund was issued against.
    pub fn capture_id(&self) -> Option<String> {
        capture_id_from_links(&self.links)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalDisputedTransaction {
    /// Capture id on the seller side.
    pub seller_transaction_id: Option<String>,
    pub custom: Option<String>,
}

/// Body of `CUSTOMER.DISPUTE.CREATED`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalDispute {
    pub dispute_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub disputed_transactions: Vec<PayPalDisputedTransaction>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Auth and Verification
// ════════════════════════════════════════════════════════════════════════════════

/// `/v1/oauth2/token` response.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalAccessToken {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// Request body of `/v1/notifications/verify-webhook-signature`.
#[derive(Debug, Serialize)]
pub struct VerifySignatureRequest<'a> {
    pub auth_algo: &'a str,
    pub cert_url: &'a str,
    pub transmission_id: &'a str,
    pub transmission_sig: &'a str,
    pub transmission_time: &'a str,
    pub webhook_id: &'a str,
    pub webhook_event: &'a Value,
}

#[derive(Debug, Deserialize)]
pub struct VerifySignatureResponse {
    /// `SUCCESS` or `FAILURE`.
    pub verification_status: String,
}

impl VerifySignatureResponse {
    pub fn is_success(&self) -> bool {
        self.verification_status == "SUCCESS"
    }
}

/// Error body of the PayPal REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalErrorResponse {
    pub name: String,
    pub message: Option<String>,
    #[serde(default)]
    pub details: Vec<PayPalErrorDetail>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayPalErrorDetail {
    pub issue: String,
    pub description: Option<String>,
}

impl PayPalErrorResponse {
    /// First detail issue if any, else the error name.
    pub fn issue(&self) -> &str {
        self.details
            .first()
            .map(|d| d.issue.as_str())
            .unwrap_or(self.name.as_str())
    }

    /// Issues that are business declines rather than bad requests.
    pub fn is_decline(&self) -> bool {
        matches!(
            self.issue(),
            "INSTRUMENT_DECLINED"
                | "PAYER_ACTION_REQUIRED"
                | "TRANSACTION_REFUSED"
                | "PAYER_CANNOT_PAY"
                | "CAPTURE_FULLY_REFUNDED"
                | "REFUND_NOT_ALLOWED"
                | "REFUND_AMOUNT_EXCEEDED"
        )
    }

    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {}", self.issue(), message),
            None => self.issue().to_string(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Events
// ════════════════════════════════════════════════════════════════════════════════

/// Webhook envelope.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PayPalWebhookEvent {
    /// `WH-...`
    pub id: String,

    pub event_type: String,

    pub resource_type: Option<String>,

    #[serde(default)]
    pub resource: Value,

    pub create_time: Option<String>,

    pub summary: Option<String>,
}

/// The PayPal events the payment lifecycle acts on.
#[derive(Debug, Clone)]
pub enum PayPalEvent {
    CaptureCompleted(PayPalCapture),
    CaptureDenied(PayPalCapture),
    CapturePending(PayPalCapture),
    OrderVoided(PayPalOrder),
    CaptureRefunded(PayPalRefund),
    CaptureReversed(PayPalRefund),
    DisputeCreated(PayPalDispute),
    Unhandled { event_type: String, raw: Value },
}

impl PayPalEvent {
    pub fn from_envelope(event: &PayPalWebhookEvent) -> Result<Self, serde_json::Error> {
        let resource = || event.resource.clone();
        Ok(match event.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => {
                PayPalEvent::CaptureCompleted(serde_json::from_value(resource())?)
            }
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => {
                PayPalEvent::CaptureDenied(serde_json::from_value(resource())?)
            }
            "PAYMENT.CAPTURE.PENDING" => {
                PayPalEvent::CapturePending(serde_json::from_value(resource())?)
            }
            "CHECKOUT.ORDER.VOIDED" => PayPalEvent::OrderVoided(serde_json::from_value(resource())?),
            "PAYMENT.CAPTURE.REFUNDED" => {
                PayPalEvent::CaptureRefunded(serde_json::from_value(resource())?)
            }
            "PAYMENT.CAPTURE.REVERSED" => {
                PayPalEvent::CaptureReversed(serde_json::from_value(resource())?)
            }
            "CUSTOMER.DISPUTE.CREATED" => {
                PayPalEvent::DisputeCreated(serde_json::from_value(resource())?)
            }
            other => PayPalEvent::Unhandled {
                event_type: other.to_string(),
                raw: resource(),
            },
        })
    }

    /// Lowers the event onto a row of the transition table.
    ///
    /// Captures are looked up by their checkout order id first and by the
    /// capture id second; refunds and reversals only carry the capture id.
    pub fn into_action(self) -> WebhookAction {
        let transition = match self {
            PayPalEvent::CaptureCompleted(capture) => {
                capture_transition(TransitionTrigger::PaymentSucceeded, &capture)
            }
            PayPalEvent::CaptureDenied(capture) => {
                let reason = capture
                    .status_reason()
                    .unwrap_or_else(|| format!("capture {}", capture.status.to_lowercase()));
                capture_transition(TransitionTrigger::PaymentFailed, &capture)
                    .failure_reason(Some(reason))
            }
            PayPalEvent::CapturePending(capture) => {
                capture_transition(TransitionTrigger::ActionRequired, &capture)
            }
            PayPalEvent::OrderVoided(order) => EventTransition::new(TransitionTrigger::Voided)
                .transaction_id(order.id.clone())
                .reference(order.payment_reference())
                .failure_reason(Some("order voided".to_string())),
            PayPalEvent::CaptureRefunded(refund) => {
                let amount = refund.amount.as_ref().and_then(PayPalAmount::to_minor);
                EventTransition::new(TransitionTrigger::RefundCompleted)
                    .capture_id(refund.capture_id())
                    .reference(refund.custom_id.as_deref())
                    .refund(Some(refund.id.clone()), amount)
            }
            PayPalEvent::CaptureReversed(reversal) => {
                EventTransition::new(TransitionTrigger::DisputeCreated)
                    .capture_id(reversal.capture_id())
                    .reference(reversal.custom_id.as_deref())
                    .failure_reason(Some(format!("capture reversed ({})", reversal.id)))
            }
            PayPalEvent::DisputeCreated(dispute) => {
                let disputed = dispute.disputed_transactions.first();
                EventTransition::new(TransitionTrigger::DisputeCreated)
                    .capture_id(disputed.and_then(|t| t.seller_transaction_id.clone()))
                    .reference(disputed.and_then(|t| t.custom.as_deref()))
                    .failure_reason(Some(format!(
                        "dispute {}: {}",
                        dispute.dispute_id, dispute.reason
                    )))
            }
            PayPalEvent::Unhandled { .. } => return WebhookAction::Unhandled,
        };
        WebhookAction::Apply(transition)
    }
}

fn capture_transition(trigger: TransitionTrigger, capture: &PayPalCapture) -> EventTransition {
    let mut transition = EventTransition::new(trigger)
        .capture_id(Some(capture.id.clone()))
        .reference(capture.custom_id.as_deref());
    transition.transaction_id = capture.order_id();
    transition
}

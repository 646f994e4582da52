//! Stripe payment gateway.
//!
//! PaymentIntents are created and, when a payment method is supplied,
//! confirmed in the same call. Card declines come back as HTTP 402 with the
//! failed intent embedded; those are reported as `ChargeOutcome::Declined`.
//!
//! # Security
//!
//! - HMAC-SHA256 webhook signatures compared in constant time
//! - Signed timestamps older than five minutes are rejected
//! - Secrets held in `secrecy::SecretString`

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::domain::foundation::PaymentId;
use crate::domain::payment::{GatewayEvent, PaymentMethod, WebhookAction};
use crate::ports::{
    CaptureRequest, ChargeOutcome, GatewayError, InitiatePaymentRequest, PaymentGateway,
    RefundOutcome, RefundRequest, VoidReason, VoidRequest, WebhookRequest,
};

use super::webhook_types::{
    hex_encode, SignatureHeader, StripeErrorResponse, StripeEvent, StripeList,
    StripePaymentIntent, StripeRefund, StripeWebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

/// Default freshness window for signed webhook timestamps.
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps.
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

const SIGNATURE_HEADER: &str = "stripe-signature";

/// Refund reasons Stripe accepts verbatim.
const STRIPE_REFUND_REASONS: [&str; 3] = ["duplicate", "fraudulent", "requested_by_customer"];

/// Stripe credentials and endpoint settings.
#[derive(Clone)]
pub struct StripeConfig {
    /// `sk_live_...` or `sk_test_...`
    api_key: SecretString,

    /// `whsec_...`
    webhook_secret: SecretString,

    api_base_url: String,

    /// Bound on every outbound call.
    timeout: Duration,

    /// Accepted age of a signed webhook timestamp.
    webhook_tolerance_secs: i64,
}

impl StripeConfig {
    pub fn new(api_key: SecretString, webhook_secret: SecretString) -> Self {
        Self {
            api_key,
            webhook_secret,
            api_base_url: "https://api.stripe.com".to_string(),
            timeout: Duration::from_secs(30),
            webhook_tolerance_secs: DEFAULT_WEBHOOK_TOLERANCE_SECS,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_webhook_tolerance(mut self, secs: i64) -> Self {
        self.webhook_tolerance_secs = secs;
        self
    }

    /// Live keys only accept live events and test keys only test events.
    pub fn is_live_mode(&self) -> bool {
        self.api_key.expose_secret().starts_with("sk_live_")
    }
}

pub struct StripeGateway {
    config: StripeConfig,
    http_client: reqwest::Client,
}

/// A decoded Stripe reply: either the expected object or a card error.
enum StripeReply<T> {
    Ok { object: T, raw: Value },
    CardError { error: StripeErrorResponse, raw: Value },
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .post(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .get(self.url(path))
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
    }

    /// Sends a request and decodes the body.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<StripeReply<T>, GatewayError> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "Stripe request failed");
            GatewayError::from_transport(&e)
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::from_transport(&e))?;

        if status.is_success() {
            let raw: Value = serde_json::from_str(&body).map_err(|e| {
                GatewayError::provider(format!("Failed to parse Stripe response: {}", e))
            })?;
            let object = serde_json::from_value(raw.clone()).map_err(|e| {
                GatewayError::provider(format!("Unexpected Stripe {} response: {}", operation, e))
            })?;
            return Ok(StripeReply::Ok { object, raw });
        }

        let parsed: Option<StripeErrorResponse> = serde_json::from_str(&body).ok();
        if let Some(error) = parsed {
            if status.as_u16() == 402 || error.error.is_card_error() {
                let raw = serde_json::from_str(&body).unwrap_or(Value::Null);
                return Ok(StripeReply::CardError { error, raw });
            }
            tracing::error!(operation, status = status.as_u16(), error = %body, "Stripe API error");
            let mut err = GatewayError::from_status(status.as_u16(), "Stripe", &body);
            if let Some(code) = error.error.code {
                err = err.with_provider_code(code);
            }
            return Err(err);
        }

        tracing::error!(operation, status = status.as_u16(), error = %body, "Stripe API error");
        Err(GatewayError::from_status(status.as_u16(), "Stripe", &body))
    }

    async fn intent_call(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<ChargeOutcome, GatewayError> {
        match self.execute::<StripePaymentIntent>(request, operation).await? {
            StripeReply::Ok { object, raw } => Ok(outcome_from_intent(&object, raw)),
            StripeReply::CardError { error, raw } => Ok(ChargeOutcome::Declined {
                transaction_id: error.error.payment_intent.as_ref().map(|pi| pi.id.clone()),
                reason: error.error.describe(),
                raw,
            }),
        }
    }

    /// Checks the signed timestamp and compares signatures in constant time.
    fn verify_signature(&self, payload: &[u8], header: &SignatureHeader) -> Result<(), GatewayError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - header.timestamp;

        if age > self.config.webhook_tolerance_secs {
            tracing::warn!(
                event_timestamp = header.timestamp,
                age_secs = age,
                "Stripe webhook too old, possible replay"
            );
            return Err(GatewayError::stale_webhook(format!(
                "Event too old ({} seconds)",
                age
            )));
        }
        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                "Stripe webhook timestamp in the future"
            );
            return Err(GatewayError::stale_webhook("Event timestamp in future"));
        }

        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.expose_secret().as_bytes())
            .map_err(|e| GatewayError::invalid_webhook(format!("Unusable webhook secret: {}", e)))?;
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();
        let expected: &[u8] = expected.as_slice();

        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| expected.ct_eq(candidate.as_slice()).unwrap_u8() == 1);

        if !matched {
            tracing::warn!(
                provided = header.v1_signatures.len(),
                first = %header.v1_signatures.first().map(|s| hex_encode(s)).unwrap_or_default(),
                "Invalid Stripe webhook signature"
            );
            return Err(GatewayError::invalid_webhook("Invalid signature"));
        }
        Ok(())
    }

    /// Lowers an authenticated payload.
    ///
    /// Only a livemode mismatch is an error here. A body that cannot be read
    /// after its signature checked out is still Stripe's, so it is passed on
    /// as unhandled and acknowledged.
    fn parse_event(&self, payload: &[u8]) -> Result<GatewayEvent, GatewayError> {
        let raw: Value = match serde_json::from_slice(payload) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Signed Stripe webhook is not JSON, ignoring");
                return Ok(GatewayEvent::unreadable(
                    PaymentMethod::Stripe,
                    Value::Null,
                    "id",
                    "type",
                ));
            }
        };
        let envelope: StripeWebhookEvent = match serde_json::from_value(raw.clone()) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Unreadable Stripe event envelope, ignoring");
                return Ok(GatewayEvent::unreadable(PaymentMethod::Stripe, raw, "id", "type"));
            }
        };

        if envelope.livemode != self.config.is_live_mode() {
            tracing::warn!(
                event_id = %envelope.id,
                livemode = envelope.livemode,
                "Stripe event mode does not match API key mode"
            );
            return Err(GatewayError::invalid_webhook(
                "Event livemode does not match configured key",
            ));
        }

        let action = match StripeEvent::from_envelope(&envelope) {
            Ok(event) => event.into_action(),
            Err(e) => {
                tracing::warn!(
                    event_id = %envelope.id,
                    event_type = %envelope.event_type,
                    error = %e,
                    "Unreadable Stripe event object, ignoring"
                );
                WebhookAction::Unhandled
            }
        };

        Ok(GatewayEvent {
            event_id: envelope.id.clone(),
            event_type: envelope.event_type.clone(),
            method: PaymentMethod::Stripe,
            action,
            payload: envelope.data.object,
        })
    }
}

/// Maps a PaymentIntent status onto a charge outcome.
pub(crate) fn outcome_from_intent(intent: &StripePaymentIntent, raw: Value) -> ChargeOutcome {
    match intent.status.as_str() {
        "succeeded" => ChargeOutcome::Succeeded {
            transaction_id: intent.id.clone(),
            capture_id: intent.latest_charge.clone(),
            raw,
        },
        "canceled" => ChargeOutcome::Declined {
            transaction_id: Some(intent.id.clone()),
            reason: intent
                .cancellation_reason
                .clone()
                .unwrap_or_else(|| "canceled".to_string()),
            raw,
        },
        // A confirmation attempt that failed leaves the intent waiting for a new method.
        "requires_payment_method" if intent.last_payment_error.is_some() => {
            ChargeOutcome::Declined {
                transaction_id: Some(intent.id.clone()),
                reason: intent.failure_reason().unwrap_or_else(|| "payment_failed".to_string()),
                raw,
            }
        }
        _ => ChargeOutcome::ActionRequired {
            transaction_id: intent.id.clone(),
            approval_url: intent.redirect_url(),
            raw,
        },
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn initiate(&self, request: InitiatePaymentRequest) -> Result<ChargeOutcome, GatewayError> {
        let mut params: Vec<(&str, String)> = vec![
            ("amount", request.amount.amount_minor.to_string()),
            ("currency", request.amount.currency.to_lowercase()),
            ("metadata[payment_id]", request.payment_id.to_string()),
            ("metadata[order_id]", request.order_id.to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];

        if let Some(payment_method) = &request.payment_method_ref {
            params.push(("payment_method", payment_method.clone()));
            params.push(("confirm", "true".to_string()));
            match &request.return_url {
                Some(return_url) => params.push(("return_url", return_url.clone())),
                None => params.push((
                    "automatic_payment_methods[allow_redirects]",
                    "never".to_string(),
                )),
            }
        }

        let http_request = self
            .post("/v1/payment_intents")
            .header("Idempotency-Key", request.idempotency_key())
            .form(&params);

        let outcome = self.intent_call(http_request, "create_payment_intent").await?;
        tracing::info!(
            payment_id = %request.payment_id,
            transaction_id = outcome.transaction_id().unwrap_or("-"),
            confirmed = request.payment_method_ref.is_some(),
            "Stripe PaymentIntent created"
        );
        Ok(outcome)
    }

    async fn capture(&self, request: CaptureRequest) -> Result<ChargeOutcome, GatewayError> {
        let path = format!("/v1/payment_intents/{}/capture", request.transaction_id);
        let http_request = self
            .post(&path)
            .header("Idempotency-Key", format!("capture-{}", request.payment_id));
        self.intent_call(http_request, "capture_payment_intent").await
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        let mut params: Vec<(&str, String)> = vec![
            ("payment_intent", request.transaction_id.clone()),
            ("metadata[payment_id]", request.payment_id.to_string()),
        ];
        if let Some(amount) = &request.amount {
            params.push(("amount", amount.amount_minor.to_string()));
        }
        if STRIPE_REFUND_REASONS.contains(&request.reason.as_str()) {
            params.push(("reason", request.reason.clone()));
        } else {
            params.push(("metadata[reason]", request.reason.clone()));
        }

        let http_request = self
            .post("/v1/refunds")
            .header("Idempotency-Key", request.idempotency_key())
            .form(&params);

        match self.execute::<StripeRefund>(http_request, "create_refund").await? {
            StripeReply::Ok { object, raw } => match object.status.as_str() {
                "failed" | "canceled" => Ok(RefundOutcome::Declined {
                    reason: object
                        .failure_reason
                        .unwrap_or_else(|| format!("refund {}", object.status)),
                    raw,
                }),
                _ => Ok(RefundOutcome::Succeeded {
                    refund_id: object.id,
                    status: object.status,
                    raw,
                }),
            },
            StripeReply::CardError { error, raw } => Ok(RefundOutcome::Declined {
                reason: error.error.describe(),
                raw,
            }),
        }
    }

    async fn retrieve(&self, transaction_id: &str) -> Result<ChargeOutcome, GatewayError> {
        let http_request = self.get(&format!("/v1/payment_intents/{}", transaction_id));
        self.intent_call(http_request, "retrieve_payment_intent").await
    }

    /// Searches intents by the `metadata[payment_id]` set at creation.
    ///
    /// Search results lag writes by up to a minute, which is far shorter than
    /// the sweep's stale window.
    async fn find_by_reference(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<ChargeOutcome>, GatewayError> {
        let query = format!("metadata['payment_id']:'{}'", payment_id);
        let http_request = self
            .get("/v1/payment_intents/search")
            .query(&[("query", query.as_str()), ("limit", "1")]);

        match self
            .execute::<StripeList<Value>>(http_request, "search_payment_intents")
            .await?
        {
            StripeReply::Ok { object, .. } => {
                let Some(raw) = object.data.into_iter().next() else {
                    return Ok(None);
                };
                let intent: StripePaymentIntent = serde_json::from_value(raw.clone())
                    .map_err(|e| GatewayError::provider(format!("Unexpected search result: {}", e)))?;
                Ok(Some(outcome_from_intent(&intent, raw)))
            }
            StripeReply::CardError { error, .. } => {
                Err(GatewayError::provider(error.error.describe()))
            }
        }
    }

    async fn void(&self, request: VoidRequest) -> Result<Value, GatewayError> {
        let reason = match request.reason {
            VoidReason::Abandoned => "abandoned",
            VoidReason::Superseded => "duplicate",
        };
        let path = format!("/v1/payment_intents/{}/cancel", request.transaction_id);
        let http_request = self
            .post(&path)
            .header("Idempotency-Key", request.idempotency_key())
            .form(&[("cancellation_reason", reason)]);

        match self
            .execute::<StripePaymentIntent>(http_request, "cancel_payment_intent")
            .await?
        {
            StripeReply::Ok { object, raw } => {
                tracing::info!(
                    payment_id = %request.payment_id,
                    transaction_id = %object.id,
                    reason,
                    "Stripe PaymentIntent canceled"
                );
                Ok(raw)
            }
            StripeReply::CardError { error, .. } => {
                Err(GatewayError::invalid_request(error.error.describe()))
            }
        }
    }

    async fn verify_webhook(&self, request: &WebhookRequest) -> Result<GatewayEvent, GatewayError> {
        let signature = request
            .header(SIGNATURE_HEADER)
            .ok_or_else(|| GatewayError::missing_signature("Stripe-Signature"))?;

        let header = SignatureHeader::parse(signature).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Stripe-Signature header");
            GatewayError::malformed_webhook(e.to_string())
        })?;

        self.verify_signature(&request.body, &header)?;
        let event = self.parse_event(&request.body)?;

        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            "Stripe webhook signature verified"
        );
        Ok(event)
    }
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base_url", &self.config.api_base_url)
            .field("live_mode", &self.config.is_live_mode())
            .finish()
    }
}

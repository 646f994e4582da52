//! PayPal payment gateway.
//!
//! Two-phase flow: `initiate` creates a checkout order the payer approves on
//! PayPal, `capture` settles it afterwards. Webhook authenticity cannot be
//! checked locally, so every webhook costs a call to PayPal's
//! verify-webhook-signature endpoint.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::domain::foundation::PaymentId;
use crate::domain::payment::{GatewayEvent, PaymentMethod, WebhookAction};
use crate::ports::{
    CaptureRequest, ChargeOutcome, GatewayError, GatewayErrorCode, InitiatePaymentRequest,
    PaymentGateway, RefundOutcome, RefundRequest, VoidRequest, WebhookRequest,
};

use super::webhook_types::{
    PayPalAccessToken, PayPalAmount, PayPalErrorResponse, PayPalEvent, PayPalOrder, PayPalRefund,
    PayPalWebhookEvent, VerifySignatureRequest, VerifySignatureResponse,
};

/// Tokens are refreshed this long before PayPal says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const HEADER_AUTH_ALGO: &str = "paypal-auth-algo";
const HEADER_CERT_URL: &str = "paypal-cert-url";
const HEADER_TRANSMISSION_ID: &str = "paypal-transmission-id";
const HEADER_TRANSMISSION_SIG: &str = "paypal-transmission-sig";
const HEADER_TRANSMISSION_TIME: &str = "paypal-transmission-time";

/// PayPal REST credentials and endpoint settings.
#[derive(Clone)]
pub struct PayPalConfig {
    client_id: String,
    client_secret: SecretString,
    /// Id of the webhook registered in the PayPal dashboard.
    webhook_id: String,
    api_base_url: String,
    timeout: Duration,
}

impl PayPalConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        webhook_id: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            webhook_id: webhook_id.into(),
            api_base_url: "https://api-m.sandbox.paypal.com".to_string(),
            timeout: Duration::from_secs(30),
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
}

struct CachedToken {
    token: SecretString,
    refresh_at: Instant,
}

impl CachedToken {
    fn new(token: PayPalAccessToken) -> Self {
        let lifetime = Duration::from_secs(token.expires_in.max(0) as u64);
        Self {
            token: SecretString::new(token.access_token),
            refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
        }
    }

    fn is_fresh(&self) -> bool {
        Instant::now() < self.refresh_at
    }
}

pub struct PayPalGateway {
    config: PayPalConfig,
    http_client: reqwest::Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

enum PayPalReply<T> {
    Ok { object: T, raw: Value },
    Declined { error: PayPalErrorResponse, raw: Value },
}

impl PayPalGateway {
    pub fn new(config: PayPalConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::provider(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            http_client,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    async fn fetch_token(&self) -> Result<PayPalAccessToken, GatewayError> {
        let response = self
            .http_client
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(self.config.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "PayPal token request failed");
                GatewayError::from_transport(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), "PayPal token request rejected");
            return Err(GatewayError::from_status(status.as_u16(), "PayPal", &body));
        }

        response
            .json::<PayPalAccessToken>()
            .await
            .map_err(|e| GatewayError::provider(format!("Failed to parse PayPal token: {}", e)))
    }

    /// Access token, from cache while it is fresh.
    async fn access_token(&self) -> Result<String, GatewayError> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_fresh() {
                    return Ok(cached.token.expose_secret().clone());
                }
            }
        }

        let token = self.fetch_token().await?;
        tracing::debug!(expires_in = token.expires_in, "Fetched PayPal access token");
        let cached = CachedToken::new(token);
        let value = cached.token.expose_secret().clone();
        *self.token_cache.write().await = Some(cached);
        Ok(value)
    }

    async fn post_json(
        &self,
        path: &str,
        request_id: Option<String>,
        body: &Value,
    ) -> Result<reqwest::RequestBuilder, GatewayError> {
        let token = self.access_token().await?;
        let mut request = self
            .http_client
            .post(self.url(path))
            .bearer_auth(token)
            .header("Prefer", "return=representation")
            .json(body);
        if let Some(id) = request_id {
            request = request.header("PayPal-Request-Id", id);
        }
        Ok(request)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<PayPalReply<T>, GatewayError> {
        let response = request.send().await.map_err(|e| {
            tracing::warn!(operation, error = %e, "PayPal request failed");
            GatewayError::from_transport(&e)
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::from_transport(&e))?;

        if status.is_success() {
            let raw: Value = serde_json::from_str(&body).map_err(|e| {
                GatewayError::provider(format!("Failed to parse PayPal response: {}", e))
            })?;
            let object = serde_json::from_value(raw.clone()).map_err(|e| {
                GatewayError::provider(format!("Unexpected PayPal {} response: {}", operation, e))
            })?;
            return Ok(PayPalReply::Ok { object, raw });
        }

        if status.as_u16() == 401 {
            // Token revoked early; the next call fetches a new one.
            *self.token_cache.write().await = None;
        }

        let parsed: Option<PayPalErrorResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(error) if status.as_u16() == 422 && error.is_decline() => {
                let raw = serde_json::from_str(&body).unwrap_or(Value::Null);
                Ok(PayPalReply::Declined { error, raw })
            }
            Some(error) => {
                tracing::error!(
                    operation,
                    status = status.as_u16(),
                    issue = error.issue(),
                    "PayPal API error"
                );
                Err(GatewayError::from_status(status.as_u16(), "PayPal", &body)
                    .with_provider_code(error.issue()))
            }
            None => {
                tracing::error!(operation, status = status.as_u16(), error = %body, "PayPal API error");
                Err(GatewayError::from_status(status.as_u16(), "PayPal", &body))
            }
        }
    }

    async fn order_call(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<ChargeOutcome, GatewayError> {
        match self.execute::<PayPalOrder>(request, operation).await? {
            PayPalReply::Ok { object, raw } => Ok(outcome_from_order(&object, raw)),
            PayPalReply::Declined { error, raw } => Ok(ChargeOutcome::Declined {
                transaction_id: None,
                reason: error.describe(),
                raw,
            }),
        }
    }

    /// Asks PayPal whether the transmission headers match the body.
    async fn verify_transmission(
        &self,
        request: &WebhookRequest,
        event: &Value,
    ) -> Result<(), GatewayError> {
        let header = |name: &'static str| {
            request
                .header(name)
                .ok_or_else(|| GatewayError::missing_signature(name))
        };

        let body = VerifySignatureRequest {
            auth_algo: header(HEADER_AUTH_ALGO)?,
            cert_url: header(HEADER_CERT_URL)?,
            transmission_id: header(HEADER_TRANSMISSION_ID)?,
            transmission_sig: header(HEADER_TRANSMISSION_SIG)?,
            transmission_time: header(HEADER_TRANSMISSION_TIME)?,
            webhook_id: &self.config.webhook_id,
            webhook_event: event,
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| GatewayError::malformed_webhook(e.to_string()))?;

        let http_request = self
            .post_json("/v1/notifications/verify-webhook-signature", None, &body)
            .await?;

        let verdict = match self
            .execute::<VerifySignatureResponse>(http_request, "verify_webhook_signature")
            .await
        {
            Ok(PayPalReply::Ok { object, .. }) => object,
            Ok(PayPalReply::Declined { error, .. }) => {
                return Err(GatewayError::invalid_webhook(error.describe()))
            }
            // PayPal refusing the verification request itself means the headers are bogus.
            Err(e) if e.code == GatewayErrorCode::InvalidRequest => {
                return Err(GatewayError::invalid_webhook(e.message))
            }
            Err(e) => return Err(e),
        };

        if !verdict.is_success() {
            tracing::warn!(
                transmission_id = request.header(HEADER_TRANSMISSION_ID).unwrap_or("-"),
                status = %verdict.verification_status,
                "PayPal webhook signature rejected"
            );
            return Err(GatewayError::invalid_webhook("Invalid signature"));
        }
        Ok(())
    }
}

/// Maps a checkout order onto a charge outcome.
pub(crate) fn outcome_from_order(order: &PayPalOrder, raw: Value) -> ChargeOutcome {
    if let Some(capture) = order.capture() {
        if capture.is_completed() {
            return ChargeOutcome::Succeeded {
                transaction_id: order.id.clone(),
                capture_id: Some(capture.id.clone()),
                raw,
            };
        }
        if capture.is_pending() {
            return ChargeOutcome::ActionRequired {
                transaction_id: order.id.clone(),
                approval_url: None,
                raw,
            };
        }
        return ChargeOutcome::Declined {
            transaction_id: Some(order.id.clone()),
            reason: capture
                .status_reason()
                .unwrap_or_else(|| format!("capture {}", capture.status.to_lowercase())),
            raw,
        };
    }

    match order.status.as_str() {
        "VOIDED" => ChargeOutcome::Declined {
            transaction_id: Some(order.id.clone()),
            reason: "order voided".to_string(),
            raw,
        },
        // CREATED, SAVED, APPROVED, PAYER_ACTION_REQUIRED: waiting on the payer or on us.
        _ => ChargeOutcome::ActionRequired {
            transaction_id: order.id.clone(),
            approval_url: order.approval_url(),
            raw,
        },
    }
}

/// Lowers a transmission PayPal has already vouched for.
///
/// Anything unreadable past that point is acknowledged as unhandled.
fn lower_verified_event(event_json: Value) -> GatewayEvent {
    let envelope: PayPalWebhookEvent = match serde_json::from_value(event_json.clone()) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "Unreadable PayPal webhook envelope, ignoring");
            return GatewayEvent::unreadable(PaymentMethod::PayPal, event_json, "id", "event_type");
        }
    };

    let action = match PayPalEvent::from_envelope(&envelope) {
        Ok(event) => event.into_action(),
        Err(e) => {
            tracing::warn!(
                event_id = %envelope.id,
                event_type = %envelope.event_type,
                error = %e,
                "Unreadable PayPal webhook resource, ignoring"
            );
            WebhookAction::Unhandled
        }
    };

    GatewayEvent {
        event_id: envelope.id,
        event_type: envelope.event_type,
        method: PaymentMethod::PayPal,
        action,
        payload: envelope.resource,
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayPal
    }

    async fn initiate(&self, request: InitiatePaymentRequest) -> Result<ChargeOutcome, GatewayError> {
        let mut application_context = json!({ "user_action": "PAY_NOW" });
        if let Some(url) = &request.return_url {
            application_context["return_url"] = json!(url);
        }
        if let Some(url) = &request.cancel_url {
            application_context["cancel_url"] = json!(url);
        }

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.order_id.to_string(),
                "custom_id": request.payment_id.to_string(),
                "amount": PayPalAmount::from_money(&request.amount),
            }],
            "application_context": application_context,
        });

        let http_request = self
            .post_json("/v2/checkout/orders", Some(request.idempotency_key()), &body)
            .await?;
        let outcome = self.order_call(http_request, "create_order").await?;

        tracing::info!(
            payment_id = %request.payment_id,
            transaction_id = outcome.transaction_id().unwrap_or("-"),
            "PayPal order created"
        );
        Ok(outcome)
    }

    async fn capture(&self, request: CaptureRequest) -> Result<ChargeOutcome, GatewayError> {
        let path = format!("/v2/checkout/orders/{}/capture", request.transaction_id);
        let http_request = self
            .post_json(&path, Some(format!("capture-{}", request.payment_id)), &json!({}))
            .await?;
        let outcome = self.order_call(http_request, "capture_order").await?;

        // A decline body does not echo the order id back.
        Ok(match outcome {
            ChargeOutcome::Declined {
                transaction_id: None,
                reason,
                raw,
            } => ChargeOutcome::Declined {
                transaction_id: Some(request.transaction_id),
                reason,
                raw,
            },
            other => other,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        let capture_id = request.capture_id.as_deref().ok_or_else(|| {
            GatewayError::invalid_request("PayPal refunds require a capture id")
        })?;

        let mut body = json!({
            "custom_id": request.payment_id.to_string(),
            "note_to_payer": request.reason,
        });
        if let Some(amount) = &request.amount {
            body["amount"] = json!(PayPalAmount::from_money(amount));
        }

        let path = format!("/v2/payments/captures/{}/refund", capture_id);
        let http_request = self
            .post_json(&path, Some(request.idempotency_key()), &body)
            .await?;

        match self.execute::<PayPalRefund>(http_request, "refund_capture").await? {
            PayPalReply::Ok { object, raw } => match object.status.as_str() {
                "COMPLETED" | "PENDING" => Ok(RefundOutcome::Succeeded {
                    refund_id: object.id,
                    status: object.status,
                    raw,
                }),
                _ => Ok(RefundOutcome::Declined {
                    reason: object
                        .status_details
                        .and_then(|d| d.reason)
                        .unwrap_or_else(|| format!("refund {}", object.status.to_lowercase())),
                    raw,
                }),
            },
            PayPalReply::Declined { error, raw } => Ok(RefundOutcome::Declined {
                reason: error.describe(),
                raw,
            }),
        }
    }

    async fn retrieve(&self, transaction_id: &str) -> Result<ChargeOutcome, GatewayError> {
        let token = self.access_token().await?;
        let http_request = self
            .http_client
            .get(self.url(&format!("/v2/checkout/orders/{}", transaction_id)))
            .bearer_auth(token);
        self.order_call(http_request, "get_order").await
    }

    /// Always `None`. Orders are created with intent CAPTURE, so an order we
    /// never learned about cannot have moved funds without our capture call.
    async fn find_by_reference(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<ChargeOutcome>, GatewayError> {
        tracing::debug!(%payment_id, "PayPal has no reference search; nothing captured");
        Ok(None)
    }

    /// Uncaptured checkout orders cannot be voided through the API. They take
    /// no funds without our capture and expire on their own.
    async fn void(&self, request: VoidRequest) -> Result<Value, GatewayError> {
        tracing::info!(
            payment_id = %request.payment_id,
            transaction_id = %request.transaction_id,
            reason = request.reason.as_str(),
            "PayPal order left to expire uncaptured"
        );
        Ok(json!({
            "id": request.transaction_id,
            "status": "NOT_CAPTURED",
            "reason": request.reason.as_str(),
        }))
    }

    async fn verify_webhook(&self, request: &WebhookRequest) -> Result<GatewayEvent, GatewayError> {
        let event_json: Value = serde_json::from_slice(&request.body).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse PayPal webhook payload");
            GatewayError::malformed_webhook(format!("Invalid JSON: {}", e))
        })?;

        self.verify_transmission(request, &event_json).await?;
        let event = lower_verified_event(event_json);

        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            "PayPal webhook verified"
        );
        Ok(event)
    }
}

impl std::fmt::Debug for PayPalGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayPalGateway")
            .field("api_base_url", &self.config.api_base_url)
            .field("client_id", &self.config.client_id)
            .finish()
    }
}

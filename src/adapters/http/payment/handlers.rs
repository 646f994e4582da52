//! HTTP handlers for payment endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::{
    CapturePaymentCommand, CapturePaymentHandler, GatewayRegistry, GetPaymentHandler,
    GetPaymentQuery, HandlePayPalWebhookCommand, HandlePayPalWebhookHandler,
    HandleStripeWebhookCommand, HandleStripeWebhookHandler, OrderStatusSynchronizer,
    PaymentNotifier, ProcessPaymentCommand, ProcessPaymentHandler, RefundPaymentCommand,
    RefundPaymentHandler, WebhookOutcome, WebhookReconciler, STRIPE_SIGNATURE_HEADER,
};
use crate::domain::foundation::{ErrorCode, OrderId, PaymentId, UserId};
use crate::domain::payment::{PaymentError, PaymentMethod, WebhookError};
use crate::ports::{OrderRepository, PaymentStore};

use super::dto::{
    ErrorResponse, PaymentResponse, ProcessPaymentRequest, RefundPaymentRequest, WebhookAck,
};

/// Header carrying the caller's identity, set by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// Cloned per request; every dependency is behind an `Arc`.
#[derive(Clone)]
pub struct PaymentAppState {
    pub store: Arc<dyn PaymentStore>,
    pub orders: Arc<dyn OrderRepository>,
    pub gateways: GatewayRegistry,
    pub sync: Arc<OrderStatusSynchronizer>,
    pub notifier: Arc<PaymentNotifier>,
}

impl PaymentAppState {
    pub fn process_payment_handler(&self) -> ProcessPaymentHandler {
        ProcessPaymentHandler::new(
            self.orders.clone(),
            self.store.clone(),
            self.gateways.clone(),
            self.sync.clone(),
            self.notifier.clone(),
        )
    }

    pub fn capture_payment_handler(&self) -> CapturePaymentHandler {
        CapturePaymentHandler::new(
            self.store.clone(),
            self.gateways.clone(),
            self.sync.clone(),
            self.notifier.clone(),
        )
    }

    pub fn refund_payment_handler(&self) -> RefundPaymentHandler {
        RefundPaymentHandler::new(
            self.store.clone(),
            self.gateways.clone(),
            self.sync.clone(),
            self.notifier.clone(),
        )
    }

    pub fn get_payment_handler(&self) -> GetPaymentHandler {
        GetPaymentHandler::new(self.store.clone())
    }

    /// `None` when the provider is not configured.
    pub fn webhook_reconciler(&self, method: PaymentMethod) -> Option<Arc<WebhookReconciler>> {
        let gateway = self.gateways.get(method).ok()?;
        Some(Arc::new(WebhookReconciler::new(
            gateway,
            self.store.clone(),
            self.sync.clone(),
            self.notifier.clone(),
        )))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated caller, taken from the `X-User-Id` header.
///
/// Authentication happens upstream; this service only scopes data by owner.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| UserId::new(s).ok())
            .ok_or(AuthenticationRequired)?;

        Ok(AuthenticatedUser { user_id })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers (GET endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// GET /payments/:payment_id - Get one of the caller's payments
pub async fn get_payment(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
    Path(payment_id): Path<String>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let handler = state.get_payment_handler();
    let query = GetPaymentQuery {
        user_id: user.user_id,
        payment_id: parse_payment_id(&payment_id)?,
    };

    let result = handler.handle(query).await?;

    Ok(Json(PaymentResponse::from(result.payment)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers (POST endpoints)
// ════════════════════════════════════════════════════════════════════════════════

/// POST /payments/process - Pay for an order
///
/// Returns 201 with the payment. A payment still awaiting the payer or a
/// webhook is returned with 202 so clients can tell it apart from a settled one.
pub async fn process_payment(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
    Json(request): Json<ProcessPaymentRequest>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let order_id: OrderId = request
        .order_id
        .parse()
        .map_err(|_| PaymentError::validation("orderId", "must be a UUID"))?;

    let handler = state.process_payment_handler();
    let cmd = ProcessPaymentCommand {
        user_id: user.user_id,
        order_id,
        method: request.method,
        payment_method_ref: request.payment_details.payment_method_id,
        return_url: request.payment_details.return_url,
        cancel_url: request.payment_details.cancel_url,
    };

    let result = handler.handle(cmd).await?;

    let status = if result.is_awaiting_confirmation() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(PaymentResponse::from(result.payment))))
}

/// POST /payments/:payment_id/capture - Capture an approved PayPal order
pub async fn capture_payment(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
    Path(payment_id): Path<String>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let handler = state.capture_payment_handler();
    let cmd = CapturePaymentCommand {
        user_id: user.user_id,
        payment_id: parse_payment_id(&payment_id)?,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(PaymentResponse::from(result.payment)))
}

/// POST /payments/:payment_id/refund - Refund a completed payment
pub async fn refund_payment(
    State(state): State<PaymentAppState>,
    user: AuthenticatedUser,
    Path(payment_id): Path<String>,
    Json(request): Json<RefundPaymentRequest>,
) -> Result<impl IntoResponse, PaymentApiError> {
    let handler = state.refund_payment_handler();
    let cmd = RefundPaymentCommand {
        user_id: user.user_id,
        payment_id: parse_payment_id(&payment_id)?,
        amount_minor: request.amount,
        reason: request.reason,
    };

    let result = handler.handle(cmd).await?;

    Ok(Json(PaymentResponse::from(result.payment)))
}

/// POST /payments/webhook/stripe - Handle Stripe webhook events
pub async fn handle_stripe_webhook(
    State(state): State<PaymentAppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let Some(reconciler) = state.webhook_reconciler(PaymentMethod::Stripe) else {
        return provider_not_configured(PaymentMethod::Stripe);
    };

    let handler = HandleStripeWebhookHandler::new(reconciler);
    let cmd = HandleStripeWebhookCommand {
        payload: body.to_vec(),
        signature: headers
            .get(STRIPE_SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    webhook_response(handler.handle(cmd).await)
}

/// POST /payments/webhook/paypal - Handle PayPal webhook events
pub async fn handle_paypal_webhook(
    State(state): State<PaymentAppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let Some(reconciler) = state.webhook_reconciler(PaymentMethod::PayPal) else {
        return provider_not_configured(PaymentMethod::PayPal);
    };

    let handler = HandlePayPalWebhookHandler::new(reconciler);
    let cmd = HandlePayPalWebhookCommand {
        payload: body.to_vec(),
        headers: transmission_headers(&headers),
    };

    webhook_response(handler.handle(cmd).await)
}

fn parse_payment_id(raw: &str) -> Result<PaymentId, PaymentError> {
    raw.parse()
        .map_err(|_| PaymentError::validation("paymentId", "must be a UUID"))
}

/// The `PAYPAL-*` headers PayPal signs a delivery with.
fn transmission_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("paypal-"))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn provider_not_configured(method: PaymentMethod) -> Response {
    let body = ErrorResponse::new(
        "PROVIDER_NOT_CONFIGURED",
        format!("{} is not configured", method),
    );
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// Authentic events are acknowledged with 200 whatever happened to them.
/// Verification failures get a bare code and no detail.
fn webhook_response(result: Result<WebhookOutcome, WebhookError>) -> Response {
    match result {
        Ok(outcome) => (StatusCode::OK, Json(WebhookAck::for_outcome(&outcome))).into_response(),
        Err(e) => {
            let status = e.status_code();
            if status.is_success() {
                (status, Json(WebhookAck::received())).into_response()
            } else {
                let body = ErrorResponse::new(
                    ErrorCode::InvalidWebhookSignature.to_string(),
                    "Webhook rejected",
                );
                (status, Json(body)).into_response()
            }
        }
    }
}

/// API error type that converts payment errors to HTTP responses.
#[derive(Debug)]
pub struct PaymentApiError(PaymentError);

impl From<PaymentError> for PaymentApiError {
    fn from(err: PaymentError) -> Self {
        Self(err)
    }
}

impl PaymentApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            PaymentError::Validation { .. } => StatusCode::BAD_REQUEST,
            PaymentError::PaymentNotFound(_) | PaymentError::OrderNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            PaymentError::OrderAlreadyPaid(_) | PaymentError::InvalidState { .. } => {
                StatusCode::CONFLICT
            }
            PaymentError::Gateway { retryable: true, .. } => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::Gateway { .. } => StatusCode::BAD_GATEWAY,
            PaymentError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PaymentApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.0.code().to_string();

        let body = match &self.0 {
            PaymentError::Validation { field, .. } => {
                ErrorResponse::with_details(code, self.0.message(), json!({ "field": field }))
            }
            PaymentError::InvalidState { current, attempted } => ErrorResponse::with_details(
                code,
                self.0.message(),
                json!({ "current_status": current, "attempted": attempted }),
            ),
            PaymentError::Gateway { retryable, .. } => ErrorResponse::with_details(
                code,
                self.0.message(),
                json!({ "retryable": retryable }),
            ),
            PaymentError::Infrastructure(msg) => {
                tracing::error!(error = %msg, "Request failed on infrastructure error");
                ErrorResponse::new(code, "An internal error occurred")
            }
            _ => ErrorResponse::new(code, self.0.message()),
        };

        (status, Json(body)).into_response()
    }
}

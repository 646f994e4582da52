//! Axum router configuration for payment endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    capture_payment, get_payment, handle_paypal_webhook, handle_stripe_webhook, process_payment,
    refund_payment, PaymentAppState,
};

/// Create the payment API router.
///
/// # Routes (require `X-User-Id`)
/// - `POST /process` - Pay for an order
/// - `GET /:payment_id` - Get payment details
/// - `POST /:payment_id/capture` - Capture an approved PayPal order
/// - `POST /:payment_id/refund` - Refund a completed payment
pub fn payment_routes() -> Router<PaymentAppState> {
    Router::new()
        .route("/process", post(process_payment))
        .route("/:payment_id", get(get_payment))
        .route("/:payment_id/capture", post(capture_payment))
        .route("/:payment_id/refund", post(refund_payment))
}

/// Create the provider webhook router.
///
/// Webhooks carry no user identity; each delivery is verified by its gateway.
pub fn webhook_routes() -> Router<PaymentAppState> {
    Router::new()
        .route("/stripe", post(handle_stripe_webhook))
        .route("/paypal", post(handle_paypal_webhook))
}

/// Create the complete payments router, mounted at `/payments`.
///
/// ```ignore
/// let app = payment_router().with_state(state);
/// ```
pub fn payment_router() -> Router<PaymentAppState> {
    Router::new().nest(
        "/payments",
        payment_routes().nest("/webhook", webhook_routes()),
    )
}

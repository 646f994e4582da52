//! Payment handlers.
//!
//! ## Commands
//! - Processing a payment for an order
//! - Capturing an approved PayPal order
//! - Refunding a completed payment
//! - Reconciling Stripe and PayPal webhooks
//! - Sweeping payments whose outcome never arrived
//!
//! ## Queries
//! - Get payment details

mod capture_payment;
mod commit;
mod get_payment;
mod handle_paypal_webhook;
mod handle_stripe_webhook;
mod process_payment;
mod reconcile_stale_payments;
mod refund_payment;
mod webhook_reconciler;

#[cfg(test)]
mod test_support;

// Commands
pub use capture_payment::{CapturePaymentCommand, CapturePaymentHandler, CapturePaymentResult};
pub use handle_paypal_webhook::{HandlePayPalWebhookCommand, HandlePayPalWebhookHandler};
pub use handle_stripe_webhook::{
    HandleStripeWebhookCommand, HandleStripeWebhookHandler, STRIPE_SIGNATURE_HEADER,
};
pub use process_payment::{ProcessPaymentCommand, ProcessPaymentHandler, ProcessPaymentResult};
pub use reconcile_stale_payments::{
    ReconcileStalePaymentsCommand, ReconcileStalePaymentsHandler, ReconcileStalePaymentsResult,
    StalePaymentPolicy,
};
pub use refund_payment::{
    RefundPaymentCommand, RefundPaymentHandler, RefundPaymentResult, DEFAULT_REFUND_REASON,
};
pub use webhook_reconciler::{WebhookOutcome, WebhookReconciler};

// Queries
pub use get_payment::{GetPaymentHandler, GetPaymentQuery, GetPaymentResult};

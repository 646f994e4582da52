//! HTTP adapter for payment endpoints.
//!
//! - `POST /payments/process` - Pay for an order
//! - `GET /payments/:payment_id` - Get payment details
//! - `POST /payments/:payment_id/capture` - Capture an approved PayPal order
//! - `POST /payments/:payment_id/refund` - Refund a completed payment
//! - `POST /payments/webhook/stripe` - Stripe webhooks
//! - `POST /payments/webhook/paypal` - PayPal webhooks

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{AuthenticatedUser, PaymentApiError, PaymentAppState, USER_ID_HEADER};
pub use routes::{payment_router, payment_routes, webhook_routes};

//! PayPal payment gateway adapter.
//!
//! Implements the `PaymentGateway` port on the Orders v2 and Payments v2 APIs
//! with OAuth2 client-credentials auth. Webhooks are verified by PayPal.

mod paypal_gateway;
mod webhook_types;

pub use paypal_gateway::{PayPalConfig, PayPalGateway};
pub use webhook_types::{PayPalAmount, PayPalEvent, PayPalOrder, PayPalWebhookEvent};

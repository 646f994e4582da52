//! Stripe payment gateway adapter.
//!
//! Implements the `PaymentGateway` port on top of PaymentIntents and Refunds,
//! and verifies `Stripe-Signature` webhooks.
//!
//! # Configuration
//!
//! - `ORDER_PAYMENTS__PAYMENT__STRIPE__API_KEY`: secret API key (`sk_...`)
//! - `ORDER_PAYMENTS__PAYMENT__STRIPE__WEBHOOK_SECRET`: signing secret (`whsec_...`)

mod stripe_gateway;
mod webhook_types;

pub use stripe_gateway::{StripeConfig, StripeGateway, DEFAULT_WEBHOOK_TOLERANCE_SECS};
pub use webhook_types::{
    SignatureHeader, SignatureParseError, StripeEvent, StripePaymentIntent, StripeWebhookEvent,
};

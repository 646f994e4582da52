//! Order payments - payment lifecycle for storefront orders.
//!
//! Charges orders through Stripe or PayPal, reconciles provider webhooks
//! into a guarded payment state machine, and keeps each order's payment
//! status in step with its payment.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

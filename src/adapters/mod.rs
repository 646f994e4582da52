//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `stripe`, `paypal` - Payment gateway clients and webhook verification
//! - `postgres` - Payment store, order projection and user lookup
//! - `memory` - In-memory stores for tests and local development
//! - `mock` - Scripted payment gateway
//! - `notifications` - Notification dispatcher sinks
//! - `http` - axum routes and handlers

pub mod http;
pub mod memory;
pub mod mock;
pub mod notifications;
pub mod paypal;
pub mod postgres;
pub mod stripe;

pub use memory::{InMemoryOrderRepository, InMemoryPaymentStore, InMemoryUserDirectory};
pub use mock::MockPaymentGateway;
pub use notifications::{RecordingNotificationDispatcher, TracingNotificationDispatcher};
pub use paypal::{PayPalConfig, PayPalGateway};
pub use postgres::{PostgresOrderRepository, PostgresPaymentStore, PostgresUserDirectory};
pub use stripe::{StripeConfig, StripeGateway};

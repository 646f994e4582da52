//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Handlers never write a payment status directly; every change goes through
//! the store's guarded transition, then the order projection and notifier.

mod gateway_registry;
pub mod handlers;
mod notifier;
mod order_sync;

pub use gateway_registry::GatewayRegistry;
pub use handlers::*;
pub use notifier::{NotificationKind, PaymentNotifier, DEFAULT_NOTIFICATION_TIMEOUT};
pub use order_sync::OrderStatusSynchronizer;

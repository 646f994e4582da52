//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Gateway Ports
//!
//! - `PaymentGateway` - Charge, capture, refund, status poll, void, webhook verification
//!
//! ## Persistence Ports
//!
//! - `PaymentStore` - Payment records and the guarded transition
//! - `OrderRepository` - Order lookup and payment-status projection
//!
//! ## Collaborator Ports
//!
//! - `NotificationDispatcher` - Payment outcome notifications
//! - `UserDirectory` - Customer contact details for notifications

mod notification_dispatcher;
mod order_repository;
mod payment_gateway;
mod payment_store;
mod user_directory;

pub use notification_dispatcher::{NotificationDispatcher, PaymentNotification};
pub use order_repository::{OrderRepository, OrderSnapshot};
pub use payment_gateway::{
    CaptureRequest, ChargeOutcome, GatewayError, GatewayErrorCode, InitiatePaymentRequest,
    PaymentGateway, RefundOutcome, RefundRequest, VoidReason, VoidRequest, WebhookRequest,
};
pub use payment_store::PaymentStore;
pub use user_directory::{UserContact, UserDirectory};

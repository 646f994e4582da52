//! Notification dispatcher port.
//!
//! Rendering and delivery (email, SMS, push) live behind this port.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::foundation::{DomainError, UserId};
use crate::domain::payment::Payment;

/// Payment plus the order and customer details a message needs.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentNotification {
    pub payment: Payment,
    pub order_number: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_payment_success(
        &self,
        user_id: &UserId,
        notification: &PaymentNotification,
    ) -> Result<(), DomainError>;

    async fn send_payment_failed(
        &self,
        user_id: &UserId,
        notification: &PaymentNotification,
    ) -> Result<(), DomainError>;

    async fn send_payment_refunded(
        &self,
        user_id: &UserId,
        notification: &PaymentNotification,
    ) -> Result<(), DomainError>;
}

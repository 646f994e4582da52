//! Notification dispatcher that writes structured log events.
//!
//! Stands in for a real email/SMS provider; a log pipeline can fan the
//! `notification` target out to one.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{NotificationDispatcher, PaymentNotification};

#[derive(Debug, Clone, Default)]
pub struct TracingNotificationDispatcher;

impl TracingNotificationDispatcher {
    pub fn new() -> Self {
        Self
    }

    fn emit(&self, kind: &'static str, user_id: &UserId, n: &PaymentNotification) {
        tracing::info!(
            target: "notification",
            kind,
            user_id = %user_id,
            payment_id = %n.payment.id,
            status = %n.payment.status,
            amount = %n.payment.amount,
            order_number = n.order_number.as_deref().unwrap_or("-"),
            customer_email = n.customer_email.as_deref().unwrap_or("-"),
            "Payment notification"
        );
    }
}

#[async_trait]
impl NotificationDispatcher for TracingNotificationDispatcher {
    async fn send_payment_success(
        &self,
        user_id: &UserId,
        notification: &PaymentNotification,
    ) -> Result<(), DomainError> {
        self.emit("payment_success", user_id, notification);
        Ok(())
    }

    async fn send_payment_failed(
        &self,
        user_id: &UserId,
        notification: &PaymentNotification,
    ) -> Result<(), DomainError> {
        self.emit("payment_failed", user_id, notification);
        Ok(())
    }

    async fn send_payment_refunded(
        &self,
        user_id: &UserId,
        notification: &PaymentNotification,
    ) -> Result<(), DomainError> {
        self.emit("payment_refunded", user_id, notification);
        Ok(())
    }
}

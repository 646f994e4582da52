//! Notification dispatcher that records what it was asked to send.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::{NotificationDispatcher, PaymentNotification};

/// A notification as received by the dispatcher.
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub kind: &'static str,
    pub user_id: UserId,
    pub notification: PaymentNotification,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingNotificationDispatcher {
    sent: Arc<Mutex<Vec<SentNotification>>>,
    fail: bool,
}

impl RecordingNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher that records every call and then fails it.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn log(&self) -> MutexGuard<'_, Vec<SentNotification>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.log().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.log().iter().map(|s| s.kind).collect()
    }

    fn record(
        &self,
        kind: &'static str,
        user_id: &UserId,
        notification: &PaymentNotification,
    ) -> Result<(), DomainError> {
        self.log().push(SentNotification {
            kind,
            user_id: user_id.clone(),
            notification: notification.clone(),
        });
        if self.fail {
            return Err(DomainError::new(
                ErrorCode::InternalError,
                "notification provider unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotificationDispatcher {
    async fn send_payment_success(
        &self,
        user_id: &UserId,
        notification: &PaymentNotification,
    ) -> Result<(), DomainError> {
        self.record("payment_success", user_id, notification)
    }

    async fn send_payment_failed(
        &self,
        user_id: &UserId,
        notification: &PaymentNotification,
    ) -> Result<(), DomainError> {
        self.record("payment_failed", user_id, notification)
    }

    async fn send_payment_refunded(
        &self,
        user_id: &UserId,
        notification: &PaymentNotification,
    ) -> Result<(), DomainError> {
        self.record("payment_refunded", user_id, notification)
    }
}

//! Payment outcome notifications.
//!
//! Notifications are best effort. Every failure, including a slow
//! dispatcher, is logged and dropped so it can never fail a payment,
//! a refund or a webhook acknowledgement.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::DomainError;
use crate::domain::payment::{Payment, PaymentStatus};
use crate::ports::{NotificationDispatcher, OrderRepository, PaymentNotification, UserDirectory};

pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Success,
    Failed,
    Refunded,
}

impl NotificationKind {
    /// Kind announced for a payment that just reached `status`.
    pub fn for_status(status: PaymentStatus) -> Option<Self> {
        match status {
            PaymentStatus::Completed => Some(NotificationKind::Success),
            PaymentStatus::Failed => Some(NotificationKind::Failed),
            PaymentStatus::Refunded => Some(NotificationKind::Refunded),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Success => "payment_success",
            NotificationKind::Failed => "payment_failed",
            NotificationKind::Refunded => "payment_refunded",
        }
    }
}

pub struct PaymentNotifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
    orders: Arc<dyn OrderRepository>,
    users: Arc<dyn UserDirectory>,
    timeout: Duration,
}

impl PaymentNotifier {
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        orders: Arc<dyn OrderRepository>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            dispatcher,
            orders,
            users,
            timeout: DEFAULT_NOTIFICATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Announces the payment's current status, if it is one we announce.
    pub async fn notify_outcome(&self, payment: &Payment) {
        if let Some(kind) = NotificationKind::for_status(payment.status) {
            self.dispatch(kind, payment).await;
        }
    }

    pub async fn dispatch(&self, kind: NotificationKind, payment: &Payment) {
        match tokio::time::timeout(self.timeout, self.send(kind, payment)).await {
            Ok(Ok(())) => {
                tracing::debug!(payment_id = %payment.id, kind = kind.as_str(), "Notification sent");
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    kind = kind.as_str(),
                    error = %e,
                    "Notification failed"
                );
            }
            Err(_) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    kind = kind.as_str(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Notification timed out"
                );
            }
        }
    }

    async fn send(&self, kind: NotificationKind, payment: &Payment) -> Result<(), DomainError> {
        let notification = self.enrich(payment).await;
        let user_id = &payment.user_id;
        match kind {
            NotificationKind::Success => {
                self.dispatcher
                    .send_payment_success(user_id, &notification)
                    .await
            }
            NotificationKind::Failed => {
                self.dispatcher
                    .send_payment_failed(user_id, &notification)
                    .await
            }
            NotificationKind::Refunded => {
                self.dispatcher
                    .send_payment_refunded(user_id, &notification)
                    .await
            }
        }
    }

    /// Missing enrichment degrades the message, it does not stop it.
    async fn enrich(&self, payment: &Payment) -> PaymentNotification {
        let order_number = match self.orders.find_by_id(&payment.order_id).await {
            Ok(order) => order.map(|o| o.order_number),
            Err(e) => {
                tracing::warn!(order_id = %payment.order_id, error = %e, "Order lookup failed");
                None
            }
        };
        let contact = match self.users.find_by_id(&payment.user_id).await {
            Ok(contact) => contact,
            Err(e) => {
                tracing::warn!(user_id = %payment.user_id, error = %e, "User lookup failed");
                None
            }
        };

        PaymentNotification {
            payment: payment.clone(),
            order_number,
            customer_name: contact.as_ref().map(|c| c.name.clone()),
            customer_email: contact.map(|c| c.email),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryOrderRepository, InMemoryUserDirectory};
    use crate::adapters::notifications::RecordingNotificationDispatcher;
    use crate::domain::foundation::{OrderId, UserId};
    use crate::domain::payment::{Currency, Money, OrderPaymentStatus, PaymentMethod};
    use crate::ports::{OrderSnapshot, UserContact};
    use async_trait::async_trait;

    fn payment(order_id: OrderId) -> Payment {
        Payment::start(
            order_id,
            UserId::new("user-1").unwrap(),
            Money::new(2_500, Currency::new("USD").unwrap()).unwrap(),
            PaymentMethod::Stripe,
        )
    }

    struct SlowDispatcher;

    #[async_trait]
    impl NotificationDispatcher for SlowDispatcher {
        async fn send_payment_success(
            &self,
            _user_id: &UserId,
            _notification: &PaymentNotification,
        ) -> Result<(), DomainError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }

        async fn send_payment_failed(
            &self,
            _user_id: &UserId,
            _notification: &PaymentNotification,
        ) -> Result<(), DomainError> {
            Ok(())
        }

        async fn send_payment_refunded(
            &self,
            _user_id: &UserId,
            _notification: &PaymentNotification,
        ) -> Result<(), DomainError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn enriches_with_order_number_and_contact() {
        let orders = InMemoryOrderRepository::new();
        let users = InMemoryUserDirectory::new();
        let dispatcher = RecordingNotificationDispatcher::new();
        let mut p = payment(OrderId::new());
        p.status = PaymentStatus::Completed;

        orders
            .insert(OrderSnapshot {
                id: p.order_id,
                user_id: p.user_id.clone(),
                order_number: "ORD-42".to_string(),
                total: p.amount.clone(),
                payment_status: OrderPaymentStatus::Pending,
            })
            .await;
        users
            .insert(
                p.user_id.clone(),
                UserContact {
                    name: "Ada".to_string(),
                    email: "ada@example.com".to_string(),
                },
            )
            .await;

        let notifier = PaymentNotifier::new(
            Arc::new(dispatcher.clone()),
            Arc::new(orders),
            Arc::new(users),
        );
        notifier.notify_outcome(&p).await;

        let sent = dispatcher.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, "payment_success");
        assert_eq!(sent[0].notification.order_number.as_deref(), Some("ORD-42"));
        assert_eq!(
            sent[0].notification.customer_email.as_deref(),
            Some("ada@example.com")
        );
    }

    #[tokio::test]
    async fn missing_collaborator_data_still_sends() {
        let dispatcher = RecordingNotificationDispatcher::new();
        let notifier = PaymentNotifier::new(
            Arc::new(dispatcher.clone()),
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryUserDirectory::new()),
        );

        notifier
            .dispatch(NotificationKind::Failed, &payment(OrderId::new()))
            .await;

        let sent = dispatcher.sent();
        assert_eq!(sent[0].kind, "payment_failed");
        assert!(sent[0].notification.order_number.is_none());
        assert!(sent[0].notification.customer_name.is_none());
    }

    #[tokio::test]
    async fn unsettled_status_sends_nothing() {
        let dispatcher = RecordingNotificationDispatcher::new();
        let notifier = PaymentNotifier::new(
            Arc::new(dispatcher.clone()),
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryUserDirectory::new()),
        );
        notifier.notify_outcome(&payment(OrderId::new())).await;
        assert!(dispatcher.sent().is_empty());
    }

    #[tokio::test]
    async fn dispatcher_failure_is_swallowed() {
        let dispatcher = RecordingNotificationDispatcher::failing();
        let notifier = PaymentNotifier::new(
            Arc::new(dispatcher.clone()),
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryUserDirectory::new()),
        );
        notifier
            .dispatch(NotificationKind::Refunded, &payment(OrderId::new()))
            .await;
        assert_eq!(dispatcher.kinds(), vec!["payment_refunded"]);
    }

    #[tokio::test]
    async fn slow_dispatcher_is_cut_off() {
        let notifier = PaymentNotifier::new(
            Arc::new(SlowDispatcher),
            Arc::new(InMemoryOrderRepository::new()),
            Arc::new(InMemoryUserDirectory::new()),
        )
        .with_timeout(Duration::from_millis(50));

        let started = std::time::Instant::now();
        notifier
            .dispatch(NotificationKind::Success, &payment(OrderId::new()))
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

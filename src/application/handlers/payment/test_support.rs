//! Shared wiring for payment handler tests.

use std::sync::Arc;

use crate::adapters::memory::{InMemoryOrderRepository, InMemoryPaymentStore, InMemoryUserDirectory};
use crate::adapters::mock::MockPaymentGateway;
use crate::adapters::notifications::RecordingNotificationDispatcher;
use crate::application::{GatewayRegistry, OrderStatusSynchronizer, PaymentNotifier};
use crate::domain::foundation::{OrderId, UserId};
use crate::domain::payment::{
    Currency, Money, OrderPaymentStatus, Payment, PaymentMethod, PaymentStatus,
};
use crate::ports::{OrderSnapshot, PaymentStore, UserContact};

pub(crate) fn owner() -> UserId {
    UserId::new("user-1").unwrap()
}

pub(crate) fn stranger() -> UserId {
    UserId::new("user-2").unwrap()
}

pub(crate) fn usd(amount_minor: i64) -> Money {
    Money::new(amount_minor, Currency::new("USD").unwrap()).unwrap()
}

pub(crate) struct Harness {
    pub store: InMemoryPaymentStore,
    pub orders: InMemoryOrderRepository,
    pub users: InMemoryUserDirectory,
    pub notifications: RecordingNotificationDispatcher,
    pub stripe: MockPaymentGateway,
    pub paypal: MockPaymentGateway,
}

impl Harness {
    pub async fn new() -> Self {
        let users = InMemoryUserDirectory::new();
        users
            .insert(
                owner(),
                UserContact {
                    name: "Ada Lovelace".to_string(),
                    email: "ada@example.com".to_string(),
                },
            )
            .await;
        Self {
            store: InMemoryPaymentStore::new(),
            orders: InMemoryOrderRepository::new(),
            users,
            notifications: RecordingNotificationDispatcher::new(),
            stripe: MockPaymentGateway::new(PaymentMethod::Stripe),
            paypal: MockPaymentGateway::new(PaymentMethod::PayPal),
        }
    }

    pub fn store(&self) -> Arc<dyn PaymentStore> {
        Arc::new(self.store.clone())
    }

    pub fn registry(&self) -> GatewayRegistry {
        GatewayRegistry::new()
            .with_gateway(Arc::new(self.stripe.clone()))
            .with_gateway(Arc::new(self.paypal.clone()))
    }

    pub fn synchronizer(&self) -> Arc<OrderStatusSynchronizer> {
        Arc::new(
            OrderStatusSynchronizer::new(Arc::new(self.orders.clone()), self.store())
                .with_gateways(self.registry()),
        )
    }

    pub fn notifier(&self) -> Arc<PaymentNotifier> {
        Arc::new(PaymentNotifier::new(
            Arc::new(self.notifications.clone()),
            Arc::new(self.orders.clone()),
            Arc::new(self.users.clone()),
        ))
    }

    /// An unpaid order owned by [`owner`].
    pub async fn order(&self, total_minor: i64) -> OrderSnapshot {
        let order = OrderSnapshot {
            id: OrderId::new(),
            user_id: owner(),
            order_number: "ORD-1001".to_string(),
            total: usd(total_minor),
            payment_status: OrderPaymentStatus::Pending,
        };
        self.orders.insert(order.clone()).await;
        order
    }

    /// Stores a payment for `order` already sitting in `status`.
    pub async fn payment(
        &self,
        order: &OrderSnapshot,
        method: PaymentMethod,
        status: PaymentStatus,
        transaction_id: Option<&str>,
    ) -> Payment {
        let mut payment = Payment::start(order.id, order.user_id.clone(), order.total.clone(), method);
        payment.status = status;
        payment.transaction_id = transaction_id.map(str::to_string);
        self.store.insert(&payment).await.unwrap();
        payment
    }

    pub async fn stored(&self, payment: &Payment) -> Payment {
        self.store.find_by_id(&payment.id).await.unwrap().unwrap()
    }
}

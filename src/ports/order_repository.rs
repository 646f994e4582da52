//! Order repository port.
//!
//! Orders belong to the wider storefront. This subsystem reads what it
//! needs to start a payment and writes only the payment-status projection.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, OrderId, UserId};
use crate::domain::payment::{Money, OrderPaymentStatus};

/// The slice of an order the payment lifecycle depends on.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub user_id: UserId,
    /// Human-facing order number used in notifications.
    pub order_number: String,
    pub total: Money,
    pub payment_status: OrderPaymentStatus,
}

impl OrderSnapshot {
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.user_id == user_id
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == OrderPaymentStatus::Paid
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderSnapshot>, DomainError>;

    /// Overwrites the order's payment status.
    ///
    /// # Errors
    ///
    /// Returns `OrderNotFound` if the order does not exist.
    async fn update_payment_status(
        &self,
        id: &OrderId,
        status: OrderPaymentStatus,
    ) -> Result<(), DomainError>;
}

//! In-memory order repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId};
use crate::domain::payment::OrderPaymentStatus;
use crate::ports::{OrderRepository, OrderSnapshot};

#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    orders: Arc<RwLock<HashMap<OrderId, OrderSnapshot>>>,
    /// Every status write, in order, for assertions.
    history: Arc<RwLock<Vec<(OrderId, OrderPaymentStatus)>>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, order: OrderSnapshot) {
        self.orders.write().await.insert(order.id, order);
    }

    pub async fn payment_status(&self, id: &OrderId) -> Option<OrderPaymentStatus> {
        self.orders.read().await.get(id).map(|o| o.payment_status)
    }

    pub async fn status_writes(&self) -> Vec<(OrderId, OrderPaymentStatus)> {
        self.history.read().await.clone()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderSnapshot>, DomainError> {
        Ok(self.orders.read().await.get(id).cloned())
    }

    async fn update_payment_status(
        &self,
        id: &OrderId,
        status: OrderPaymentStatus,
    ) -> Result<(), DomainError> {
        let mut orders = self.orders.write().await;
        let order = orders.get_mut(id).ok_or_else(|| {
            DomainError::new(ErrorCode::OrderNotFound, format!("Order not found: {}", id))
                .with_detail("order_id", id.to_string())
        })?;
        order.payment_status = status;
        self.history.write().await.push((*id, status));
        Ok(())
    }
}

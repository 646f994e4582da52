//! GetPaymentHandler - Query handler for reading a payment.

use std::sync::Arc;

use crate::domain::foundation::{PaymentId, UserId};
use crate::domain::payment::{Payment, PaymentError};
use crate::ports::PaymentStore;

#[derive(Debug, Clone)]
pub struct GetPaymentQuery {
    pub user_id: UserId,
    pub payment_id: PaymentId,
}

#[derive(Debug, Clone)]
pub struct GetPaymentResult {
    pub payment: Payment,
}

/// Returns a payment to its owner. Anyone else gets `PaymentNotFound`.
pub struct GetPaymentHandler {
    store: Arc<dyn PaymentStore>,
}

impl GetPaymentHandler {
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, query: GetPaymentQuery) -> Result<GetPaymentResult, PaymentError> {
        let payment = self
            .store
            .find_by_id(&query.payment_id)
            .await?
            .filter(|p| p.user_id == query.user_id)
            .ok_or(PaymentError::PaymentNotFound(query.payment_id))?;

        Ok(GetPaymentResult { payment })
    }
}

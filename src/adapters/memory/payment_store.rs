//! In-memory payment store.
//!
//! The guarded transition runs entirely under one write lock, which gives the
//! same check-and-set atomicity as the conditional UPDATE in Postgres.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, PaymentId, Timestamp};
use crate::domain::payment::{
    effective_sources, Payment, PaymentLookup, PaymentStatus, TransitionFields, TransitionOutcome,
};
use crate::ports::PaymentStore;

#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.payments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payments.read().await.is_empty()
    }

    /// All stored payments, for test assertions.
    pub async fn all(&self) -> Vec<Payment> {
        self.payments.read().await.values().cloned().collect()
    }
}

fn matches_gateway_id(payment: &Payment, id: &str) -> bool {
    payment.transaction_id.as_deref() == Some(id) || payment.capture_id.as_deref() == Some(id)
}

fn resolve(payments: &HashMap<PaymentId, Payment>, lookup: &PaymentLookup) -> Option<PaymentId> {
    match lookup {
        PaymentLookup::Id(id) => payments.contains_key(id).then_some(*id),
        PaymentLookup::TransactionId(tx) => payments
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(tx.as_str()))
            .or_else(|| payments.values().find(|p| matches_gateway_id(p, tx)))
            .map(|p| p.id),
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&payment.id) {
            return Err(DomainError::database(format!(
                "Payment {} already exists",
                payment.id
            )));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.payments.read().await.get(id).cloned())
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let payments = self.payments.read().await;
        let lookup = PaymentLookup::TransactionId(transaction_id.to_string());
        Ok(resolve(&payments, &lookup).and_then(|id| payments.get(&id).cloned()))
    }

    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Vec<Payment>, DomainError> {
        let payments = self.payments.read().await;
        let mut for_order: Vec<Payment> = payments
            .values()
            .filter(|p| &p.order_id == order_id)
            .cloned()
            .collect();
        for_order.sort_by_key(|p| *p.created_at.as_datetime());
        Ok(for_order)
    }

    async fn apply_transition(
        &self,
        lookup: &PaymentLookup,
        expected: Option<&[PaymentStatus]>,
        new_status: PaymentStatus,
        fields: TransitionFields,
    ) -> Result<TransitionOutcome, DomainError> {
        let mut payments = self.payments.write().await;

        let id = resolve(&payments, lookup).ok_or_else(|| {
            DomainError::new(
                ErrorCode::PaymentNotFound,
                format!("Payment not found: {}", lookup),
            )
            .with_detail("lookup", lookup.to_string())
        })?;
        let current = payments
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::new(ErrorCode::PaymentNotFound, id.to_string()))?;

        if !effective_sources(expected, new_status).contains(&current.status) {
            return Ok(TransitionOutcome::Skipped(current));
        }

        if new_status == PaymentStatus::Completed {
            let already_paid = payments.values().any(|p| {
                p.id != id && p.order_id == current.order_id && p.status == PaymentStatus::Completed
            });
            if already_paid {
                return Err(DomainError::new(
                    ErrorCode::OrderAlreadyPaid,
                    format!("Order {} already has a completed payment", current.order_id),
                )
                .with_detail("order_id", current.order_id.to_string()));
            }
        }

        let mut updated = current;
        updated.apply_transition(new_status, &fields)?;
        payments.insert(id, updated.clone());
        Ok(TransitionOutcome::Applied(updated))
    }

    async fn find_stale(
        &self,
        statuses: &[PaymentStatus],
        older_than: Timestamp,
        limit: u32,
    ) -> Result<Vec<Payment>, DomainError> {
        let payments = self.payments.read().await;
        let mut stale: Vec<Payment> = payments
            .values()
            .filter(|p| statuses.contains(&p.status) && p.updated_at.is_before(&older_than))
            .cloned()
            .collect();
        stale.sort_by_key(|p| *p.updated_at.as_datetime());
        stale.truncate(limit as usize);
        Ok(stale)
    }
}

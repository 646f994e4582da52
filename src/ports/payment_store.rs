//! Payment persistence port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, OrderId, PaymentId, Timestamp};
use crate::domain::payment::{
    Payment, PaymentLookup, PaymentStatus, TransitionFields, TransitionOutcome,
};

/// Owns Payment persistence.
///
/// `apply_transition` is the only way a stored payment's status changes. It
/// must be a single atomic read-modify-write: implementations either hold an
/// exclusive lock across the check and the write, or express both as one
/// conditional statement.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists a new payment.
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError>;

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError>;

    /// Matches the gateway transaction id or, failing that, the capture id.
    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, DomainError>;

    /// Every payment recorded against an order, oldest first.
    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Vec<Payment>, DomainError>;

    /// Moves a payment to `new_status` if its current status is allowed.
    ///
    /// The allowed set is `expected` (when given) intersected with the
    /// state machine sources of `new_status`. A payment outside that set is
    /// returned unchanged as [`TransitionOutcome::Skipped`].
    ///
    /// # Errors
    ///
    /// - `PaymentNotFound` if the lookup matches nothing. A
    ///   [`PaymentLookup::TransactionId`] matches the capture id as well.
    /// - `OrderAlreadyPaid` if another payment for the same order is already COMPLETED
    /// - `DatabaseError` on storage failure
    async fn apply_transition(
        &self,
        lookup: &PaymentLookup,
        expected: Option<&[PaymentStatus]>,
        new_status: PaymentStatus,
        fields: TransitionFields,
    ) -> Result<TransitionOutcome, DomainError>;

    /// Payments in one of `statuses` not updated since `older_than`, oldest first.
    async fn find_stale(
        &self,
        statuses: &[PaymentStatus],
        older_than: Timestamp,
        limit: u32,
    ) -> Result<Vec<Payment>, DomainError>;
}

//! Keeps an order's payment status derived from its payments.
//!
//! An order can collect several payment attempts. Once one of them is
//! COMPLETED the order stays PAID: the fate of the other attempts is not
//! projected, and the ones still open at the provider are voided.

use std::sync::Arc;

use crate::application::GatewayRegistry;
use crate::domain::foundation::DomainError;
use crate::domain::payment::{
    OrderPaymentStatus, Payment, PaymentLookup, PaymentStatus, TransitionFields,
    TransitionOutcome, TransitionTrigger,
};
use crate::ports::{OrderRepository, PaymentStore, VoidReason, VoidRequest};

pub struct OrderStatusSynchronizer {
    orders: Arc<dyn OrderRepository>,
    payments: Arc<dyn PaymentStore>,
    gateways: GatewayRegistry,
}

impl OrderStatusSynchronizer {
    pub fn new(orders: Arc<dyn OrderRepository>, payments: Arc<dyn PaymentStore>) -> Self {
        Self {
            orders,
            payments,
            gateways: GatewayRegistry::new(),
        }
    }

    /// Gateways used to void the open siblings of a completed payment.
    pub fn with_gateways(mut self, gateways: GatewayRegistry) -> Self {
        self.gateways = gateways;
        self
    }

    /// Writes the projection of `payment.status` onto its order.
    ///
    /// Returns the status written, or `None` when the order is left
    /// untouched: the payment status has no projection, or another payment
    /// of the same order is COMPLETED and keeps it PAID.
    pub async fn sync(&self, payment: &Payment) -> Result<Option<OrderPaymentStatus>, DomainError> {
        let Some(status) = OrderPaymentStatus::projected_from(payment.status) else {
            return Ok(None);
        };

        if status != OrderPaymentStatus::Paid {
            if let Some(holder) = self.completed_sibling(payment).await? {
                tracing::info!(
                    order_id = %payment.order_id,
                    payment_id = %payment.id,
                    paid_by = %holder.id,
                    payment_status = %payment.status,
                    "Order paid by another payment, projection skipped"
                );
                return Ok(None);
            }
        }

        self.orders
            .update_payment_status(&payment.order_id, status)
            .await?;

        // A sibling can complete between the check and the write.
        if status != OrderPaymentStatus::Paid {
            if let Some(holder) = self.completed_sibling(payment).await? {
                self.orders
                    .update_payment_status(&payment.order_id, OrderPaymentStatus::Paid)
                    .await?;
                tracing::warn!(
                    order_id = %payment.order_id,
                    payment_id = %payment.id,
                    paid_by = %holder.id,
                    "Sibling completed during projection, order restored to PAID"
                );
                return Ok(Some(OrderPaymentStatus::Paid));
            }
        }

        tracing::info!(
            order_id = %payment.order_id,
            payment_id = %payment.id,
            order_payment_status = %status,
            "Order payment status synchronized"
        );
        Ok(Some(status))
    }

    /// Like [`sync`](Self::sync) but only logs failures.
    ///
    /// Used once a transition has been committed, when the payment record is
    /// already authoritative and failing the caller would misreport it.
    pub async fn sync_logged(&self, payment: &Payment) {
        if let Err(e) = self.sync(payment).await {
            tracing::error!(
                order_id = %payment.order_id,
                payment_id = %payment.id,
                payment_status = %payment.status,
                error = %e,
                "Failed to synchronize order payment status"
            );
        }
    }

    /// Voids and cancels the other open payments of a completed payment's order.
    ///
    /// Siblings without a transaction id are left alone: the provider may
    /// still hold a charge for them, which only the stale sweep can resolve.
    /// A sibling whose void fails also stays unsettled for the sweep.
    pub async fn void_superseded(&self, completed: &Payment) {
        let siblings = match self.payments.find_by_order_id(&completed.order_id).await {
            Ok(siblings) => siblings,
            Err(e) => {
                tracing::warn!(
                    order_id = %completed.order_id,
                    error = %e,
                    "Could not load sibling payments to void"
                );
                return;
            }
        };

        for sibling in siblings
            .iter()
            .filter(|p| p.id != completed.id && p.status.is_unsettled())
        {
            self.void_sibling(completed, sibling).await;
        }
    }

    async fn void_sibling(&self, completed: &Payment, sibling: &Payment) {
        let Some(transaction_id) = sibling.transaction_id.clone() else {
            tracing::debug!(
                payment_id = %sibling.id,
                "Superseded payment has no transaction id, left for the stale sweep"
            );
            return;
        };

        let gateway = match self.gateways.get(sibling.method) {
            Ok(gateway) => gateway,
            Err(e) => {
                tracing::warn!(payment_id = %sibling.id, error = %e, "No gateway to void payment");
                return;
            }
        };

        let request = VoidRequest {
            payment_id: sibling.id,
            transaction_id,
            reason: VoidReason::Superseded,
        };
        let raw = match gateway.void(request).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    payment_id = %sibling.id,
                    error = %e,
                    "Void of superseded payment failed, left for the stale sweep"
                );
                return;
            }
        };

        let fields = TransitionFields::default()
            .with_failure_reason(format!("Superseded by payment {}", completed.id))
            .with_gateway_response("void", raw);
        let trigger = TransitionTrigger::Voided;
        match self
            .payments
            .apply_transition(
                &PaymentLookup::Id(sibling.id),
                Some(trigger.allowed_from()),
                trigger.target(),
                fields,
            )
            .await
        {
            Ok(TransitionOutcome::Applied(p)) => tracing::info!(
                payment_id = %p.id,
                paid_by = %completed.id,
                "Superseded payment cancelled"
            ),
            Ok(TransitionOutcome::Skipped(p)) => tracing::debug!(
                payment_id = %p.id,
                status = %p.status,
                "Superseded payment already settled"
            ),
            Err(e) => tracing::warn!(
                payment_id = %sibling.id,
                error = %e,
                "Failed to cancel superseded payment"
            ),
        }
    }

    async fn completed_sibling(&self, payment: &Payment) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .payments
            .find_by_order_id(&payment.order_id)
            .await?
            .into_iter()
            .find(|p| p.id != payment.id && p.status == PaymentStatus::Completed))
    }
}

//! RefundPaymentHandler - Command handler for refunding a completed payment.

use std::sync::Arc;

use super::commit::commit;
use crate::application::{GatewayRegistry, OrderStatusSynchronizer, PaymentNotifier};
use crate::domain::foundation::{PaymentId, UserId};
use crate::domain::payment::{
    Money, Payment, PaymentError, PaymentLookup, PaymentStatus, TransitionFields,
    TransitionTrigger,
};
use crate::ports::{PaymentStore, RefundOutcome, RefundRequest};

pub const DEFAULT_REFUND_REASON: &str = "requested_by_customer";

#[derive(Debug, Clone)]
pub struct RefundPaymentCommand {
    pub user_id: UserId,
    pub payment_id: PaymentId,
    /// Minor units. `None` refunds the full amount.
    pub amount_minor: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundPaymentResult {
    pub payment: Payment,
}

pub struct RefundPaymentHandler {
    store: Arc<dyn PaymentStore>,
    gateways: GatewayRegistry,
    sync: Arc<OrderStatusSynchronizer>,
    notifier: Arc<PaymentNotifier>,
}

impl RefundPaymentHandler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateways: GatewayRegistry,
        sync: Arc<OrderStatusSynchronizer>,
        notifier: Arc<PaymentNotifier>,
    ) -> Self {
        Self {
            store,
            gateways,
            sync,
            notifier,
        }
    }

    pub async fn handle(
        &self,
        cmd: RefundPaymentCommand,
    ) -> Result<RefundPaymentResult, PaymentError> {
        // 1. Load and check ownership
        let payment = self
            .store
            .find_by_id(&cmd.payment_id)
            .await?
            .filter(|p| p.user_id == cmd.user_id)
            .ok_or(PaymentError::PaymentNotFound(cmd.payment_id))?;

        // 2. Only a completed payment can be refunded; checked before any gateway call
        if payment.status != PaymentStatus::Completed {
            return Err(PaymentError::invalid_state(payment.status, "refund"));
        }

        let amount = match cmd.amount_minor {
            Some(minor) => Some(refund_amount(&payment, minor)?),
            None => None,
        };
        let refunded_minor = amount
            .as_ref()
            .map_or(payment.amount.amount_minor, |a| a.amount_minor);

        let transaction_id = payment
            .transaction_id
            .clone()
            .ok_or_else(|| PaymentError::infrastructure("Completed payment has no transaction id"))?;
        let gateway = self.gateways.get(payment.method)?;

        // 3. Refund at the provider
        let request = RefundRequest {
            payment_id: payment.id,
            transaction_id,
            capture_id: payment.capture_id.clone(),
            amount,
            reason: cmd
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REFUND_REASON.to_string()),
        };

        let (refund_id, raw) = match gateway.refund(request).await? {
            RefundOutcome::Succeeded {
                refund_id,
                status,
                raw,
            } => {
                tracing::info!(
                    payment_id = %payment.id,
                    refund_id = %refund_id,
                    refund_status = %status,
                    amount_minor = refunded_minor,
                    "Refund accepted"
                );
                (refund_id, raw)
            }
            RefundOutcome::Declined { reason, .. } => {
                tracing::warn!(payment_id = %payment.id, reason = %reason, "Refund declined");
                return Err(PaymentError::gateway(reason, false));
            }
        };

        // 4. Record it; a refund webhook may already have done so
        let fields = TransitionFields::default()
            .with_refund(Some(refund_id), refunded_minor)
            .with_gateway_response("refund", raw);

        let payment = commit(
            self.store.as_ref(),
            &self.sync,
            &self.notifier,
            &PaymentLookup::Id(payment.id),
            TransitionTrigger::RefundSucceeded,
            fields,
        )
        .await?
        .into_payment();

        Ok(RefundPaymentResult { payment })
    }
}

fn refund_amount(payment: &Payment, minor: i64) -> Result<Money, PaymentError> {
    if minor > payment.amount.amount_minor {
        return Err(PaymentError::validation(
            "amount",
            format!(
                "refund of {} exceeds the payment amount {}",
                minor, payment.amount.amount_minor
            ),
        ));
    }
    Ok(Money::new(minor, payment.amount.currency.clone())?)
}

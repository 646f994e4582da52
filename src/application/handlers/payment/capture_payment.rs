//! CapturePaymentHandler - Command handler for capturing an approved charge.
//!
//! PayPal orders sit in PENDING until the payer approves them. Capturing
//! moves the payment to PROCESSING while the capture call is in flight and to
//! COMPLETED once the provider confirms it.

use std::sync::Arc;

use super::commit::{charge_fields, commit};
use crate::application::{GatewayRegistry, OrderStatusSynchronizer, PaymentNotifier};
use crate::domain::foundation::{PaymentId, UserId};
use crate::domain::payment::{
    Payment, PaymentError, PaymentLookup, PaymentStatus, TransitionFields, TransitionOutcome,
    TransitionTrigger,
};
use crate::ports::{CaptureRequest, ChargeOutcome, PaymentStore};

#[derive(Debug, Clone)]
pub struct CapturePaymentCommand {
    pub user_id: UserId,
    pub payment_id: PaymentId,
}

#[derive(Debug, Clone)]
pub struct CapturePaymentResult {
    pub payment: Payment,
}

pub struct CapturePaymentHandler {
    store: Arc<dyn PaymentStore>,
    gateways: GatewayRegistry,
    sync: Arc<OrderStatusSynchronizer>,
    notifier: Arc<PaymentNotifier>,
}

impl CapturePaymentHandler {
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
        cmd: CapturePaymentCommand,
    ) -> Result<CapturePaymentResult, PaymentError> {
        // 1. Load and check ownership
        let payment = self
            .store
            .find_by_id(&cmd.payment_id)
            .await?
            .filter(|p| p.user_id == cmd.user_id)
            .ok_or(PaymentError::PaymentNotFound(cmd.payment_id))?;

        if payment.status != PaymentStatus::Pending {
            return Err(PaymentError::invalid_state(payment.status, "capture"));
        }
        let transaction_id = payment.transaction_id.clone().ok_or_else(|| {
            PaymentError::invalid_state(payment.status, "capture")
        })?;
        let gateway = self.gateways.get(payment.method)?;
        let lookup = PaymentLookup::Id(payment.id);

        // 2. Claim the payment; a concurrent capture or webhook may have moved it
        let claimed = commit(
            self.store.as_ref(),
            &self.sync,
            &self.notifier,
            &lookup,
            TransitionTrigger::CaptureRequested,
            TransitionFields::default(),
        )
        .await?;
        if let TransitionOutcome::Skipped(current) = claimed {
            return Err(PaymentError::invalid_state(current.status, "capture"));
        }

        // 3. Capture
        let request = CaptureRequest {
            payment_id: payment.id,
            transaction_id,
        };
        let outcome = match gateway.capture(request).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_indeterminate() => {
                tracing::warn!(
                    payment_id = %payment.id,
                    error = %e,
                    "Capture outcome unknown, payment left PROCESSING"
                );
                let payment = self.reload(&payment.id).await?;
                return Ok(CapturePaymentResult { payment });
            }
            Err(e) => {
                // Nothing was captured; hand the payment back to the payer.
                tracing::error!(payment_id = %payment.id, error = %e, "Capture failed");
                commit(
                    self.store.as_ref(),
                    &self.sync,
                    &self.notifier,
                    &lookup,
                    TransitionTrigger::ActionRequired,
                    TransitionFields::default(),
                )
                .await?;
                return Err(e.into());
            }
        };

        // 4. Apply the result
        let trigger = match &outcome {
            ChargeOutcome::Succeeded { .. } => TransitionTrigger::GatewayCallSucceeded,
            ChargeOutcome::Declined { .. } => TransitionTrigger::GatewayCallFailed,
            ChargeOutcome::ActionRequired { .. } => {
                // Capture accepted but held for review; the provider's
                // webhook settles it.
                tracing::info!(payment_id = %payment.id, "Capture pending at provider");
                let payment = self.reload(&payment.id).await?;
                return Ok(CapturePaymentResult { payment });
            }
        };

        let payment = commit(
            self.store.as_ref(),
            &self.sync,
            &self.notifier,
            &lookup,
            trigger,
            charge_fields(&outcome, "capture"),
        )
        .await?
        .into_payment();

        Ok(CapturePaymentResult { payment })
    }

    async fn reload(&self, id: &PaymentId) -> Result<Payment, PaymentError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(PaymentError::PaymentNotFound(*id))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{stranger, Harness};
    use super::*;
    use crate::domain::payment::{OrderPaymentStatus, PaymentMethod};
    use crate::ports::GatewayError;
    use serde_json::json;

    fn handler(h: &Harness) -> CapturePaymentHandler {
        CapturePaymentHandler::new(h.store(), h.registry(), h.synchronizer(), h.notifier())
    }

    fn command(payment: &Payment) -> CapturePaymentCommand {
        CapturePaymentCommand {
            user_id: payment.user_id.clone(),
            payment_id: payment.id,
        }
    }

    #[tokio::test]
    async fn approved_order_is_captured_and_order_paid() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::PayPal, PaymentStatus::Pending, Some("ORDER-1"))
            .await;

        let result = handler(&h).handle(command(&payment)).await.unwrap();

        assert_eq!(result.payment.status, PaymentStatus::Completed);
        assert!(result.payment.capture_id.as_deref().unwrap().starts_with("CAPTURE-MOCK-"));
        assert_eq!(result.payment.transaction_id.as_deref(), Some("ORDER-1"));
        assert!(result.payment.gateway_response.get("capture").is_some());
        assert_eq!(h.orders.payment_status(&order.id).await, Some(OrderPaymentStatus::Paid));
        assert_eq!(h.notifications.kinds(), vec!["payment_success"]);
        assert_eq!(h.paypal.calls()[0].args, vec!["ORDER-1".to_string()]);
    }

    #[tokio::test]
    async fn declined_capture_fails_payment() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::PayPal, PaymentStatus::Pending, Some("ORDER-1"))
            .await;
        h.paypal.push_capture(Ok(ChargeOutcome::Declined {
            transaction_id: Some("ORDER-1".to_string()),
            reason: "INSTRUMENT_DECLINED".to_string(),
            raw: json!({}),
        }));

        let result = handler(&h).handle(command(&payment)).await.unwrap();

        assert_eq!(result.payment.status, PaymentStatus::Failed);
        assert_eq!(h.orders.payment_status(&order.id).await, Some(OrderPaymentStatus::Failed));
        assert_eq!(h.notifications.kinds(), vec!["payment_failed"]);
    }

    #[tokio::test]
    async fn rejected_capture_returns_payment_to_pending() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::PayPal, PaymentStatus::Pending, Some("ORDER-1"))
            .await;
        h.paypal
            .push_capture(Err(GatewayError::invalid_request("ORDER_NOT_APPROVED")));

        let err = handler(&h).handle(command(&payment)).await.unwrap_err();

        assert!(matches!(err, PaymentError::Gateway { .. }));
        assert_eq!(h.stored(&payment).await.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn timed_out_capture_stays_processing() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::PayPal, PaymentStatus::Pending, Some("ORDER-1"))
            .await;
        h.paypal.push_capture(Err(GatewayError::timeout("slow")));

        let result = handler(&h).handle(command(&payment)).await.unwrap();

        assert_eq!(result.payment.status, PaymentStatus::Processing);
        assert!(h.notifications.sent().is_empty());
    }

    #[tokio::test]
    async fn completed_payment_cannot_be_captured_again() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::PayPal, PaymentStatus::Completed, Some("ORDER-1"))
            .await;

        let err = handler(&h).handle(command(&payment)).await.unwrap_err();

        assert_eq!(
            err,
            PaymentError::invalid_state(PaymentStatus::Completed, "capture")
        );
        assert!(!h.paypal.was_called("capture"));
    }

    #[tokio::test]
    async fn other_users_payment_is_not_found() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::PayPal, PaymentStatus::Pending, Some("ORDER-1"))
            .await;

        let err = handler(&h)
            .handle(CapturePaymentCommand {
                user_id: stranger(),
                payment_id: payment.id,
            })
            .await
            .unwrap_err();

        assert_eq!(err, PaymentError::PaymentNotFound(payment.id));
    }
}

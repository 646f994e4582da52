//! Applies verified provider events to payments.
//!
//! Once an event is authentic everything is acknowledged: a duplicate, a
//! stale event, an event for a payment we never created and an event type we
//! do not consume all return `Ok`. Only authenticity failures are errors the
//! provider sees.

use std::sync::Arc;

use super::commit::commit;
use crate::application::{OrderStatusSynchronizer, PaymentNotifier};
use crate::domain::foundation::{ErrorCode, PaymentId};
use crate::domain::payment::{
    EventTransition, GatewayEvent, PaymentLookup, PaymentMethod, PaymentStatus, TransitionFields,
    TransitionOutcome, TransitionTrigger, WebhookAction, WebhookError,
};
use crate::ports::{PaymentGateway, PaymentStore, WebhookRequest};

/// What happened to an authenticated event.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookOutcome {
    /// The event moved the payment.
    Applied {
        payment_id: PaymentId,
        status: PaymentStatus,
    },
    /// The payment was not in a state the event applies to.
    Skipped {
        payment_id: PaymentId,
        status: PaymentStatus,
    },
    /// Event type the payment lifecycle does not consume.
    Ignored { event_type: String },
    /// No payment matches the event.
    Unmatched { event_type: String },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { .. } => "applied",
            WebhookOutcome::Skipped { .. } => "skipped",
            WebhookOutcome::Ignored { .. } => "ignored",
            WebhookOutcome::Unmatched { .. } => "unmatched",
        }
    }
}

pub struct WebhookReconciler {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn PaymentStore>,
    sync: Arc<OrderStatusSynchronizer>,
    notifier: Arc<PaymentNotifier>,
}

impl WebhookReconciler {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn PaymentStore>,
        sync: Arc<OrderStatusSynchronizer>,
        notifier: Arc<PaymentNotifier>,
    ) -> Self {
        Self {
            gateway,
            store,
            sync,
            notifier,
        }
    }

    pub fn method(&self) -> PaymentMethod {
        self.gateway.method()
    }

    pub async fn reconcile(&self, request: &WebhookRequest) -> Result<WebhookOutcome, WebhookError> {
        // 1. Authenticate; nothing is looked up for an untrusted event
        let event = match self.gateway.verify_webhook(request).await {
            Ok(event) => event,
            Err(e) => {
                let err = WebhookError::from(e);
                tracing::error!(
                    method = %self.gateway.method(),
                    error = %err,
                    "Webhook verification failed"
                );
                return Err(err);
            }
        };

        tracing::info!(
            method = %event.method,
            event_id = %event.event_id,
            event_type = %event.event_type,
            "Webhook received"
        );

        // 2. Map to a transition
        let transition = match &event.action {
            WebhookAction::Apply(transition) => transition,
            WebhookAction::Unhandled => {
                tracing::info!(event_type = %event.event_type, "Webhook event ignored");
                return Ok(WebhookOutcome::Ignored {
                    event_type: event.event_type,
                });
            }
        };

        // 3. Resolve and apply
        let fields = event_fields(&event, transition);
        for lookup in lookups(transition) {
            match commit(
                self.store.as_ref(),
                &self.sync,
                &self.notifier,
                &lookup,
                transition.trigger,
                fields.clone(),
            )
            .await
            {
                Ok(TransitionOutcome::Applied(payment)) => {
                    return Ok(WebhookOutcome::Applied {
                        payment_id: payment.id,
                        status: payment.status,
                    });
                }
                Ok(TransitionOutcome::Skipped(payment)) => {
                    return Ok(WebhookOutcome::Skipped {
                        payment_id: payment.id,
                        status: payment.status,
                    });
                }
                Err(e) if e.code == ErrorCode::PaymentNotFound => continue,
                Err(e) => {
                    tracing::error!(
                        event_id = %event.event_id,
                        lookup = %lookup,
                        error = %e,
                        "Failed to apply webhook event"
                    );
                    return Err(WebhookError::Infrastructure(e.to_string()));
                }
            }
        }

        tracing::warn!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            transaction_id = transition.transaction_id.as_deref().unwrap_or("-"),
            "No payment matches webhook event"
        );
        Ok(WebhookOutcome::Unmatched {
            event_type: event.event_type,
        })
    }
}

/// Transaction id, then capture id, then our own embedded reference.
fn lookups(transition: &EventTransition) -> Vec<PaymentLookup> {
    let mut lookups = Vec::with_capacity(3);
    if let Some(tx) = &transition.transaction_id {
        lookups.push(PaymentLookup::TransactionId(tx.clone()));
    }
    if let Some(capture_id) = &transition.capture_id {
        if transition.transaction_id.as_ref() != Some(capture_id) {
            lookups.push(PaymentLookup::TransactionId(capture_id.clone()));
        }
    }
    if let Some(id) = transition.reference {
        lookups.push(PaymentLookup::Id(id));
    }
    lookups
}

fn event_fields(event: &GatewayEvent, transition: &EventTransition) -> TransitionFields {
    let mut fields = TransitionFields::default()
        .with_capture_id(transition.capture_id.clone())
        .with_gateway_response(event.audit_key(), event.payload.clone());
    if let Some(tx) = &transition.transaction_id {
        fields = fields.with_transaction_id(tx.clone());
    }
    if let Some(reason) = &transition.failure_reason {
        fields = fields.with_failure_reason(reason.clone());
    }

    match transition.trigger {
        TransitionTrigger::PaymentSucceeded => fields.processed_now(),
        TransitionTrigger::PaymentFailed | TransitionTrigger::DisputeCreated
            if transition.failure_reason.is_none() =>
        {
            fields.with_failure_reason(event.event_type.clone())
        }
        TransitionTrigger::RefundCompleted => {
            fields.refund_id = transition.refund_id.clone();
            fields.refund_amount = transition.refund_amount;
            fields
        }
        _ => fields,
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::Harness;
    use super::*;
    use crate::adapters::mock::MockPaymentGateway;
    use crate::domain::payment::{OrderPaymentStatus, Payment};
    use serde_json::json;

    fn reconciler(h: &Harness, gateway: MockPaymentGateway) -> WebhookReconciler {
        WebhookReconciler::new(Arc::new(gateway), h.store(), h.synchronizer(), h.notifier())
    }

    fn event(method: PaymentMethod, event_type: &str, transition: EventTransition) -> GatewayEvent {
        GatewayEvent {
            event_id: format!("evt_{}", event_type),
            event_type: event_type.to_string(),
            method,
            action: WebhookAction::Apply(transition),
            payload: json!({"type": event_type}),
        }
    }

    fn succeeded(tx: &str) -> GatewayEvent {
        event(
            PaymentMethod::Stripe,
            "payment_intent.succeeded",
            EventTransition::new(TransitionTrigger::PaymentSucceeded).transaction_id(tx),
        )
    }

    fn request() -> WebhookRequest {
        WebhookRequest::new(b"{}".to_vec())
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Idempotence
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn replayed_event_applies_once() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::Stripe, PaymentStatus::Processing, Some("pi_1"))
            .await;
        h.stripe.push_webhook_event(succeeded("pi_1"));
        h.stripe.push_webhook_event(succeeded("pi_1"));
        let reconciler = reconciler(&h, h.stripe.clone());

        let first = reconciler.reconcile(&request()).await.unwrap();
        let after_first = h.stored(&payment).await;
        let second = reconciler.reconcile(&request()).await.unwrap();

        assert_eq!(
            first,
            WebhookOutcome::Applied {
                payment_id: payment.id,
                status: PaymentStatus::Completed
            }
        );
        assert_eq!(second.label(), "skipped");
        assert_eq!(h.stored(&payment).await, after_first);
        assert_eq!(h.orders.status_writes().await.len(), 1);
        assert_eq!(h.notifications.kinds(), vec!["payment_success"]);
    }

    #[tokio::test]
    async fn audit_entry_is_merged_under_event_type() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::Stripe, PaymentStatus::Processing, Some("pi_1"))
            .await;
        h.stripe.push_webhook_event(succeeded("pi_1"));

        reconciler(&h, h.stripe.clone())
            .reconcile(&request())
            .await
            .unwrap();

        let stored = h.stored(&payment).await;
        assert_eq!(
            stored.gateway_response["webhook:payment_intent.succeeded"]["type"],
            "payment_intent.succeeded"
        );
        assert!(stored.processed_at.is_some());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Transition table
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn failure_after_action_required_fails_payment() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::Stripe, PaymentStatus::Pending, Some("pi_3ds"))
            .await;
        h.stripe.push_webhook_event(event(
            PaymentMethod::Stripe,
            "payment_intent.payment_failed",
            EventTransition::new(TransitionTrigger::PaymentFailed)
                .transaction_id("pi_3ds")
                .failure_reason(Some("authentication_required".to_string())),
        ));

        reconciler(&h, h.stripe.clone())
            .reconcile(&request())
            .await
            .unwrap();

        let stored = h.stored(&payment).await;
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("authentication_required"));
        assert_eq!(h.orders.payment_status(&order.id).await, Some(OrderPaymentStatus::Failed));
        assert_eq!(h.notifications.kinds(), vec!["payment_failed"]);
    }

    #[tokio::test]
    async fn refund_event_records_refund_details() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::Stripe, PaymentStatus::Completed, Some("pi_1"))
            .await;
        h.stripe.push_webhook_event(event(
            PaymentMethod::Stripe,
            "charge.refunded",
            EventTransition::new(TransitionTrigger::RefundCompleted)
                .transaction_id("pi_1")
                .refund(Some("re_1".to_string()), Some(2_500)),
        ));

        reconciler(&h, h.stripe.clone())
            .reconcile(&request())
            .await
            .unwrap();

        let stored = h.stored(&payment).await;
        assert_eq!(stored.status, PaymentStatus::Refunded);
        assert_eq!(stored.refund_id.as_deref(), Some("re_1"));
        assert_eq!(stored.refund_amount, Some(2_500));
        assert_eq!(h.orders.payment_status(&order.id).await, Some(OrderPaymentStatus::Refunded));
    }

    #[tokio::test]
    async fn dispute_fails_completed_payment() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::Stripe, PaymentStatus::Completed, Some("pi_1"))
            .await;
        h.stripe.push_webhook_event(event(
            PaymentMethod::Stripe,
            "charge.dispute.created",
            EventTransition::new(TransitionTrigger::DisputeCreated).transaction_id("pi_1"),
        ));

        reconciler(&h, h.stripe.clone())
            .reconcile(&request())
            .await
            .unwrap();

        let stored = h.stored(&payment).await;
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert_eq!(stored.failure_reason.as_deref(), Some("charge.dispute.created"));
    }

    #[tokio::test]
    async fn late_success_cannot_revive_cancelled_payment() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::PayPal, PaymentStatus::Cancelled, Some("ORDER-1"))
            .await;
        h.paypal.push_webhook_event(event(
            PaymentMethod::PayPal,
            "PAYMENT.CAPTURE.COMPLETED",
            EventTransition::new(TransitionTrigger::PaymentSucceeded).transaction_id("ORDER-1"),
        ));

        let outcome = reconciler(&h, h.paypal.clone())
            .reconcile(&request())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Skipped {
                payment_id: payment.id,
                status: PaymentStatus::Cancelled
            }
        );
        assert!(h.notifications.sent().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Lookup fallbacks
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn capture_id_resolves_payment_when_transaction_id_misses() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let mut payment = Payment::start(
            order.id,
            order.user_id.clone(),
            order.total.clone(),
            PaymentMethod::PayPal,
        );
        payment.status = PaymentStatus::Completed;
        payment.transaction_id = Some("ORDER-1".to_string());
        payment.capture_id = Some("CAP-1".to_string());
        h.store.insert(&payment).await.unwrap();
        h.paypal.push_webhook_event(event(
            PaymentMethod::PayPal,
            "CUSTOMER.DISPUTE.CREATED",
            EventTransition::new(TransitionTrigger::DisputeCreated)
                .capture_id(Some("CAP-1".to_string())),
        ));

        let outcome = reconciler(&h, h.paypal.clone())
            .reconcile(&request())
            .await
            .unwrap();

        assert_eq!(outcome.label(), "applied");
        assert_eq!(h.stored(&payment).await.status, PaymentStatus::Failed);
    }

    #[tokio::test]
    async fn embedded_reference_resolves_payment_without_transaction_id() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::Stripe, PaymentStatus::Processing, None)
            .await;
        h.stripe.push_webhook_event(event(
            PaymentMethod::Stripe,
            "payment_intent.succeeded",
            EventTransition::new(TransitionTrigger::PaymentSucceeded)
                .transaction_id("pi_new")
                .reference(Some(&payment.id.to_string())),
        ));

        let outcome = reconciler(&h, h.stripe.clone())
            .reconcile(&request())
            .await
            .unwrap();

        assert_eq!(outcome.label(), "applied");
        // The transaction id learned from the event is kept.
        assert_eq!(h.stored(&payment).await.transaction_id.as_deref(), Some("pi_new"));
    }

    #[tokio::test]
    async fn unknown_payment_is_acknowledged_as_unmatched() {
        let h = Harness::new().await;
        h.stripe.push_webhook_event(succeeded("pi_unknown"));

        let outcome = reconciler(&h, h.stripe.clone())
            .reconcile(&request())
            .await
            .unwrap();

        assert_eq!(outcome.label(), "unmatched");
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Verification and unhandled events
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unverified_event_changes_nothing() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let payment = h
            .payment(&order, PaymentMethod::Stripe, PaymentStatus::Processing, Some("pi_1"))
            .await;
        let gateway = MockPaymentGateway::rejecting_webhooks(PaymentMethod::Stripe);

        let err = reconciler(&h, gateway)
            .reconcile(&request())
            .await
            .unwrap_err();

        assert!(err.is_verification_failure());
        assert_eq!(h.stored(&payment).await, payment);
        assert!(h.orders.status_writes().await.is_empty());
    }

    #[tokio::test]
    async fn unhandled_event_type_is_ignored() {
        let h = Harness::new().await;
        h.paypal.push_webhook_event(GatewayEvent {
            event_id: "WH-1".to_string(),
            event_type: "CHECKOUT.ORDER.APPROVED".to_string(),
            method: PaymentMethod::PayPal,
            action: WebhookAction::Unhandled,
            payload: json!({}),
        });

        let outcome = reconciler(&h, h.paypal.clone())
            .reconcile(&request())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "CHECKOUT.ORDER.APPROVED".to_string()
            }
        );
    }

    #[tokio::test]
    async fn notification_failure_does_not_fail_webhook() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        h.payment(&order, PaymentMethod::Stripe, PaymentStatus::Processing, Some("pi_1"))
            .await;
        h.stripe.push_webhook_event(succeeded("pi_1"));
        let notifier = Arc::new(PaymentNotifier::new(
            Arc::new(crate::adapters::notifications::RecordingNotificationDispatcher::failing()),
            Arc::new(h.orders.clone()),
            Arc::new(h.users.clone()),
        ));

        let reconciler =
            WebhookReconciler::new(Arc::new(h.stripe.clone()), h.store(), h.synchronizer(), notifier);

        let outcome = reconciler
            .reconcile(&request())
            .await
            .unwrap();

        assert_eq!(outcome.label(), "applied");
        assert_eq!(h.orders.payment_status(&order.id).await, Some(OrderPaymentStatus::Paid));
    }

    #[test]
    fn lookups_do_not_repeat_identical_ids() {
        let t = EventTransition::new(TransitionTrigger::PaymentSucceeded)
            .transaction_id("X")
            .capture_id(Some("X".to_string()));
        assert_eq!(lookups(&t), vec![PaymentLookup::TransactionId("X".to_string())]);
    }
}

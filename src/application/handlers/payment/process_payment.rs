//! ProcessPaymentHandler - Command handler for charging an order.

use std::sync::Arc;

use super::commit::{charge_fields, commit};
use crate::application::{GatewayRegistry, OrderStatusSynchronizer, PaymentNotifier};
use crate::domain::foundation::{OrderId, UserId};
use crate::domain::payment::{
    Payment, PaymentError, PaymentLookup, PaymentMethod, PaymentStatus, TransitionFields,
    TransitionTrigger,
};
use crate::ports::{ChargeOutcome, InitiatePaymentRequest, OrderRepository, PaymentStore};

/// Command to pay for an order.
#[derive(Debug, Clone)]
pub struct ProcessPaymentCommand {
    pub user_id: UserId,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    /// Stripe PaymentMethod id. Without it the intent is created unconfirmed.
    pub payment_method_ref: Option<String>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ProcessPaymentResult {
    pub payment: Payment,
}

impl ProcessPaymentResult {
    /// The charge was accepted but its outcome is not final yet.
    pub fn is_awaiting_confirmation(&self) -> bool {
        self.payment.is_awaiting_confirmation()
    }
}

/// Handler for processing a payment.
///
/// The payment row is written in PROCESSING before the gateway is called, so
/// a webhook that beats the synchronous response always finds it. Gateway
/// results are applied with the PROCESSING precondition and lose to anything
/// a webhook has already recorded.
pub struct ProcessPaymentHandler {
    orders: Arc<dyn OrderRepository>,
    store: Arc<dyn PaymentStore>,
    gateways: GatewayRegistry,
    sync: Arc<OrderStatusSynchronizer>,
    notifier: Arc<PaymentNotifier>,
}

impl ProcessPaymentHandler {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        store: Arc<dyn PaymentStore>,
        gateways: GatewayRegistry,
        sync: Arc<OrderStatusSynchronizer>,
        notifier: Arc<PaymentNotifier>,
    ) -> Self {
        Self {
            orders,
            store,
            gateways,
            sync,
            notifier,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessPaymentCommand,
    ) -> Result<ProcessPaymentResult, PaymentError> {
        // 1. Validate the request before touching anything
        validate(&cmd)?;
        let gateway = self.gateways.get(cmd.method)?;

        // 2. Load the order; someone else's order does not exist
        let order = self
            .orders
            .find_by_id(&cmd.order_id)
            .await?
            .filter(|o| o.is_owned_by(&cmd.user_id))
            .ok_or(PaymentError::OrderNotFound(cmd.order_id))?;

        if order.is_paid() {
            return Err(PaymentError::OrderAlreadyPaid(order.id));
        }
        // The order row can lag its payments when a projection write failed
        let attempts = self.store.find_by_order_id(&order.id).await?;
        if attempts.iter().any(|p| p.status == PaymentStatus::Completed) {
            return Err(PaymentError::OrderAlreadyPaid(order.id));
        }

        // 3. Record the attempt
        let payment = Payment::start(order.id, cmd.user_id, order.total.clone(), cmd.method);
        self.store.insert(&payment).await?;

        tracing::info!(
            payment_id = %payment.id,
            order_id = %order.id,
            method = %payment.method,
            amount = %payment.amount,
            "Payment started"
        );

        // 4. Charge
        let request = InitiatePaymentRequest {
            payment_id: payment.id,
            order_id: order.id,
            amount: payment.amount.clone(),
            payment_method_ref: cmd.payment_method_ref,
            return_url: cmd.return_url,
            cancel_url: cmd.cancel_url,
        };
        let lookup = PaymentLookup::Id(payment.id);

        let outcome = match gateway.initiate(request).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_indeterminate() => {
                tracing::warn!(
                    payment_id = %payment.id,
                    error = %e,
                    "Gateway outcome unknown, payment left PROCESSING"
                );
                return Ok(ProcessPaymentResult { payment });
            }
            Err(e) => {
                tracing::error!(payment_id = %payment.id, error = %e, "Gateway call failed");
                commit(
                    self.store.as_ref(),
                    &self.sync,
                    &self.notifier,
                    &lookup,
                    TransitionTrigger::GatewayCallFailed,
                    TransitionFields::default().with_failure_reason(e.message.clone()),
                )
                .await?;
                return Err(e.into());
            }
        };

        // 5. Apply the synchronous result
        let trigger = match &outcome {
            ChargeOutcome::Succeeded { .. } => TransitionTrigger::GatewayCallSucceeded,
            ChargeOutcome::ActionRequired { .. } => TransitionTrigger::ActionRequired,
            ChargeOutcome::Declined { .. } => TransitionTrigger::GatewayCallFailed,
        };
        let fields = charge_fields(&outcome, initiate_audit_key(cmd.method));

        let payment = commit(
            self.store.as_ref(),
            &self.sync,
            &self.notifier,
            &lookup,
            trigger,
            fields,
        )
        .await?
        .into_payment();

        Ok(ProcessPaymentResult { payment })
    }
}

fn initiate_audit_key(method: PaymentMethod) -> &'static str {
    match method {
        PaymentMethod::Stripe => "create_intent",
        PaymentMethod::PayPal => "create_order",
    }
}

fn validate(cmd: &ProcessPaymentCommand) -> Result<(), PaymentError> {
    if let Some(pm) = &cmd.payment_method_ref {
        if pm.trim().is_empty() {
            return Err(PaymentError::validation(
                "payment_method_ref",
                "must not be blank",
            ));
        }
    }
    for (field, url) in [("return_url", &cmd.return_url), ("cancel_url", &cmd.cancel_url)] {
        if let Some(url) = url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(PaymentError::validation(field, "must be an http(s) URL"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{owner, stranger, Harness};
    use super::*;
    use crate::domain::payment::{OrderPaymentStatus, PaymentStatus};
    use crate::ports::GatewayError;
    use serde_json::json;

    fn handler(h: &Harness) -> ProcessPaymentHandler {
        ProcessPaymentHandler::new(
            Arc::new(h.orders.clone()),
            h.store(),
            h.registry(),
            h.synchronizer(),
            h.notifier(),
        )
    }

    fn command(order_id: OrderId, method: PaymentMethod) -> ProcessPaymentCommand {
        ProcessPaymentCommand {
            user_id: owner(),
            order_id,
            method,
            payment_method_ref: Some("pm_card_visa".to_string()),
            return_url: None,
            cancel_url: None,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Success paths
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn confirmed_stripe_charge_completes_synchronously() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;

        let result = handler(&h)
            .handle(command(order.id, PaymentMethod::Stripe))
            .await
            .unwrap();

        assert_eq!(result.payment.status, PaymentStatus::Completed);
        assert!(result.payment.transaction_id.is_some());
        assert!(result.payment.processed_at.is_some());
        assert!(result.payment.gateway_response.get("create_intent").is_some());
        assert_eq!(h.orders.payment_status(&order.id).await, Some(OrderPaymentStatus::Paid));
        assert_eq!(h.notifications.kinds(), vec!["payment_success"]);
    }

    #[tokio::test]
    async fn paypal_order_waits_for_approval() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;

        let result = handler(&h)
            .handle(command(order.id, PaymentMethod::PayPal))
            .await
            .unwrap();

        assert_eq!(result.payment.status, PaymentStatus::Pending);
        assert!(result.is_awaiting_confirmation());
        assert!(result.payment.approval_url.is_some());
        assert_eq!(h.orders.payment_status(&order.id).await, Some(OrderPaymentStatus::Pending));
        assert!(h.notifications.sent().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Failure paths
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn decline_fails_payment_and_order() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        h.stripe.push_initiate(Ok(ChargeOutcome::Declined {
            transaction_id: Some("pi_declined".to_string()),
            reason: "Your card was declined.".to_string(),
            raw: json!({"error": {"code": "card_declined"}}),
        }));

        let result = handler(&h)
            .handle(command(order.id, PaymentMethod::Stripe))
            .await
            .unwrap();

        assert_eq!(result.payment.status, PaymentStatus::Failed);
        assert_eq!(result.payment.failure_reason.as_deref(), Some("Your card was declined."));
        assert_eq!(h.orders.payment_status(&order.id).await, Some(OrderPaymentStatus::Failed));
        assert_eq!(h.notifications.kinds(), vec!["payment_failed"]);
    }

    #[tokio::test]
    async fn timeout_leaves_payment_processing() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        h.stripe.push_initiate(Err(GatewayError::timeout("no response in 30s")));

        let result = handler(&h)
            .handle(command(order.id, PaymentMethod::Stripe))
            .await
            .unwrap();

        assert_eq!(result.payment.status, PaymentStatus::Processing);
        assert!(result.is_awaiting_confirmation());
        assert_eq!(h.stored(&result.payment).await.status, PaymentStatus::Processing);
        assert!(h.orders.status_writes().await.is_empty());
        assert!(h.notifications.sent().is_empty());
    }

    #[tokio::test]
    async fn rejected_request_fails_payment_and_surfaces_gateway_error() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        h.stripe
            .push_initiate(Err(GatewayError::invalid_request("No such PaymentMethod")));

        let err = handler(&h)
            .handle(command(order.id, PaymentMethod::Stripe))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Gateway { retryable: false, .. }));
        let stored = h.store.all().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, PaymentStatus::Failed);
        assert_eq!(h.notifications.kinds(), vec!["payment_failed"]);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Preconditions
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn foreign_order_is_not_found() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let mut cmd = command(order.id, PaymentMethod::Stripe);
        cmd.user_id = stranger();

        let err = handler(&h).handle(cmd).await.unwrap_err();

        assert_eq!(err, PaymentError::OrderNotFound(order.id));
        assert!(!h.stripe.was_called("initiate"));
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn paid_order_is_rejected_before_gateway_call() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        handler(&h)
            .handle(command(order.id, PaymentMethod::Stripe))
            .await
            .unwrap();

        let err = handler(&h)
            .handle(command(order.id, PaymentMethod::Stripe))
            .await
            .unwrap_err();

        assert_eq!(err, PaymentError::OrderAlreadyPaid(order.id));
        assert_eq!(h.stripe.call_count("initiate"), 1);
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn completed_payment_blocks_a_new_charge_even_if_order_row_lags() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        h.payment(&order, PaymentMethod::Stripe, PaymentStatus::Completed, Some("pi_paid"))
            .await;

        let err = handler(&h)
            .handle(command(order.id, PaymentMethod::Stripe))
            .await
            .unwrap_err();

        assert_eq!(err, PaymentError::OrderAlreadyPaid(order.id));
        assert!(!h.stripe.was_called("initiate"));
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn blank_payment_method_is_a_validation_error() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let mut cmd = command(order.id, PaymentMethod::Stripe);
        cmd.payment_method_ref = Some("  ".to_string());

        let err = handler(&h).handle(cmd).await.unwrap_err();

        assert!(matches!(err, PaymentError::Validation { ref field, .. } if field == "payment_method_ref"));
        assert!(h.stripe.calls().is_empty());
    }

    #[tokio::test]
    async fn relative_return_url_is_rejected() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let mut cmd = command(order.id, PaymentMethod::PayPal);
        cmd.return_url = Some("/checkout/done".to_string());

        let err = handler(&h).handle(cmd).await.unwrap_err();
        assert_eq!(err.code(), crate::domain::foundation::ErrorCode::ValidationFailed);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Race with webhook
    // ════════════════════════════════════════════════════════════════════════════

    /// Settles the payment the way a fast webhook would, then reports a decline.
    struct RacingGateway {
        store: crate::adapters::memory::InMemoryPaymentStore,
    }

    #[async_trait::async_trait]
    impl crate::ports::PaymentGateway for RacingGateway {
        fn method(&self) -> PaymentMethod {
            PaymentMethod::Stripe
        }

        async fn initiate(
            &self,
            request: InitiatePaymentRequest,
        ) -> Result<ChargeOutcome, GatewayError> {
            self.store
                .apply_transition(
                    &PaymentLookup::Id(request.payment_id),
                    Some(TransitionTrigger::PaymentSucceeded.allowed_from()),
                    PaymentStatus::Completed,
                    TransitionFields::default().with_transaction_id("pi_race"),
                )
                .await
                .unwrap();
            Ok(ChargeOutcome::Declined {
                transaction_id: Some("pi_race".to_string()),
                reason: "late decline".to_string(),
                raw: json!({}),
            })
        }

        async fn capture(
            &self,
            _request: crate::ports::CaptureRequest,
        ) -> Result<ChargeOutcome, GatewayError> {
            unimplemented!()
        }

        async fn refund(
            &self,
            _request: crate::ports::RefundRequest,
        ) -> Result<crate::ports::RefundOutcome, GatewayError> {
            unimplemented!()
        }

        async fn retrieve(&self, _transaction_id: &str) -> Result<ChargeOutcome, GatewayError> {
            unimplemented!()
        }

        async fn find_by_reference(
            &self,
            _payment_id: crate::domain::foundation::PaymentId,
        ) -> Result<Option<ChargeOutcome>, GatewayError> {
            unimplemented!()
        }

        async fn void(
            &self,
            _request: crate::ports::VoidRequest,
        ) -> Result<serde_json::Value, GatewayError> {
            unimplemented!()
        }

        async fn verify_webhook(
            &self,
            _request: &crate::ports::WebhookRequest,
        ) -> Result<crate::domain::payment::GatewayEvent, GatewayError> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn webhook_that_settled_first_wins_over_sync_response() {
        let h = Harness::new().await;
        let order = h.order(10_000).await;
        let registry = GatewayRegistry::new().with_gateway(Arc::new(RacingGateway {
            store: h.store.clone(),
        }));
        let handler = ProcessPaymentHandler::new(
            Arc::new(h.orders.clone()),
            h.store(),
            registry,
            h.synchronizer(),
            h.notifier(),
        );

        let result = handler
            .handle(command(order.id, PaymentMethod::Stripe))
            .await
            .unwrap();

        assert_eq!(result.payment.status, PaymentStatus::Completed);
        assert!(result.payment.failure_reason.is_none());
        // The losing write neither projects onto the order nor notifies.
        assert!(h.orders.status_writes().await.is_empty());
        assert!(h.notifications.sent().is_empty());
    }
}

//! ReconcileStalePaymentsHandler - Resolves payments whose webhook never came.
//!
//! Payments left PENDING or PROCESSING past `stale_after` are polled at their
//! gateway, by transaction id or, when none was recorded, by our payment id.
//! Results go through the same guarded transition as webhooks, so the sweep
//! racing a late webhook is harmless.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};

use super::commit::{charge_fields, commit};
use crate::application::{GatewayRegistry, OrderStatusSynchronizer, PaymentNotifier};
use crate::domain::foundation::{DomainError, Timestamp};
use crate::domain::payment::{
    Payment, PaymentLookup, PaymentStatus, TransitionFields, TransitionOutcome, TransitionTrigger,
};
use crate::ports::{ChargeOutcome, PaymentStore, VoidReason, VoidRequest};

const UNSETTLED: [PaymentStatus; 2] = [PaymentStatus::Pending, PaymentStatus::Processing];

/// Tuning for one sweep.
#[derive(Debug, Clone)]
pub struct StalePaymentPolicy {
    /// Unsettled for this long before the gateway is polled.
    pub stale_after: Duration,
    /// Unsettled for this long with nothing to wait for: cancel.
    pub abandon_after: Duration,
    pub batch_size: u32,
    /// Gateway polls in flight at once.
    pub concurrency: usize,
}

impl Default for StalePaymentPolicy {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(900),
            abandon_after: Duration::from_secs(86_400),
            batch_size: 100,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileStalePaymentsCommand {
    /// Reference time; defaults to now.
    pub now: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStalePaymentsResult {
    pub examined: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub unchanged: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepResult {
    Moved(PaymentStatus),
    Unchanged,
    Error,
}

pub struct ReconcileStalePaymentsHandler {
    store: Arc<dyn PaymentStore>,
    gateways: GatewayRegistry,
    sync: Arc<OrderStatusSynchronizer>,
    notifier: Arc<PaymentNotifier>,
    policy: StalePaymentPolicy,
}

impl ReconcileStalePaymentsHandler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        gateways: GatewayRegistry,
        sync: Arc<OrderStatusSynchronizer>,
        notifier: Arc<PaymentNotifier>,
        policy: StalePaymentPolicy,
    ) -> Self {
        Self {
            store,
            gateways,
            sync,
            notifier,
            policy,
        }
    }

    pub async fn handle(
        &self,
        cmd: ReconcileStalePaymentsCommand,
    ) -> Result<ReconcileStalePaymentsResult, DomainError> {
        let now = cmd.now.unwrap_or_else(Timestamp::now);
        let cutoff = now.minus_secs(self.policy.stale_after.as_secs());
        let abandon_before = now.minus_secs(self.policy.abandon_after.as_secs());

        let stale = self
            .store
            .find_stale(&UNSETTLED, cutoff, self.policy.batch_size)
            .await?;

        let mut result = ReconcileStalePaymentsResult {
            examined: stale.len(),
            ..Default::default()
        };
        if stale.is_empty() {
            return Ok(result);
        }

        let outcomes: Vec<SweepResult> = stream::iter(stale)
            .map(|payment| self.reconcile_one(payment, abandon_before))
            .buffer_unordered(self.policy.concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                SweepResult::Moved(PaymentStatus::Completed) => result.completed += 1,
                SweepResult::Moved(PaymentStatus::Failed) => result.failed += 1,
                SweepResult::Moved(PaymentStatus::Cancelled) => result.cancelled += 1,
                SweepResult::Moved(_) | SweepResult::Unchanged => result.unchanged += 1,
                SweepResult::Error => result.errors += 1,
            }
        }

        tracing::info!(
            examined = result.examined,
            completed = result.completed,
            failed = result.failed,
            cancelled = result.cancelled,
            unchanged = result.unchanged,
            errors = result.errors,
            "Stale payment sweep finished"
        );
        Ok(result)
    }

    async fn reconcile_one(&self, payment: Payment, abandon_before: Timestamp) -> SweepResult {
        let abandoned = payment.updated_at.is_before(&abandon_before);

        let gateway = match self.gateways.get(payment.method) {
            Ok(gateway) => gateway,
            Err(e) => {
                tracing::warn!(payment_id = %payment.id, error = %e, "No gateway for stale payment");
                return SweepResult::Error;
            }
        };

        // Without a transaction id the initiate call may still have created
        // a charge, so ask the provider by our own id before giving up.
        let polled = match &payment.transaction_id {
            Some(transaction_id) => gateway.retrieve(transaction_id).await.map(Some),
            None => gateway.find_by_reference(payment.id).await,
        };

        let outcome = match polled {
            Ok(Some(outcome)) => outcome,
            Ok(None) if abandoned => {
                tracing::info!(payment_id = %payment.id, "No charge at provider, cancelling");
                return self
                    .apply(&payment, TransitionTrigger::Voided, abandon_fields())
                    .await;
            }
            Ok(None) => return SweepResult::Unchanged,
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    transaction_id = payment.transaction_id.as_deref().unwrap_or("-"),
                    error = %e,
                    "Status poll failed"
                );
                return SweepResult::Error;
            }
        };

        match &outcome {
            ChargeOutcome::Succeeded { .. } => {
                let fields = charge_fields(&outcome, "status_poll");
                self.apply(&payment, TransitionTrigger::PaymentSucceeded, fields)
                    .await
            }
            ChargeOutcome::Declined { .. } => {
                let fields = charge_fields(&outcome, "status_poll");
                self.apply(&payment, TransitionTrigger::PaymentFailed, fields)
                    .await
            }
            ChargeOutcome::ActionRequired { transaction_id, .. } if abandoned => {
                // Cancelled locally only once the provider can no longer take funds
                let request = VoidRequest {
                    payment_id: payment.id,
                    transaction_id: transaction_id.clone(),
                    reason: VoidReason::Abandoned,
                };
                match gateway.void(request).await {
                    Ok(raw) => {
                        let fields = abandon_fields()
                            .with_transaction_id(transaction_id.clone())
                            .with_gateway_response("void", raw);
                        self.apply(&payment, TransitionTrigger::Voided, fields).await
                    }
                    Err(e) => {
                        tracing::warn!(
                            payment_id = %payment.id,
                            transaction_id = %transaction_id,
                            error = %e,
                            "Void of abandoned payment failed"
                        );
                        SweepResult::Error
                    }
                }
            }
            ChargeOutcome::ActionRequired { .. } if payment.transaction_id.is_none() => {
                // Record the id so the provider's webhooks can find the payment
                let fields = charge_fields(&outcome, "status_poll");
                self.apply(&payment, TransitionTrigger::ActionRequired, fields)
                    .await
            }
            ChargeOutcome::ActionRequired { .. } => {
                tracing::debug!(payment_id = %payment.id, "Stale payment still awaiting payer");
                SweepResult::Unchanged
            }
        }
    }

    async fn apply(
        &self,
        payment: &Payment,
        trigger: TransitionTrigger,
        fields: TransitionFields,
    ) -> SweepResult {
        match commit(
            self.store.as_ref(),
            &self.sync,
            &self.notifier,
            &PaymentLookup::Id(payment.id),
            trigger,
            fields,
        )
        .await
        {
            Ok(TransitionOutcome::Applied(p)) => SweepResult::Moved(p.status),
            Ok(TransitionOutcome::Skipped(_)) => SweepResult::Unchanged,
            Err(e) => {
                tracing::error!(payment_id = %payment.id, error = %e, "Sweep transition failed");
                SweepResult::Error
            }
        }
    }
}

fn abandon_fields() -> TransitionFields {
    TransitionFields::default().with_failure_reason("abandoned")
}

//! The one path by which handlers change a payment's status.

use crate::application::{OrderStatusSynchronizer, PaymentNotifier};
use crate::domain::foundation::DomainError;
use crate::domain::payment::{
    PaymentLookup, PaymentStatus, TransitionFields, TransitionOutcome, TransitionTrigger,
};
use crate::ports::{ChargeOutcome, PaymentStore};

/// Applies `trigger` through the guarded store transition, then, only if
/// it took effect, projects the result onto the order and notifies.
/// A payment that completes also voids the other open attempts on its order.
pub(super) async fn commit(
    store: &dyn PaymentStore,
    sync: &OrderStatusSynchronizer,
    notifier: &PaymentNotifier,
    lookup: &PaymentLookup,
    trigger: TransitionTrigger,
    fields: TransitionFields,
) -> Result<TransitionOutcome, DomainError> {
    let outcome = store
        .apply_transition(lookup, Some(trigger.allowed_from()), trigger.target(), fields)
        .await?;

    match &outcome {
        TransitionOutcome::Applied(payment) => {
            tracing::info!(
                payment_id = %payment.id,
                trigger = trigger.as_str(),
                status = %payment.status,
                "Payment transition applied"
            );
            sync.sync_logged(payment).await;
            if payment.status == PaymentStatus::Completed {
                sync.void_superseded(payment).await;
            }
            notifier.notify_outcome(payment).await;
        }
        TransitionOutcome::Skipped(payment) => {
            tracing::info!(
                payment_id = %payment.id,
                trigger = trigger.as_str(),
                status = %payment.status,
                "Payment transition skipped, stale or duplicate"
            );
        }
    }
    Ok(outcome)
}

/// Fields recorded for a gateway charge outcome under `audit_key`.
pub(super) fn charge_fields(outcome: &ChargeOutcome, audit_key: &str) -> TransitionFields {
    let fields = TransitionFields::default().with_gateway_response(audit_key, outcome.raw().clone());
    match outcome {
        ChargeOutcome::Succeeded {
            transaction_id,
            capture_id,
            ..
        } => fields
            .with_transaction_id(transaction_id.clone())
            .with_capture_id(capture_id.clone())
            .processed_now(),
        ChargeOutcome::ActionRequired {
            transaction_id,
            approval_url,
            ..
        } => fields
            .with_transaction_id(transaction_id.clone())
            .with_approval_url(approval_url.clone()),
        ChargeOutcome::Declined {
            transaction_id,
            reason,
            ..
        } => {
            let fields = fields.with_failure_reason(reason.clone());
            match transaction_id {
                Some(tx) => fields.with_transaction_id(tx.clone()),
                None => fields,
            }
        }
    }
}

//! HandleStripeWebhookHandler - Command handler for Stripe webhook deliveries.

use std::sync::Arc;

use super::webhook_reconciler::{WebhookOutcome, WebhookReconciler};
use crate::domain::payment::WebhookError;
use crate::ports::WebhookRequest;

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Command to process a Stripe webhook.
#[derive(Debug, Clone)]
pub struct HandleStripeWebhookCommand {
    /// Raw request body, exactly as received. The signature covers these bytes.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header value.
    pub signature: Option<String>,
}

pub struct HandleStripeWebhookHandler {
    reconciler: Arc<WebhookReconciler>,
}

impl HandleStripeWebhookHandler {
    pub fn new(reconciler: Arc<WebhookReconciler>) -> Self {
        Self { reconciler }
    }

    pub async fn handle(
        &self,
        cmd: HandleStripeWebhookCommand,
    ) -> Result<WebhookOutcome, WebhookError> {
        let mut request = WebhookRequest::new(cmd.payload);
        if let Some(signature) = cmd.signature {
            request = request.with_header(STRIPE_SIGNATURE_HEADER, signature);
        }
        self.reconciler.reconcile(&request).await
    }
}

//! HandlePayPalWebhookHandler - Command handler for PayPal webhook deliveries.
//!
//! PayPal signatures cannot be checked locally; the gateway asks PayPal to
//! verify the transmission before the event is trusted.

use std::collections::HashMap;
use std::sync::Arc;

use super::webhook_reconciler::{WebhookOutcome, WebhookReconciler};
use crate::domain::payment::WebhookError;
use crate::ports::WebhookRequest;

/// Command to process a PayPal webhook.
#[derive(Debug, Clone)]
pub struct HandlePayPalWebhookCommand {
    pub payload: Vec<u8>,
    /// Request headers; the `PAYPAL-*` transmission headers are required.
    pub headers: HashMap<String, String>,
}

pub struct HandlePayPalWebhookHandler {
    reconciler: Arc<WebhookReconciler>,
}

impl HandlePayPalWebhookHandler {
    pub fn new(reconciler: Arc<WebhookReconciler>) -> Self {
        Self { reconciler }
    }

    pub async fn handle(
        &self,
        cmd: HandlePayPalWebhookCommand,
    ) -> Result<WebhookOutcome, WebhookError> {
        let request = cmd
            .headers
            .into_iter()
            .fold(WebhookRequest::new(cmd.payload), |req, (name, value)| {
                req.with_header(&name, value)
            });
        self.reconciler.reconcile(&request).await
    }
}

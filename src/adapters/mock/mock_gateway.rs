//! Mock payment gateway for testing.
//!
//! Scripted outcomes per operation, error injection and a call log. Without a
//! script every call succeeds the way the configured provider normally would:
//! Stripe charges settle immediately, PayPal orders wait for approval.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::json;

use crate::domain::foundation::PaymentId;
use crate::domain::payment::{GatewayEvent, PaymentMethod};
use crate::ports::{
    CaptureRequest, ChargeOutcome, GatewayError, InitiatePaymentRequest, PaymentGateway,
    RefundOutcome, RefundRequest, VoidRequest, WebhookRequest,
};

/// Mock gateway.
///
/// # Example
///
/// ```ignore
/// let gateway = MockPaymentGateway::new(PaymentMethod::Stripe);
/// gateway.push_initiate(Err(GatewayError::timeout("slow")));
/// let outcome = gateway.initiate(request).await;
/// assert!(gateway.was_called("initiate"));
/// ```
#[derive(Clone)]
pub struct MockPaymentGateway {
    method: PaymentMethod,
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    initiate: VecDeque<Result<ChargeOutcome, GatewayError>>,
    capture: VecDeque<Result<ChargeOutcome, GatewayError>>,
    refund: VecDeque<Result<RefundOutcome, GatewayError>>,
    retrieve: HashMap<String, Result<ChargeOutcome, GatewayError>>,
    references: HashMap<PaymentId, Result<Option<ChargeOutcome>, GatewayError>>,
    void: VecDeque<Result<serde_json::Value, GatewayError>>,
    webhook_events: VecDeque<GatewayEvent>,
    reject_webhooks: bool,
    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentGateway {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// A gateway that fails every webhook verification.
    pub fn rejecting_webhooks(method: PaymentMethod) -> Self {
        let mock = Self::new(method);
        mock.state().reject_webhooks = true;
        mock
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Scripting
    // ════════════════════════════════════════════════════════════════════════════

    /// Queues the result of the next `initiate` call.
    pub fn push_initiate(&self, result: Result<ChargeOutcome, GatewayError>) {
        self.state().initiate.push_back(result);
    }

    pub fn push_capture(&self, result: Result<ChargeOutcome, GatewayError>) {
        self.state().capture.push_back(result);
    }

    pub fn push_refund(&self, result: Result<RefundOutcome, GatewayError>) {
        self.state().refund.push_back(result);
    }

    /// Sets what `retrieve` reports for a transaction.
    pub fn set_retrieve(&self, transaction_id: &str, result: Result<ChargeOutcome, GatewayError>) {
        self.state()
            .retrieve
            .insert(transaction_id.to_string(), result);
    }

    /// Sets what `find_by_reference` reports for a payment. Unset payments
    /// have no charge at the provider.
    pub fn set_reference(
        &self,
        payment_id: PaymentId,
        result: Result<Option<ChargeOutcome>, GatewayError>,
    ) {
        self.state().references.insert(payment_id, result);
    }

    pub fn push_void(&self, result: Result<serde_json::Value, GatewayError>) {
        self.state().void.push_back(result);
    }

    /// Queues the event returned by the next accepted webhook.
    pub fn push_webhook_event(&self, event: GatewayEvent) {
        self.state().webhook_events.push_back(event);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn transaction_prefix(&self) -> &'static str {
        match self.method {
            PaymentMethod::Stripe => "pi_mock",
            PaymentMethod::PayPal => "PAYPAL-ORDER-MOCK",
        }
    }
}

fn short_id(id: impl ToString) -> String {
    id.to_string().chars().take(8).collect()
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn initiate(&self, request: InitiatePaymentRequest) -> Result<ChargeOutcome, GatewayError> {
        self.record_call(
            "initiate",
            vec![
                request.payment_id.to_string(),
                request.amount.to_string(),
                request.payment_method_ref.clone().unwrap_or_default(),
            ],
        );
        if let Some(result) = self.state().initiate.pop_front() {
            return result;
        }

        let transaction_id = format!("{}_{}", self.transaction_prefix(), short_id(request.payment_id));
        Ok(match self.method {
            PaymentMethod::Stripe => ChargeOutcome::Succeeded {
                capture_id: Some(format!("ch_mock_{}", short_id(request.payment_id))),
                raw: json!({ "id": transaction_id, "status": "succeeded" }),
                transaction_id,
            },
            PaymentMethod::PayPal => ChargeOutcome::ActionRequired {
                approval_url: Some(format!(
                    "https://paypal.mock/checkoutnow?token={}",
                    transaction_id
                )),
                raw: json!({ "id": transaction_id, "status": "CREATED" }),
                transaction_id,
            },
        })
    }

    async fn capture(&self, request: CaptureRequest) -> Result<ChargeOutcome, GatewayError> {
        self.record_call("capture", vec![request.transaction_id.clone()]);
        if let Some(result) = self.state().capture.pop_front() {
            return result;
        }
        Ok(ChargeOutcome::Succeeded {
            capture_id: Some(format!("CAPTURE-MOCK-{}", short_id(request.payment_id))),
            raw: json!({ "id": request.transaction_id, "status": "COMPLETED" }),
            transaction_id: request.transaction_id,
        })
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        self.record_call(
            "refund",
            vec![
                request.transaction_id.clone(),
                request
                    .amount
                    .as_ref()
                    .map(|a| a.amount_minor.to_string())
                    .unwrap_or_else(|| "full".to_string()),
            ],
        );
        if let Some(result) = self.state().refund.pop_front() {
            return result;
        }
        let refund_id = format!("re_mock_{}", short_id(request.payment_id));
        Ok(RefundOutcome::Succeeded {
            raw: json!({ "id": refund_id, "status": "succeeded" }),
            refund_id,
            status: "succeeded".to_string(),
        })
    }

    async fn retrieve(&self, transaction_id: &str) -> Result<ChargeOutcome, GatewayError> {
        self.record_call("retrieve", vec![transaction_id.to_string()]);
        match self.state().retrieve.get(transaction_id) {
            Some(result) => result.clone(),
            None => Err(GatewayError::new(
                crate::ports::GatewayErrorCode::NotFound,
                format!("No such transaction: {}", transaction_id),
            )),
        }
    }

    async fn find_by_reference(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<ChargeOutcome>, GatewayError> {
        self.record_call("find_by_reference", vec![payment_id.to_string()]);
        self.state()
            .references
            .get(&payment_id)
            .cloned()
            .unwrap_or(Ok(None))
    }

    async fn void(&self, request: VoidRequest) -> Result<serde_json::Value, GatewayError> {
        self.record_call(
            "void",
            vec![request.transaction_id.clone(), request.reason.as_str().to_string()],
        );
        if let Some(result) = self.state().void.pop_front() {
            return result;
        }
        Ok(json!({ "id": request.transaction_id, "status": "canceled" }))
    }

    async fn verify_webhook(&self, request: &WebhookRequest) -> Result<GatewayEvent, GatewayError> {
        self.record_call("verify_webhook", vec![request.body.len().to_string()]);
        let mut state = self.state();
        if state.reject_webhooks {
            return Err(GatewayError::invalid_webhook("Invalid signature"));
        }
        state
            .webhook_events
            .pop_front()
            .ok_or_else(|| GatewayError::malformed_webhook("No webhook event scripted"))
    }
}

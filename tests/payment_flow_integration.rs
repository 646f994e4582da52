//! End-to-end payment flows over the HTTP router.
//!
//! Each test wires the real router, handlers and in-memory adapters. Gateway
//! charges are scripted; Stripe webhooks are signed with a real secret and
//! verified by the real Stripe adapter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::{json, Value};
use sha2::Sha256;
use tower::ServiceExt;

use order_payments::adapters::http::{payment_router, PaymentAppState};
use order_payments::adapters::memory::{
    InMemoryOrderRepository, InMemoryPaymentStore, InMemoryUserDirectory,
};
use order_payments::adapters::mock::MockPaymentGateway;
use order_payments::adapters::notifications::RecordingNotificationDispatcher;
use order_payments::adapters::stripe::{StripeConfig, StripeGateway};
use order_payments::application::{GatewayRegistry, OrderStatusSynchronizer, PaymentNotifier};
use order_payments::domain::foundation::{DomainError, OrderId, PaymentId, Timestamp, UserId};
use order_payments::domain::payment::{
    Currency, GatewayEvent, Money, OrderPaymentStatus, Payment, PaymentLookup, PaymentMethod,
    PaymentStatus, TransitionFields, TransitionOutcome,
};
use order_payments::ports::{
    CaptureRequest, ChargeOutcome, GatewayError, InitiatePaymentRequest, OrderSnapshot,
    PaymentGateway, PaymentStore, RefundOutcome, RefundRequest, UserContact, VoidRequest,
    WebhookRequest,
};

const WEBHOOK_SECRET: &str = "whsec_integration_secret";
const OWNER: &str = "user-42";

// =============================================================================
// Test Infrastructure
// =============================================================================

fn stripe_verifier() -> StripeGateway {
    StripeGateway::new(StripeConfig::new(
        SecretString::new("sk_test_integration".to_string()),
        SecretString::new(WEBHOOK_SECRET.to_string()),
    ))
    .unwrap()
}

/// Scripted charges with real Stripe signature verification.
struct SignedStripe {
    charges: MockPaymentGateway,
    verifier: StripeGateway,
}

#[async_trait]
impl PaymentGateway for SignedStripe {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn initiate(&self, request: InitiatePaymentRequest) -> Result<ChargeOutcome, GatewayError> {
        self.charges.initiate(request).await
    }

    async fn capture(&self, request: CaptureRequest) -> Result<ChargeOutcome, GatewayError> {
        self.charges.capture(request).await
    }

    async fn refund(&self, request: RefundRequest) -> Result<RefundOutcome, GatewayError> {
        self.charges.refund(request).await
    }

    async fn retrieve(&self, transaction_id: &str) -> Result<ChargeOutcome, GatewayError> {
        self.charges.retrieve(transaction_id).await
    }

    async fn find_by_reference(
        &self,
        payment_id: PaymentId,
    ) -> Result<Option<ChargeOutcome>, GatewayError> {
        self.charges.find_by_reference(payment_id).await
    }

    async fn void(&self, request: VoidRequest) -> Result<Value, GatewayError> {
        self.charges.void(request).await
    }

    async fn verify_webhook(&self, request: &WebhookRequest) -> Result<GatewayEvent, GatewayError> {
        self.verifier.verify_webhook(request).await
    }
}

/// Counts every read and write that reaches the store.
#[derive(Clone)]
struct CountingStore {
    inner: InMemoryPaymentStore,
    touches: Arc<AtomicUsize>,
}

impl CountingStore {
    fn touches(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.touches.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentStore for CountingStore {
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError> {
        self.touch();
        self.inner.insert(payment).await
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        self.touch();
        self.inner.find_by_id(id).await
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        self.touch();
        self.inner.find_by_transaction_id(transaction_id).await
    }

    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Vec<Payment>, DomainError> {
        self.touch();
        self.inner.find_by_order_id(order_id).await
    }

    async fn apply_transition(
        &self,
        lookup: &PaymentLookup,
        expected: Option<&[PaymentStatus]>,
        new_status: PaymentStatus,
        fields: TransitionFields,
    ) -> Result<TransitionOutcome, DomainError> {
        self.touch();
        self.inner
            .apply_transition(lookup, expected, new_status, fields)
            .await
    }

    async fn find_stale(
        &self,
        statuses: &[PaymentStatus],
        older_than: Timestamp,
        limit: u32,
    ) -> Result<Vec<Payment>, DomainError> {
        self.touch();
        self.inner.find_stale(statuses, older_than, limit).await
    }
}

struct TestApp {
    router: Router,
    store: CountingStore,
    orders: InMemoryOrderRepository,
    notifications: RecordingNotificationDispatcher,
    stripe: MockPaymentGateway,
    paypal: MockPaymentGateway,
}

impl TestApp {
    async fn new() -> Self {
        let stripe = MockPaymentGateway::new(PaymentMethod::Stripe);
        let gateway = SignedStripe {
            charges: stripe.clone(),
            verifier: stripe_verifier(),
        };
        Self::with_stripe(Arc::new(gateway), stripe).await
    }

    async fn with_stripe(gateway: Arc<dyn PaymentGateway>, stripe: MockPaymentGateway) -> Self {
        let store = CountingStore {
            inner: InMemoryPaymentStore::new(),
            touches: Arc::new(AtomicUsize::new(0)),
        };
        let orders = InMemoryOrderRepository::new();
        let users = InMemoryUserDirectory::new();
        users
            .insert(
                UserId::new(OWNER).unwrap(),
                UserContact {
                    name: "Grace Hopper".to_string(),
                    email: "grace@example.com".to_string(),
                },
            )
            .await;
        let notifications = RecordingNotificationDispatcher::new();
        let paypal = MockPaymentGateway::new(PaymentMethod::PayPal);

        let gateways = GatewayRegistry::new()
            .with_gateway(gateway)
            .with_gateway(Arc::new(paypal.clone()));
        let sync = OrderStatusSynchronizer::new(Arc::new(orders.clone()), Arc::new(store.clone()))
            .with_gateways(gateways.clone());

        let state = PaymentAppState {
            store: Arc::new(store.clone()),
            orders: Arc::new(orders.clone()),
            gateways,
            sync: Arc::new(sync),
            notifier: Arc::new(PaymentNotifier::new(
                Arc::new(notifications.clone()),
                Arc::new(orders.clone()),
                Arc::new(users),
            )),
        };

        Self {
            router: payment_router().with_state(state),
            store,
            orders,
            notifications,
            stripe,
            paypal,
        }
    }

    async fn order(&self, total_minor: i64) -> OrderSnapshot {
        let order = OrderSnapshot {
            id: OrderId::new(),
            user_id: UserId::new(OWNER).unwrap(),
            order_number: "ORD-9000".to_string(),
            total: Money::new(total_minor, Currency::new("USD").unwrap()).unwrap(),
            payment_status: OrderPaymentStatus::Pending,
        };
        self.orders.insert(order.clone()).await;
        order
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn stored(&self, id: &str) -> Payment {
        let id: PaymentId = id.parse().unwrap();
        self.store.inner.find_by_id(&id).await.unwrap().unwrap()
    }
}

fn authed_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", OWNER)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn stripe_webhook(body: &str, signature: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/payments/webhook/stripe")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn sign(payload: &str) -> String {
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    let hex: String = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("t={},v1={}", timestamp, hex)
}

fn intent_succeeded(event_id: &str, intent_id: &str, amount: i64) -> String {
    json!({
        "id": event_id,
        "type": "payment_intent.succeeded",
        "created": 1704067200,
        "livemode": false,
        "data": { "object": {
            "id": intent_id,
            "object": "payment_intent",
            "status": "succeeded",
            "amount": amount,
            "currency": "usd",
            "metadata": {}
        }}
    })
    .to_string()
}

// =============================================================================
// Scenario A: immediate Stripe charge, duplicate webhook is a no-op
// =============================================================================

#[tokio::test]
async fn stripe_charge_completes_synchronously_and_late_webhook_changes_nothing() {
    let app = TestApp::new().await;
    let order = app.order(4_999).await;

    let (status, body) = app
        .send(authed_post(
            "/payments/process",
            json!({
                "orderId": order.id.to_string(),
                "method": "STRIPE",
                "paymentDetails": { "paymentMethodId": "pm_card_visa" }
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "COMPLETED");
    let payment_id = body["id"].as_str().unwrap().to_string();
    let intent_id = body["transactionId"].as_str().unwrap().to_string();
    let settled = app.stored(&payment_id).await;

    // Same event delivered twice
    let event = intent_succeeded("evt_dup", &intent_id, 4_999);
    for _ in 0..2 {
        let (status, ack) = app.send(stripe_webhook(&event, &sign(&event))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["outcome"], "skipped");
    }

    assert_eq!(app.stored(&payment_id).await, settled);
    assert_eq!(
        app.orders.status_writes().await,
        vec![(order.id, OrderPaymentStatus::Paid)]
    );
    assert_eq!(app.notifications.kinds(), vec!["payment_success"]);
}

#[tokio::test]
async fn webhook_completes_a_charge_that_needed_authentication() {
    let app = TestApp::new().await;
    let order = app.order(4_999).await;
    app.stripe.push_initiate(Ok(ChargeOutcome::ActionRequired {
        transaction_id: "pi_3ds".to_string(),
        approval_url: Some("https://hooks.stripe.test/3ds".to_string()),
        raw: json!({ "id": "pi_3ds", "status": "requires_action" }),
    }));

    let (status, body) = app
        .send(authed_post(
            "/payments/process",
            json!({
                "orderId": order.id.to_string(),
                "method": "STRIPE",
                "paymentDetails": { "paymentMethodId": "pm_card_threeDSecure2Required" }
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["awaitingConfirmation"], true);

    let event = intent_succeeded("evt_3ds", "pi_3ds", 4_999);
    let (status, ack) = app.send(stripe_webhook(&event, &sign(&event))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "applied");
    let payment = app.stored(body["id"].as_str().unwrap()).await;
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(payment
        .gateway_response
        .get("webhook:payment_intent.succeeded")
        .is_some());
    assert_eq!(
        app.orders.payment_status(&order.id).await,
        Some(OrderPaymentStatus::Paid)
    );
}

// =============================================================================
// Scenario B: PayPal approval then capture
// =============================================================================

#[tokio::test]
async fn paypal_order_waits_for_approval_then_capture_pays_the_order() {
    let app = TestApp::new().await;
    let order = app.order(12_000).await;

    let (status, body) = app
        .send(authed_post(
            "/payments/process",
            json!({
                "orderId": order.id.to_string(),
                "method": "PAYPAL",
                "paymentDetails": {
                    "returnUrl": "https://shop.test/paypal/return",
                    "cancelUrl": "https://shop.test/paypal/cancel"
                }
            }),
        ))
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "PENDING");
    assert!(body["approvalUrl"].as_str().is_some());
    assert_eq!(
        app.orders.payment_status(&order.id).await,
        Some(OrderPaymentStatus::Pending)
    );

    let payment_id = body["id"].as_str().unwrap().to_string();
    let (status, body) = app
        .send(authed_post(
            &format!("/payments/{}/capture", payment_id),
            json!({}),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(
        app.orders.payment_status(&order.id).await,
        Some(OrderPaymentStatus::Paid)
    );
    assert!(app.stored(&payment_id).await.capture_id.is_some());
    assert_eq!(app.paypal.call_count("capture"), 1);

    // A second capture is a conflict and never reaches PayPal
    let (status, body) = app
        .send(authed_post(
            &format!("/payments/{}/capture", payment_id),
            json!({}),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "INVALID_STATE_TRANSITION");
    assert_eq!(app.paypal.call_count("capture"), 1);
}

// =============================================================================
// Scenario C: partial refund
// =============================================================================

#[tokio::test]
async fn partial_refund_of_hundred_dollar_order_refunds_the_order() {
    let app = TestApp::new().await;
    let order = app.order(10_000).await;

    let (_, body) = app
        .send(authed_post(
            "/payments/process",
            json!({
                "orderId": order.id.to_string(),
                "method": "STRIPE",
                "paymentDetails": { "paymentMethodId": "pm_card_visa" }
            }),
        ))
        .await;
    assert_eq!(body["status"], "COMPLETED");
    let payment_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .send(authed_post(
            &format!("/payments/{}/refund", payment_id),
            json!({ "amount": 5_000, "reason": "requested_by_customer" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REFUNDED");
    assert_eq!(body["refundAmount"], 5_000);
    assert_eq!(
        app.orders.payment_status(&order.id).await,
        Some(OrderPaymentStatus::Refunded)
    );
    assert_eq!(
        app.notifications.kinds(),
        vec!["payment_success", "payment_refunded"]
    );

    // Refunded is terminal
    let (status, _) = app
        .send(authed_post(
            &format!("/payments/{}/refund", payment_id),
            json!({ "amount": 1_000 }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.stripe.call_count("refund"), 1);
}

#[tokio::test]
async fn order_cannot_be_paid_twice() {
    let app = TestApp::new().await;
    let order = app.order(2_000).await;
    let request = json!({
        "orderId": order.id.to_string(),
        "method": "STRIPE",
        "paymentDetails": { "paymentMethodId": "pm_card_visa" }
    });

    let (status, _) = app.send(authed_post("/payments/process", request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.send(authed_post("/payments/process", request)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "ORDER_ALREADY_PAID");
    assert_eq!(app.stripe.call_count("initiate"), 1);
}

#[tokio::test]
async fn late_failure_of_an_abandoned_attempt_keeps_the_order_paid() {
    let app = TestApp::new().await;
    let order = app.order(7_500).await;
    let pay = json!({
        "orderId": order.id.to_string(),
        "method": "STRIPE",
        "paymentDetails": { "paymentMethodId": "pm_card_visa" }
    });

    // First attempt stalls in 3-D Secure
    app.stripe.push_initiate(Ok(ChargeOutcome::ActionRequired {
        transaction_id: "pi_first".to_string(),
        approval_url: Some("https://hooks.stripe.test/3ds".to_string()),
        raw: json!({ "id": "pi_first", "status": "requires_action" }),
    }));
    let (status, first) = app.send(authed_post("/payments/process", pay.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // A second attempt with another card goes through
    let (status, second) = app.send(authed_post("/payments/process", pay.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["status"], "COMPLETED");

    // The stalled intent was cancelled at Stripe and locally
    let first_id = first["id"].as_str().unwrap().to_string();
    assert_eq!(app.stored(&first_id).await.status, PaymentStatus::Cancelled);
    assert_eq!(app.stripe.call_count("void"), 1);

    // Stripe still reports the abandoned intent failing
    let failed = json!({
        "id": "evt_first_failed",
        "type": "payment_intent.payment_failed",
        "created": 1704067200,
        "livemode": false,
        "data": { "object": {
            "id": "pi_first",
            "object": "payment_intent",
            "status": "requires_payment_method",
            "amount": 7_500,
            "currency": "usd",
            "metadata": {},
            "last_payment_error": { "type": "card_error", "code": "card_declined", "message": "Declined" }
        }}
    })
    .to_string();
    let (status, _) = app.send(stripe_webhook(&failed, &sign(&failed))).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(
        app.orders.payment_status(&order.id).await,
        Some(OrderPaymentStatus::Paid)
    );
    let second_id = second["id"].as_str().unwrap().to_string();
    assert_eq!(app.stored(&second_id).await.status, PaymentStatus::Completed);

    // No third charge
    let (status, body) = app.send(authed_post("/payments/process", pay)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "ORDER_ALREADY_PAID");
    assert_eq!(app.stripe.call_count("initiate"), 2);
}

#[tokio::test]
async fn late_failure_webhook_for_an_older_attempt_cannot_unpay_the_order() {
    let app = TestApp::new().await;
    let order = app.order(7_500).await;

    // An older attempt whose void never happened, e.g. Stripe was unreachable
    let mut older = Payment::start(
        order.id,
        order.user_id.clone(),
        order.total.clone(),
        PaymentMethod::Stripe,
    );
    older.status = PaymentStatus::Pending;
    older.transaction_id = Some("pi_older".to_string());
    app.store.inner.insert(&older).await.unwrap();
    app.stripe
        .push_void(Err(GatewayError::network("connection reset")));

    let (status, paid) = app
        .send(authed_post(
            "/payments/process",
            json!({
                "orderId": order.id.to_string(),
                "method": "STRIPE",
                "paymentDetails": { "paymentMethodId": "pm_card_visa" }
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        app.store.inner.find_by_id(&older.id).await.unwrap().unwrap().status,
        PaymentStatus::Pending
    );

    let failed = json!({
        "id": "evt_older_failed",
        "type": "payment_intent.payment_failed",
        "created": 1704067200,
        "livemode": false,
        "data": { "object": {
            "id": "pi_older",
            "object": "payment_intent",
            "status": "requires_payment_method",
            "amount": 7_500,
            "currency": "usd",
            "metadata": {},
            "last_payment_error": { "type": "card_error", "code": "card_declined", "message": "Declined" }
        }}
    })
    .to_string();
    let (status, ack) = app.send(stripe_webhook(&failed, &sign(&failed))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "applied");
    assert_eq!(
        app.store.inner.find_by_id(&older.id).await.unwrap().unwrap().status,
        PaymentStatus::Failed
    );
    assert_eq!(app.stored(paid["id"].as_str().unwrap()).await.status, PaymentStatus::Completed);
    assert_eq!(
        app.orders.payment_status(&order.id).await,
        Some(OrderPaymentStatus::Paid)
    );

    let (status, _) = app
        .send(authed_post(
            "/payments/process",
            json!({
                "orderId": order.id.to_string(),
                "method": "STRIPE",
                "paymentDetails": { "paymentMethodId": "pm_card_visa" }
            }),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.stripe.call_count("initiate"), 1);
}

// =============================================================================
// Scenario D: forged Stripe webhook
// =============================================================================

#[tokio::test]
async fn forged_stripe_webhook_is_rejected_before_any_lookup() {
    let app = TestApp::with_stripe(
        Arc::new(stripe_verifier()),
        MockPaymentGateway::new(PaymentMethod::Stripe),
    )
    .await;
    let order = app.order(4_999).await;
    let mut payment = Payment::start(
        order.id,
        order.user_id.clone(),
        order.total.clone(),
        PaymentMethod::Stripe,
    );
    payment.transaction_id = Some("pi_victim".to_string());
    app.store.inner.insert(&payment).await.unwrap();
    let before = app.store.touches();

    let event = intent_succeeded("evt_forged", "pi_victim", 4_999);
    let forged = format!(
        "t={},v1={}",
        chrono::Utc::now().timestamp(),
        "ab".repeat(32)
    );
    let (status, body) = app.send(stripe_webhook(&event, &forged)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_WEBHOOK_SIGNATURE");
    assert_eq!(app.store.touches(), before);
    assert_eq!(
        app.store.inner.find_by_id(&payment.id).await.unwrap().unwrap(),
        payment
    );
    assert!(app.orders.status_writes().await.is_empty());
    assert!(app.notifications.sent().is_empty());
}

#[tokio::test]
async fn webhook_without_signature_header_is_rejected() {
    let app = TestApp::new().await;
    let event = intent_succeeded("evt_unsigned", "pi_x", 100);

    let (status, _) = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/payments/webhook/stripe")
                .body(Body::from(event))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.touches(), 0);
}

#[tokio::test]
async fn signed_webhook_for_unknown_intent_is_acknowledged() {
    let app = TestApp::new().await;
    let event = intent_succeeded("evt_stranger", "pi_not_ours", 100);

    let (status, ack) = app.send(stripe_webhook(&event, &sign(&event))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "unmatched");
}

#[tokio::test]
async fn signed_event_with_unreadable_object_is_acknowledged_as_ignored() {
    let app = TestApp::new().await;
    let order = app.order(4_999).await;
    let mut payment = Payment::start(
        order.id,
        order.user_id.clone(),
        order.total.clone(),
        PaymentMethod::Stripe,
    );
    payment.status = PaymentStatus::Pending;
    payment.transaction_id = Some("pi_pending".to_string());
    app.store.inner.insert(&payment).await.unwrap();

    // payment_intent.succeeded whose intent lacks its id and status
    let event = json!({
        "id": "evt_unreadable",
        "type": "payment_intent.succeeded",
        "created": 1704067200,
        "livemode": false,
        "data": { "object": { "object": "payment_intent", "amount": 4_999 } }
    })
    .to_string();
    let (status, ack) = app.send(stripe_webhook(&event, &sign(&event))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "ignored");
    assert_eq!(
        app.store.inner.find_by_id(&payment.id).await.unwrap().unwrap(),
        payment
    );
    assert!(app.orders.status_writes().await.is_empty());
}

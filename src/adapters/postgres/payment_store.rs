//! PostgreSQL implementation of PaymentStore.
//!
//! A guarded transition is one `UPDATE ... WHERE status = ANY($n) RETURNING`
//! statement. When it touches no row a follow-up read tells a stale event
//! (payment exists, wrong status) from an unknown payment.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{
    DomainError, ErrorCode, OrderId, PaymentId, Timestamp, UserId,
};
use crate::domain::payment::{
    effective_sources, Currency, Money, Payment, PaymentLookup, PaymentMethod, PaymentStatus,
    TransitionFields, TransitionOutcome,
};
use crate::ports::PaymentStore;

const COMPLETED_PER_ORDER_CONSTRAINT: &str = "payments_one_completed_per_order";
const REFUND_RANGE_CONSTRAINT: &str = "payments_refund_amount_range";

const PAYMENT_COLUMNS: &str = "id, order_id, user_id, amount_minor, currency, method, status, \
     transaction_id, capture_id, approval_url, gateway_response, failure_reason, refund_id, \
     refund_amount, processed_at, created_at, updated_at";

pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_lookup(&self, lookup: &PaymentLookup) -> Result<Option<Payment>, DomainError> {
        match lookup {
            PaymentLookup::Id(id) => self.find_by_id(id).await,
            PaymentLookup::TransactionId(tx) => self.find_by_transaction_id(tx).await,
        }
    }
}

/// Database row representation of a payment.
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    order_id: Uuid,
    user_id: String,
    amount_minor: i64,
    currency: String,
    method: String,
    status: String,
    transaction_id: Option<String>,
    capture_id: Option<String>,
    approval_url: Option<String>,
    gateway_response: Value,
    failure_reason: Option<String>,
    refund_id: Option<String>,
    refund_amount: Option<i64>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(
        ErrorCode::DatabaseError,
        format!("Invalid {} value: {}", column, err),
    )
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let currency = Currency::new(row.currency.trim()).map_err(|e| corrupt("currency", e))?;
        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            order_id: OrderId::from_uuid(row.order_id),
            user_id: UserId::new(row.user_id).map_err(|e| corrupt("user_id", e))?,
            amount: Money::new(row.amount_minor, currency).map_err(|e| corrupt("amount", e))?,
            method: row
                .method
                .parse::<PaymentMethod>()
                .map_err(|e| corrupt("method", e))?,
            status: row
                .status
                .parse::<PaymentStatus>()
                .map_err(|e| corrupt("status", e))?,
            transaction_id: row.transaction_id,
            capture_id: row.capture_id,
            approval_url: row.approval_url,
            gateway_response: row.gateway_response,
            failure_reason: row.failure_reason,
            refund_id: row.refund_id,
            refund_amount: row.refund_amount,
            processed_at: row.processed_at.map(Timestamp::from_datetime),
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn db_error(context: &str, err: sqlx::Error) -> DomainError {
    tracing::error!(error = %err, "{}", context);
    DomainError::database(format!("{}: {}", context, err))
}

fn constraint_of(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

/// The single audit entry a transition merges into `gateway_response`.
fn audit_patch(fields: &TransitionFields) -> Value {
    let mut patch = Map::new();
    if let Some(entry) = &fields.gateway_response {
        patch.insert(entry.key.clone(), entry.payload.clone());
    }
    Value::Object(patch)
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, user_id, amount_minor, currency, method, status,
                transaction_id, capture_id, approval_url, gateway_response, failure_reason,
                refund_id, refund_amount, processed_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.user_id.as_str())
        .bind(payment.amount.amount_minor)
        .bind(payment.amount.currency.as_str())
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.transaction_id)
        .bind(&payment.capture_id)
        .bind(&payment.approval_url)
        .bind(&payment.gateway_response)
        .bind(&payment.failure_reason)
        .bind(&payment.refund_id)
        .bind(payment.refund_amount)
        .bind(payment.processed_at.map(|t| *t.as_datetime()))
        .bind(payment.created_at.as_datetime())
        .bind(payment.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if constraint_of(&e) == Some(COMPLETED_PER_ORDER_CONSTRAINT) {
                return DomainError::new(
                    ErrorCode::OrderAlreadyPaid,
                    format!("Order {} already has a completed payment", payment.order_id),
                )
                .with_detail("order_id", payment.order_id.to_string());
            }
            db_error("Failed to insert payment", e)
        })?;

        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<Payment>, DomainError> {
        let sql = format!("SELECT {} FROM payments WHERE id = $1", PAYMENT_COLUMNS);
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load payment", e))?;
        row.map(Payment::try_from).transpose()
    }

    async fn find_by_transaction_id(
        &self,
        transaction_id: &str,
    ) -> Result<Option<Payment>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payments \
             WHERE transaction_id = $1 OR capture_id = $1 \
             ORDER BY (transaction_id = $1) DESC NULLS LAST \
             LIMIT 1",
            PAYMENT_COLUMNS
        );
        let row: Option<PaymentRow> = sqlx::query_as(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load payment by transaction id", e))?;
        row.map(Payment::try_from).transpose()
    }

    async fn find_by_order_id(&self, order_id: &OrderId) -> Result<Vec<Payment>, DomainError> {
        let sql = format!(
            "SELECT {} FROM payments WHERE order_id = $1 ORDER BY created_at ASC",
            PAYMENT_COLUMNS
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load payments for order", e))?;
        rows.into_iter().map(Payment::try_from).collect()
    }

    async fn apply_transition(
        &self,
        lookup: &PaymentLookup,
        expected: Option<&[PaymentStatus]>,
        new_status: PaymentStatus,
        fields: TransitionFields,
    ) -> Result<TransitionOutcome, DomainError> {
        let allowed: Vec<String> = effective_sources(expected, new_status)
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let (by_id, by_transaction) = match lookup {
            PaymentLookup::Id(id) => (Some(*id.as_uuid()), None),
            PaymentLookup::TransactionId(tx) => (None, Some(tx.as_str())),
        };

        let sql = format!(
            r#"
            WITH target AS (
                SELECT id FROM payments
                WHERE ($1::uuid IS NOT NULL AND id = $1)
                   OR ($2::text IS NOT NULL AND (transaction_id = $2 OR capture_id = $2))
                ORDER BY (transaction_id = $2) DESC NULLS LAST
                LIMIT 1
            )
            UPDATE payments AS p SET
                status = $4,
                transaction_id = COALESCE(p.transaction_id, $5),
                capture_id = COALESCE(p.capture_id, $6),
                approval_url = COALESCE($7, p.approval_url),
                failure_reason = COALESCE($8, p.failure_reason),
                refund_id = COALESCE($9, p.refund_id),
                refund_amount = COALESCE($10, p.refund_amount),
                processed_at = COALESCE($11, p.processed_at),
                gateway_response = p.gateway_response || $12::jsonb,
                updated_at = NOW()
            FROM target
            WHERE p.id = target.id AND p.status = ANY($3)
            RETURNING {}
            "#,
            PAYMENT_COLUMNS
                .split(", ")
                .map(|c| format!("p.{}", c.trim()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let result: Result<Option<PaymentRow>, sqlx::Error> = sqlx::query_as(&sql)
            .bind(by_id)
            .bind(by_transaction)
            .bind(&allowed)
            .bind(new_status.as_str())
            .bind(&fields.transaction_id)
            .bind(&fields.capture_id)
            .bind(&fields.approval_url)
            .bind(&fields.failure_reason)
            .bind(&fields.refund_id)
            .bind(fields.refund_amount)
            .bind(fields.processed_at.map(|t| *t.as_datetime()))
            .bind(audit_patch(&fields))
            .fetch_optional(&self.pool)
            .await;

        match result {
            Ok(Some(row)) => {
                let payment = Payment::try_from(row)?;
                tracing::debug!(
                    payment_id = %payment.id,
                    status = %payment.status,
                    "Payment transition persisted"
                );
                Ok(TransitionOutcome::Applied(payment))
            }
            Ok(None) => match self.find_by_lookup(lookup).await? {
                Some(payment) => Ok(TransitionOutcome::Skipped(payment)),
                None => Err(DomainError::new(
                    ErrorCode::PaymentNotFound,
                    format!("Payment not found: {}", lookup),
                )
                .with_detail("lookup", lookup.to_string())),
            },
            Err(e) if constraint_of(&e) == Some(COMPLETED_PER_ORDER_CONSTRAINT) => {
                let order_id = self
                    .find_by_lookup(lookup)
                    .await?
                    .map(|p| p.order_id.to_string())
                    .unwrap_or_default();
                Err(DomainError::new(
                    ErrorCode::OrderAlreadyPaid,
                    format!("Order {} already has a completed payment", order_id),
                )
                .with_detail("order_id", order_id))
            }
            Err(e) if constraint_of(&e) == Some(REFUND_RANGE_CONSTRAINT) => Err(DomainError::new(
                ErrorCode::ValidationFailed,
                "Refund amount exceeds the payment amount",
            )
            .with_detail("field", "refund_amount")),
            Err(e) => Err(db_error("Failed to apply payment transition", e)),
        }
    }

    async fn find_stale(
        &self,
        statuses: &[PaymentStatus],
        older_than: Timestamp,
        limit: u32,
    ) -> Result<Vec<Payment>, DomainError> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();
        let sql = format!(
            "SELECT {} FROM payments \
             WHERE status = ANY($1) AND updated_at < $2 \
             ORDER BY updated_at ASC \
             LIMIT $3",
            PAYMENT_COLUMNS
        );
        let rows: Vec<PaymentRow> = sqlx::query_as(&sql)
            .bind(&statuses)
            .bind(older_than.as_datetime())
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("Failed to load stale payments", e))?;
        rows.into_iter().map(Payment::try_from).collect()
    }
}

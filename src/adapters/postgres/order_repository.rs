//! PostgreSQL implementation of OrderRepository.
//!
//! Reads the storefront `orders` table and writes only `payment_status`.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId, UserId};
use crate::domain::payment::{Currency, Money, OrderPaymentStatus};
use crate::ports::{OrderRepository, OrderSnapshot};

pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    order_number: String,
    total_minor: i64,
    currency: String,
    payment_status: String,
}

impl TryFrom<OrderRow> for OrderSnapshot {
    type Error = DomainError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let invalid = |column: &str, e: String| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid {} value: {}", column, e),
            )
        };
        let currency =
            Currency::new(row.currency.trim()).map_err(|e| invalid("currency", e.to_string()))?;

        Ok(OrderSnapshot {
            id: OrderId::from_uuid(row.id),
            user_id: UserId::new(row.user_id).map_err(|e| invalid("user_id", e.to_string()))?,
            order_number: row.order_number,
            total: Money::new(row.total_minor, currency)
                .map_err(|e| invalid("total_minor", e.to_string()))?,
            payment_status: row
                .payment_status
                .parse::<OrderPaymentStatus>()
                .map_err(|e| invalid("payment_status", e.to_string()))?,
        })
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<OrderSnapshot>, DomainError> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, order_number, total_minor, currency, payment_status
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to load order: {}", e))
        })?;

        row.map(OrderSnapshot::try_from).transpose()
    }

    async fn update_payment_status(
        &self,
        id: &OrderId,
        status: OrderPaymentStatus,
    ) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET payment_status = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to update order payment status: {}", e),
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(
                ErrorCode::OrderNotFound,
                format!("Order not found: {}", id),
            )
            .with_detail("order_id", id.to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(payment_status: &str) -> OrderRow {
        OrderRow {
            id: Uuid::new_v4(),
            user_id: "user-1".to_string(),
            order_number: "ORD-1001".to_string(),
            total_minor: 10_000,
            currency: "usd".to_string(),
            payment_status: payment_status.to_string(),
        }
    }

    #[test]
    fn row_converts_to_snapshot() {
        let order = OrderSnapshot::try_from(row("PAID")).unwrap();
        assert!(order.is_paid());
        assert_eq!(order.total.currency.as_str(), "USD");
    }

    #[test]
    fn unknown_payment_status_is_rejected() {
        let err = OrderSnapshot::try_from(row("SHIPPED")).unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }
}

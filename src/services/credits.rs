//! Credit-ledger hook.
//!
//! The ledger itself lives outside this service; we only record one charge per
//! accepted scrape order, sized by the estimated result count with a nonzero
//! floor so empty estimates cannot probe for free.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Minimum charge per order.
pub const MIN_ORDER_CHARGE: i64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Charge amount for an order, from the provider's estimated result count.
pub fn order_charge(estimated_results: i64) -> i64 {
    estimated_results.max(MIN_ORDER_CHARGE)
}

#[async_trait]
pub trait CreditLedger: Send + Sync {
    async fn charge(&self, owner_id: Uuid, amount: i64) -> Result<(), LedgerError>;
}

pub struct PgCreditLedger {
    pool: PgPool,
}

impl PgCreditLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CreditLedger for PgCreditLedger {
    async fn charge(&self, owner_id: Uuid, amount: i64) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO credit_charges (owner_id, amount)
            VALUES ($1, $2)
            "#,
        )
        .bind(owner_id)
        .bind(amount)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// No-op ledger for tests.
#[derive(Default)]
pub struct NullLedger;

#[async_trait]
impl CreditLedger for NullLedger {
    async fn charge(&self, _owner_id: Uuid, _amount: i64) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_charge_floor() {
        assert_eq!(order_charge(0), MIN_ORDER_CHARGE);
        assert_eq!(order_charge(3), MIN_ORDER_CHARGE);
        assert_eq!(order_charge(500), 500);
    }
}

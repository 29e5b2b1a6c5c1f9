//! # Settlement Repository
//!
//! Append-only payment ledger plus the paid/due projections on the order
//! header.
//!
//! ## Projection Rule
//! ```text
//! paid_total = Σ amount of COMPLETED settlements for the order
//! due_total  = max(0, grand_total − paid_total)
//! ```
//!
//! The ledger keeps raw amounts: an overpayment stays visible as entries
//! summing past the grand total, only the header's `due_total` clamps at
//! zero. Both projections are recomputed inside the same transaction that
//! appends the entry, so the header can never disagree with the ledger.
//!
//! ## Replay Guard
//! Gateways deliver at-least-once. A retry carries the same
//! `(order_id, method, reference_no)` triple; we return the existing entry
//! instead of double-counting, backed by a unique index for the race where
//! two retries arrive concurrently.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{audit, new_id};
use tally_core::{
    CoreError, Money, OrderHeader, RequestContext, SettlementEntry, SettlementMethod,
    SettlementStatus,
};

/// Input for applying a settlement against an order.
#[derive(Debug, Clone)]
pub struct NewSettlement {
    pub order_id: String,
    pub method: SettlementMethod,
    pub amount: Money,
    /// Gateway/bank reference; the replay-detection key when present.
    pub reference_no: Option<String>,
    pub status: SettlementStatus,
}

/// Repository for the settlement ledger.
#[derive(Debug, Clone)]
pub struct SettlementRepository {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = r#"
    id, order_id, method, amount, reference_no, status, actor_id, created_at
"#;

impl SettlementRepository {
    /// Creates a new SettlementRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettlementRepository { pool }
    }

    /// Appends a settlement entry and refreshes the order's paid/due
    /// projections, all in one transaction.
    ///
    /// Replays (same order, method, and reference) return the existing
    /// entry without writing anything.
    ///
    /// ## Errors
    /// * `DbError::Domain(CoreError::InvalidSettlementAmount)` - amount <= 0
    /// * `DbError::NotFound` - order doesn't exist
    pub async fn apply(
        &self,
        ctx: &RequestContext,
        new: NewSettlement,
    ) -> DbResult<SettlementEntry> {
        if !new.amount.is_positive() {
            return Err(CoreError::InvalidSettlementAmount { amount: new.amount }.into());
        }

        if let Some(reference_no) = &new.reference_no {
            if let Some(existing) = self
                .find_by_reference(&new.order_id, new.method, reference_no)
                .await?
            {
                warn!(
                    order_id = %new.order_id,
                    reference_no = %reference_no,
                    "Settlement replay detected, returning existing entry"
                );
                return Ok(existing);
            }
        }

        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, OrderHeader>(
            r#"
            SELECT id, kind, branch_id, party_id, status, currency,
                   sub_total, discount_total, tax_total, shipping_total,
                   grand_total, paid_total, due_total,
                   external_reference, source_channel, created_at, updated_at
            FROM orders WHERE id = ?1
            "#,
        )
        .bind(&new.order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Order", &new.order_id))?;

        let entry = SettlementEntry {
            id: new_id(),
            order_id: new.order_id,
            method: new.method,
            amount: new.amount,
            reference_no: new.reference_no,
            status: new.status,
            actor_id: ctx.actor_id.clone(),
            created_at: Utc::now(),
        };

        let insert = sqlx::query(
            r#"
            INSERT INTO settlements (
                id, order_id, method, amount, reference_no, status,
                actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.order_id)
        .bind(entry.method)
        .bind(entry.amount)
        .bind(&entry.reference_no)
        .bind(entry.status)
        .bind(&entry.actor_id)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await;

        // The unique index catches the race the pre-check can't: two
        // replays in flight at once. Re-read and return the winner's row.
        if let Err(e) = insert {
            let db_err = DbError::from(e);
            if db_err.is_unique_violation() {
                drop(tx);
                if let Some(reference_no) = &entry.reference_no {
                    if let Some(existing) = self
                        .find_by_reference(&entry.order_id, entry.method, reference_no)
                        .await?
                    {
                        return Ok(existing);
                    }
                }
            }
            return Err(db_err);
        }

        // Projections derive from the ledger inside the same transaction
        let paid_total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM settlements
            WHERE order_id = ?1 AND status = 'completed'
            "#,
        )
        .bind(&entry.order_id)
        .fetch_one(&mut *tx)
        .await?;

        let paid_total = Money::from_scaled(paid_total);
        let due_total = (order.grand_total - paid_total).max(Money::zero());

        let now = Utc::now();
        sqlx::query(
            "UPDATE orders SET paid_total = ?2, due_total = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(&entry.order_id)
        .bind(paid_total)
        .bind(due_total)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        audit::record_tx(
            &mut tx,
            ctx,
            "settlement",
            &entry.id,
            "applied",
            Some(serde_json::json!({
                "order_id": entry.order_id,
                "method": entry.method,
                "amount": entry.amount,
                "status": entry.status,
            })),
        )
        .await?;

        tx.commit().await?;

        debug!(
            order_id = %entry.order_id,
            amount = %entry.amount,
            paid_total = %paid_total,
            due_total = %due_total,
            "Settlement applied"
        );

        Ok(entry)
    }

    /// Lists settlements for an order, oldest first.
    pub async fn payments_for_order(&self, order_id: &str) -> DbResult<Vec<SettlementEntry>> {
        let entries = sqlx::query_as::<_, SettlementEntry>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM settlements
            WHERE order_id = ?1
            ORDER BY created_at, id
            "#
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Sum of completed settlement amounts for an order.
    pub async fn total_paid(&self, order_id: &str) -> DbResult<Money> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0) FROM settlements
            WHERE order_id = ?1 AND status = 'completed'
            "#,
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Money::from_scaled(total))
    }

    async fn find_by_reference(
        &self,
        order_id: &str,
        method: SettlementMethod,
        reference_no: &str,
    ) -> DbResult<Option<SettlementEntry>> {
        let entry = sqlx::query_as::<_, SettlementEntry>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM settlements
            WHERE order_id = ?1 AND method = ?2 AND reference_no = ?3
            "#
        ))
        .bind(order_id)
        .bind(method)
        .bind(reference_no)
        .fetch_optional(&self.pool)
        .await?;

        Ok(entry)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::NewProduct;
    use tally_core::{NewOrder, NewOrderLine, OrderKind};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new("tester", "branch-a")
    }

    /// Creates a sale order with grand total 70.00 and returns its id.
    async fn seed_order(db: &Database) -> String {
        let product = db
            .products()
            .insert(
                &ctx(),
                NewProduct {
                    sku: "PAY-ITEM".into(),
                    barcode: None,
                    name: "Payable Item".into(),
                    description: None,
                    default_price: Money::from_major(35),
                    standard_cost: None,
                    min_stock: 0,
                },
            )
            .await
            .unwrap();

        db.orders()
            .create(
                &ctx(),
                NewOrder {
                    kind: OrderKind::Sale,
                    party_id: "cust-1".into(),
                    currency: "USD".into(),
                    lines: vec![NewOrderLine {
                        product_id: product.id,
                        qty: 2,
                        unit_price: None,
                        discount: Money::zero(),
                        tax_rate_bps: None,
                    }],
                    header_discount: Money::zero(),
                    header_tax: Money::zero(),
                    shipping: Money::zero(),
                    external_reference: None,
                    source_channel: None,
                },
            )
            .await
            .unwrap()
            .header
            .id
    }

    fn cash(order_id: &str, amount: i64) -> NewSettlement {
        NewSettlement {
            order_id: order_id.to_string(),
            method: SettlementMethod::Cash,
            amount: Money::from_major(amount),
            reference_no: None,
            status: SettlementStatus::Completed,
        }
    }

    #[tokio::test]
    async fn test_partial_then_full_payment() {
        let db = test_db().await;
        let order_id = seed_order(&db).await;
        let settlements = db.settlements();

        settlements.apply(&ctx(), cash(&order_id, 30)).await.unwrap();
        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        assert_eq!(order.paid_total, Money::from_major(30));
        assert_eq!(order.due_total, Money::from_major(40));

        settlements.apply(&ctx(), cash(&order_id, 40)).await.unwrap();
        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        assert_eq!(order.paid_total, Money::from_major(70));
        assert!(order.due_total.is_zero());
    }

    #[tokio::test]
    async fn test_overpayment_clamps_due_not_ledger() {
        let db = test_db().await;
        let order_id = seed_order(&db).await;

        db.settlements()
            .apply(&ctx(), cash(&order_id, 100))
            .await
            .unwrap();

        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        // Ledger keeps the raw 100, only the projection clamps
        assert_eq!(order.paid_total, Money::from_major(100));
        assert!(order.due_total.is_zero());
        assert_eq!(
            db.settlements().total_paid(&order_id).await.unwrap(),
            Money::from_major(100)
        );
    }

    #[tokio::test]
    async fn test_pending_entries_dont_count() {
        let db = test_db().await;
        let order_id = seed_order(&db).await;

        let mut pending = cash(&order_id, 70);
        pending.status = SettlementStatus::Pending;
        db.settlements().apply(&ctx(), pending).await.unwrap();

        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        assert!(order.paid_total.is_zero());
        assert_eq!(order.due_total, Money::from_major(70));
        assert_eq!(
            db.settlements()
                .payments_for_order(&order_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_gateway_replay_is_noop() {
        let db = test_db().await;
        let order_id = seed_order(&db).await;

        let notification = NewSettlement {
            order_id: order_id.clone(),
            method: SettlementMethod::Gateway,
            amount: Money::from_major(70),
            reference_no: Some("txn-abc-123".into()),
            status: SettlementStatus::Completed,
        };

        let first = db
            .settlements()
            .apply(&ctx(), notification.clone())
            .await
            .unwrap();
        let second = db.settlements().apply(&ctx(), notification).await.unwrap();

        assert_eq!(first.id, second.id);
        let order = db.orders().get(&order_id).await.unwrap().unwrap();
        assert_eq!(order.paid_total, Money::from_major(70));
        assert_eq!(
            db.settlements()
                .payments_for_order(&order_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let db = test_db().await;
        let order_id = seed_order(&db).await;

        let err = db
            .settlements()
            .apply(&ctx(), cash(&order_id, 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidSettlementAmount { .. })
        ));

        let err = db
            .settlements()
            .apply(&ctx(), cash(&order_id, -5))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }

    #[tokio::test]
    async fn test_unknown_order_rejected() {
        let db = test_db().await;
        let err = db
            .settlements()
            .apply(&ctx(), cash("no-such-order", 10))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}

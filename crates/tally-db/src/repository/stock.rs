//! # Stock Ledger Repository
//!
//! Append-only movement ledger and the stock projections derived from it.
//!
//! ## Ledger Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Append-Only Stock Ledger                           │
//! │                                                                         │
//! │  Event                      Ledger entry                                │
//! │  ─────                      ────────────                                │
//! │  purchase order line   ──►  in,  qty, reference "order"                 │
//! │  sale order line       ──►  out, qty, reference "order"                 │
//! │  manual adjustment     ──►  in/out, |delta|, reference "adjustment"     │
//! │  reversal              ──►  flipped copies, reference "reversal:order"  │
//! │                                                                         │
//! │  current_stock = Σ in − Σ out      (computed on every call)             │
//! │                                                                         │
//! │  Rows are never UPDATEd or DELETEd. A mistake is corrected by a         │
//! │  compensating entry in the opposite direction.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Negative current stock is allowed: overselling is a business reality
//! (rain checks, miscounts) and the ledger records what happened rather
//! than refusing to.
//!
//! Reversal idempotency is a unique index on `stock_reversals`, claimed in
//! the same transaction that writes the compensating entries. Concurrent
//! reversals of the same reference resolve to one set of entries.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::repository::{audit, new_id};
use tally_core::{validation, Money, RequestContext, StockDirection, StockMovementEntry};

/// Input for recording a stock movement.
#[derive(Debug, Clone)]
pub struct NewStockMovement {
    pub product_id: String,
    pub warehouse_id: Option<String>,
    pub direction: StockDirection,
    pub qty: i64,
    pub unit_cost: Money,
    pub reference_type: String,
    pub reference_id: String,
    /// Free-form operator note, kept in the audit trail only.
    pub reason: Option<String>,
}

/// Repository for the append-only stock movement ledger.
#[derive(Debug, Clone)]
pub struct StockLedgerRepository {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str = r#"
    id, product_id, warehouse_id, direction, qty, unit_cost,
    reference_type, reference_id, actor_id, occurred_at
"#;

impl StockLedgerRepository {
    /// Creates a new StockLedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockLedgerRepository { pool }
    }

    /// Records a single stock movement with its audit row, atomically.
    ///
    /// ## Errors
    /// * `DbError::Domain` - quantity is zero or negative
    /// * `DbError::ForeignKeyViolation` - unknown product
    pub async fn record(
        &self,
        ctx: &RequestContext,
        movement: NewStockMovement,
    ) -> DbResult<StockMovementEntry> {
        let mut tx = self.pool.begin().await?;
        let entry = insert_movement_tx(&mut tx, ctx, movement).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Current stock for a product: `Σ in − Σ out` over the full ledger.
    ///
    /// Computed on every call; there is no cached quantity anywhere to
    /// drift out of sync. `warehouse_id = None` aggregates all locations.
    pub async fn current_stock(
        &self,
        product_id: &str,
        warehouse_id: Option<&str>,
    ) -> DbResult<i64> {
        // ?2 IS NULL collapses the warehouse filter without dynamic SQL.
        let stock: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(CASE direction WHEN 'in' THEN qty ELSE -qty END), 0)
            FROM stock_movements
            WHERE product_id = ?1
              AND (?2 IS NULL OR warehouse_id = ?2)
            "#,
        )
        .bind(product_id)
        .bind(warehouse_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stock)
    }

    /// Whether a product is at or below its low-stock threshold.
    ///
    /// A `min_stock` of 0 disables the flag entirely.
    pub async fn is_low_stock(&self, product_id: &str) -> DbResult<bool> {
        let min_stock: i64 = sqlx::query_scalar("SELECT min_stock FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", product_id))?;

        if min_stock == 0 {
            return Ok(false);
        }

        let current = self.current_stock(product_id, None).await?;
        Ok(current <= min_stock)
    }

    /// Lists movements for a product, newest first.
    pub async fn entries_for_product(
        &self,
        product_id: &str,
        limit: u32,
    ) -> DbResult<Vec<StockMovementEntry>> {
        let entries = sqlx::query_as::<_, StockMovementEntry>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM stock_movements
            WHERE product_id = ?1
            ORDER BY occurred_at DESC, id DESC
            LIMIT ?2
            "#
        ))
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Lists movements created by one triggering entity.
    pub async fn entries_for_reference(
        &self,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Vec<StockMovementEntry>> {
        let entries = sqlx::query_as::<_, StockMovementEntry>(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM stock_movements
            WHERE reference_type = ?1 AND reference_id = ?2
            ORDER BY occurred_at, id
            "#
        ))
        .bind(reference_type)
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Reverses every movement recorded for a reference by appending
    /// flipped compensating entries.
    ///
    /// Idempotent: the transaction claims the reference in `stock_reversals`,
    /// whose unique index makes the claim first-writer-wins. A repeated or
    /// concurrent call loses the insert and reads back the entries the winner
    /// wrote, so the ledger never carries a double compensation.
    pub async fn reverse(
        &self,
        ctx: &RequestContext,
        reference_type: &str,
        reference_id: &str,
    ) -> DbResult<Vec<StockMovementEntry>> {
        let reversal_type = format!("reversal:{reference_type}");

        let originals = self
            .entries_for_reference(reference_type, reference_id)
            .await?;
        if originals.is_empty() {
            return Err(DbError::not_found("StockMovement", reference_id));
        }

        let mut tx = self.pool.begin().await?;

        // Claiming must be the transaction's first write so a losing call
        // surfaces the unique violation instead of a stale-snapshot error.
        let claim = sqlx::query(
            r#"
            INSERT INTO stock_reversals (id, reference_type, reference_id, actor_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(new_id())
        .bind(reference_type)
        .bind(reference_id)
        .bind(&ctx.actor_id)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;

        if let Err(e) = claim {
            let db_err = DbError::from(e);
            if db_err.is_unique_violation() {
                drop(tx);
                warn!(
                    reference_type = %reference_type,
                    reference_id = %reference_id,
                    "Reversal already recorded, returning existing entries"
                );
                return self.entries_for_reference(&reversal_type, reference_id).await;
            }
            return Err(db_err);
        }

        debug!(
            reference_type = %reference_type,
            reference_id = %reference_id,
            count = originals.len(),
            "Recording compensating stock entries"
        );

        let mut compensating = Vec::with_capacity(originals.len());
        for original in &originals {
            let entry = insert_movement_tx(
                &mut tx,
                ctx,
                NewStockMovement {
                    product_id: original.product_id.clone(),
                    warehouse_id: original.warehouse_id.clone(),
                    direction: original.direction.flipped(),
                    qty: original.qty,
                    unit_cost: original.unit_cost,
                    reference_type: reversal_type.clone(),
                    reference_id: reference_id.to_string(),
                    reason: None,
                },
            )
            .await?;
            compensating.push(entry);
        }

        tx.commit().await?;
        Ok(compensating)
    }
}

/// Inserts one ledger row plus its audit row on an open transaction.
///
/// Shared with the order repository, which writes movements in the same
/// transaction as the order header and lines.
pub(crate) async fn insert_movement_tx(
    conn: &mut SqliteConnection,
    ctx: &RequestContext,
    movement: NewStockMovement,
) -> DbResult<StockMovementEntry> {
    validation::validate_quantity(movement.qty)?;

    let reason = movement.reason;
    let entry = StockMovementEntry {
        id: new_id(),
        product_id: movement.product_id,
        warehouse_id: movement.warehouse_id,
        direction: movement.direction,
        qty: movement.qty,
        unit_cost: movement.unit_cost,
        reference_type: movement.reference_type,
        reference_id: movement.reference_id,
        actor_id: ctx.actor_id.clone(),
        occurred_at: Utc::now(),
    };

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, product_id, warehouse_id, direction, qty, unit_cost,
            reference_type, reference_id, actor_id, occurred_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.product_id)
    .bind(&entry.warehouse_id)
    .bind(entry.direction)
    .bind(entry.qty)
    .bind(entry.unit_cost)
    .bind(&entry.reference_type)
    .bind(&entry.reference_id)
    .bind(&entry.actor_id)
    .bind(entry.occurred_at)
    .execute(&mut *conn)
    .await?;

    audit::record_tx(
        conn,
        ctx,
        "stock_movement",
        &entry.id,
        "recorded",
        Some(serde_json::json!({
            "product_id": entry.product_id,
            "direction": entry.direction,
            "qty": entry.qty,
            "reference_type": entry.reference_type,
            "reference_id": entry.reference_id,
            "reason": reason,
        })),
    )
    .await?;

    Ok(entry)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::NewProduct;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new("tester", "branch-a")
    }

    async fn seed_product(db: &Database, min_stock: i64) -> String {
        db.products()
            .insert(
                &ctx(),
                NewProduct {
                    sku: "GADGET-1".into(),
                    barcode: None,
                    name: "Gadget".into(),
                    description: None,
                    default_price: Money::from_major(25),
                    standard_cost: Some(Money::from_major(15)),
                    min_stock,
                },
            )
            .await
            .unwrap()
            .id
    }

    fn movement(product_id: &str, direction: StockDirection, qty: i64) -> NewStockMovement {
        NewStockMovement {
            product_id: product_id.to_string(),
            warehouse_id: None,
            direction,
            qty,
            unit_cost: Money::from_major(15),
            reference_type: "adjustment".into(),
            reference_id: new_id(),
            reason: None,
        }
    }

    #[tokio::test]
    async fn test_stock_is_sum_of_movements() {
        let db = test_db().await;
        let product_id = seed_product(&db, 0).await;
        let stock = db.stock();

        stock
            .record(&ctx(), movement(&product_id, StockDirection::In, 10))
            .await
            .unwrap();
        stock
            .record(&ctx(), movement(&product_id, StockDirection::Out, 3))
            .await
            .unwrap();
        stock
            .record(&ctx(), movement(&product_id, StockDirection::Out, 2))
            .await
            .unwrap();

        assert_eq!(stock.current_stock(&product_id, None).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_stock_can_go_negative() {
        let db = test_db().await;
        let product_id = seed_product(&db, 0).await;
        let stock = db.stock();

        stock
            .record(&ctx(), movement(&product_id, StockDirection::Out, 4))
            .await
            .unwrap();

        assert_eq!(stock.current_stock(&product_id, None).await.unwrap(), -4);
    }

    #[tokio::test]
    async fn test_warehouse_filter() {
        let db = test_db().await;
        let product_id = seed_product(&db, 0).await;
        let stock = db.stock();

        let mut m = movement(&product_id, StockDirection::In, 7);
        m.warehouse_id = Some("wh-1".into());
        stock.record(&ctx(), m).await.unwrap();

        let mut m = movement(&product_id, StockDirection::In, 3);
        m.warehouse_id = Some("wh-2".into());
        stock.record(&ctx(), m).await.unwrap();

        assert_eq!(
            stock.current_stock(&product_id, Some("wh-1")).await.unwrap(),
            7
        );
        assert_eq!(stock.current_stock(&product_id, None).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_zero_qty_rejected() {
        let db = test_db().await;
        let product_id = seed_product(&db, 0).await;

        let err = db
            .stock()
            .record(&ctx(), movement(&product_id, StockDirection::In, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }

    #[tokio::test]
    async fn test_low_stock_flag() {
        let db = test_db().await;
        let product_id = seed_product(&db, 5).await;
        let stock = db.stock();

        stock
            .record(&ctx(), movement(&product_id, StockDirection::In, 10))
            .await
            .unwrap();
        assert!(!stock.is_low_stock(&product_id).await.unwrap());

        stock
            .record(&ctx(), movement(&product_id, StockDirection::Out, 6))
            .await
            .unwrap();
        assert!(stock.is_low_stock(&product_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_min_stock_zero_never_low() {
        let db = test_db().await;
        let product_id = seed_product(&db, 0).await;

        // Even at negative stock the flag stays off when the threshold is 0
        db.stock()
            .record(&ctx(), movement(&product_id, StockDirection::Out, 1))
            .await
            .unwrap();
        assert!(!db.stock().is_low_stock(&product_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_reverse_is_idempotent() {
        let db = test_db().await;
        let product_id = seed_product(&db, 0).await;
        let stock = db.stock();

        let mut m = movement(&product_id, StockDirection::Out, 5);
        m.reference_type = "order".into();
        m.reference_id = "order-1".into();
        stock.record(&ctx(), m).await.unwrap();

        assert_eq!(stock.current_stock(&product_id, None).await.unwrap(), -5);

        let reversed = stock.reverse(&ctx(), "order", "order-1").await.unwrap();
        assert_eq!(reversed.len(), 1);
        assert_eq!(reversed[0].direction, StockDirection::In);
        assert_eq!(stock.current_stock(&product_id, None).await.unwrap(), 0);

        // Second reversal is a no-op, stock stays at zero
        stock.reverse(&ctx(), "order", "order-1").await.unwrap();
        assert_eq!(stock.current_stock(&product_id, None).await.unwrap(), 0);

        let compensating = stock
            .entries_for_reference("reversal:order", "order-1")
            .await
            .unwrap();
        assert_eq!(compensating.len(), 1);
        assert_eq!(compensating[0].direction, StockDirection::In);
    }

    #[tokio::test]
    async fn test_concurrent_reversals_compensate_once() {
        // File-backed pool so the two calls run on separate connections;
        // the shared in-memory config is capped at one.
        let path = std::env::temp_dir().join(format!("tally-reverse-{}.db", new_id()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let product_id = seed_product(&db, 0).await;
        let stock = db.stock();

        let mut m = movement(&product_id, StockDirection::Out, 5);
        m.reference_type = "order".into();
        m.reference_id = "order-race".into();
        stock.record(&ctx(), m).await.unwrap();

        let c = ctx();
        let (a, b) = tokio::join!(
            stock.reverse(&c, "order", "order-race"),
            stock.reverse(&c, "order", "order-race")
        );

        // Both callers see the same single compensation; the loser gets the
        // winner's entries, not a second set.
        assert_eq!(a.unwrap().len(), 1);
        assert_eq!(b.unwrap().len(), 1);
        assert_eq!(stock.current_stock(&product_id, None).await.unwrap(), 0);
        assert_eq!(
            stock
                .entries_for_reference("reversal:order", "order-race")
                .await
                .unwrap()
                .len(),
            1
        );

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_reverse_unknown_reference() {
        let db = test_db().await;
        let err = db
            .stock()
            .reverse(&ctx(), "order", "no-such-order")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_movement_writes_audit_row() {
        let db = test_db().await;
        let product_id = seed_product(&db, 0).await;

        let entry = db
            .stock()
            .record(&ctx(), movement(&product_id, StockDirection::In, 2))
            .await
            .unwrap();

        let count = db
            .audit()
            .count_for_entity("stock_movement", &entry.id)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}

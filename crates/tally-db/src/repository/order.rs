//! # Order Repository
//!
//! Atomic order creation and the order status machine.
//!
//! ## One Transaction Per Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       create() Transaction                              │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    resolve products      ← branch + active check per line               │
//! │    compute totals        ← pure arithmetic in tally-core                │
//! │    INSERT orders                                                        │
//! │    INSERT order_lines    ← one per line, snapshots frozen               │
//! │    INSERT stock_movements← one per line, direction from order kind      │
//! │    INSERT audit_log                                                     │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any failure rolls back everything: no order without its movements,     │
//! │  no movements without their order.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Status transitions never emit compensating ledger entries; cancelling or
//! refunding an order changes the header only. Undoing its stock effect is
//! the stock repository's explicit `reverse` operation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::repository::stock::{insert_movement_tx, NewStockMovement};
use crate::repository::{audit, new_id};
use tally_core::{
    line_total, order_totals, validation, CoreError, LineTotals, Money, NewOrder, OrderHeader,
    OrderKind, OrderLine, OrderStatus, Product, RequestContext, TaxRate,
};

/// An order header together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderWithLines {
    pub header: OrderHeader,
    pub lines: Vec<OrderLine>,
}

/// Typed filters for listing orders. Every field is optional; `None`
/// means "don't filter on this".
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub kind: Option<OrderKind>,
    pub status: Option<OrderStatus>,
    pub branch_id: Option<String>,
    pub party_id: Option<String>,
    pub source_channel: Option<String>,
}

/// One page of results plus the counts the API envelope needs.
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Paginated<T> {
    /// Number of the last page (1 when empty).
    pub fn last_page(&self) -> i64 {
        if self.total == 0 {
            1
        } else {
            (self.total + self.per_page as i64 - 1) / self.per_page as i64
        }
    }
}

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

const HEADER_COLUMNS: &str = r#"
    id, kind, branch_id, party_id, status, currency,
    sub_total, discount_total, tax_total, shipping_total,
    grand_total, paid_total, due_total,
    external_reference, source_channel, created_at, updated_at
"#;

const LINE_COLUMNS: &str = r#"
    id, order_id, product_id, sku_snapshot, name_snapshot,
    qty, unit_price, discount, tax_rate_bps, gross, tax, line_total, created_at
"#;

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Creates an order: header, lines, and stock movements in one
    /// transaction.
    ///
    /// ## Errors
    /// * `DbError::Domain(CoreError::ProductUnavailable)` - product missing,
    ///   inactive, or in another branch
    /// * `DbError::Domain` - invalid line, tax rate, or line count
    /// * `DbError::UniqueViolation` - `(source_channel, external_reference)`
    ///   already used (webhook replay)
    pub async fn create(&self, ctx: &RequestContext, new: NewOrder) -> DbResult<OrderWithLines> {
        validation::validate_required("party_id", &new.party_id)?;
        validation::validate_order_line_count(new.lines.len())?;
        for line in &new.lines {
            validation::validate_quantity(line.qty)?;
            if let Some(bps) = line.tax_rate_bps {
                validation::validate_tax_rate_bps(bps)?;
            }
        }

        let mut tx = self.pool.begin().await?;

        let order_id = new_id();
        let now = Utc::now();
        let direction = new.kind.stock_direction();

        let mut lines = Vec::with_capacity(new.lines.len());
        let mut line_breakdowns: Vec<LineTotals> = Vec::with_capacity(new.lines.len());

        for input in &new.lines {
            let product = resolve_product_tx(&mut tx, &input.product_id).await?;
            if !product.available_in(&ctx.branch_id) {
                let reason = if !product.is_active {
                    "product is inactive"
                } else {
                    "product belongs to another branch"
                };
                return Err(CoreError::ProductUnavailable {
                    product: product.sku.clone(),
                    reason: reason.to_string(),
                }
                .into());
            }

            let unit_price = input.unit_price.unwrap_or(product.default_price);
            let tax_rate = TaxRate::from_bps(input.tax_rate_bps.unwrap_or(0));
            let breakdown = line_total(input.qty, unit_price, input.discount, tax_rate)?;

            // Sales move stock at cost, purchases at the price paid.
            let unit_cost = match new.kind {
                OrderKind::Purchase => unit_price,
                OrderKind::Sale => product.standard_cost.unwrap_or(unit_price),
            };

            lines.push(OrderLine {
                id: new_id(),
                order_id: order_id.clone(),
                product_id: product.id.clone(),
                sku_snapshot: product.sku.clone(),
                name_snapshot: product.name.clone(),
                qty: input.qty,
                unit_price,
                discount: breakdown.discount,
                tax_rate_bps: tax_rate.bps(),
                gross: breakdown.gross,
                tax: breakdown.tax,
                line_total: breakdown.total,
                created_at: now,
            });
            line_breakdowns.push(breakdown);

            insert_movement_tx(
                &mut tx,
                ctx,
                NewStockMovement {
                    product_id: product.id,
                    warehouse_id: None,
                    direction,
                    qty: input.qty,
                    unit_cost,
                    reference_type: "order".to_string(),
                    reference_id: order_id.clone(),
                    reason: None,
                },
            )
            .await?;
        }

        let totals = order_totals(
            &line_breakdowns,
            new.header_discount,
            new.header_tax,
            new.shipping,
        );

        let header = OrderHeader {
            id: order_id.clone(),
            kind: new.kind,
            branch_id: ctx.branch_id.clone(),
            party_id: new.party_id,
            status: OrderStatus::default(),
            currency: new.currency,
            sub_total: totals.sub_total,
            discount_total: totals.discount_total,
            tax_total: totals.tax_total,
            shipping_total: totals.shipping_total,
            grand_total: totals.grand_total,
            paid_total: Money::zero(),
            due_total: totals.grand_total.max(Money::zero()),
            external_reference: new.external_reference,
            source_channel: new.source_channel,
            created_at: now,
            updated_at: now,
        };

        debug!(
            order_id = %header.id,
            kind = ?header.kind,
            lines = lines.len(),
            grand_total = %header.grand_total,
            "Creating order"
        );

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, kind, branch_id, party_id, status, currency,
                sub_total, discount_total, tax_total, shipping_total,
                grand_total, paid_total, due_total,
                external_reference, source_channel, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
            "#,
        )
        .bind(&header.id)
        .bind(header.kind)
        .bind(&header.branch_id)
        .bind(&header.party_id)
        .bind(header.status)
        .bind(&header.currency)
        .bind(header.sub_total)
        .bind(header.discount_total)
        .bind(header.tax_total)
        .bind(header.shipping_total)
        .bind(header.grand_total)
        .bind(header.paid_total)
        .bind(header.due_total)
        .bind(&header.external_reference)
        .bind(&header.source_channel)
        .bind(header.created_at)
        .bind(header.updated_at)
        .execute(&mut *tx)
        .await?;

        for line in &lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    id, order_id, product_id, sku_snapshot, name_snapshot,
                    qty, unit_price, discount, tax_rate_bps, gross, tax,
                    line_total, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
            )
            .bind(&line.id)
            .bind(&line.order_id)
            .bind(&line.product_id)
            .bind(&line.sku_snapshot)
            .bind(&line.name_snapshot)
            .bind(line.qty)
            .bind(line.unit_price)
            .bind(line.discount)
            .bind(line.tax_rate_bps)
            .bind(line.gross)
            .bind(line.tax)
            .bind(line.line_total)
            .bind(line.created_at)
            .execute(&mut *tx)
            .await?;
        }

        audit::record_tx(
            &mut tx,
            ctx,
            "order",
            &header.id,
            "created",
            Some(serde_json::json!({
                "kind": header.kind,
                "lines": lines.len(),
                "grand_total": header.grand_total,
            })),
        )
        .await?;

        tx.commit().await?;

        Ok(OrderWithLines { header, lines })
    }

    /// Gets an order header by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<OrderHeader>> {
        let header = sqlx::query_as::<_, OrderHeader>(&format!(
            "SELECT {HEADER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(header)
    }

    /// Gets an order with its lines.
    pub async fn get_with_lines(&self, id: &str) -> DbResult<Option<OrderWithLines>> {
        let Some(header) = self.get(id).await? else {
            return Ok(None);
        };

        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ?1 ORDER BY created_at, id"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(OrderWithLines { header, lines }))
    }

    /// Finds an order by its external idempotency key.
    pub async fn find_by_external_reference(
        &self,
        source_channel: &str,
        external_reference: &str,
    ) -> DbResult<Option<OrderHeader>> {
        let header = sqlx::query_as::<_, OrderHeader>(&format!(
            r#"
            SELECT {HEADER_COLUMNS} FROM orders
            WHERE source_channel = ?1 AND external_reference = ?2
            "#
        ))
        .bind(source_channel)
        .bind(external_reference)
        .fetch_optional(&self.pool)
        .await?;

        Ok(header)
    }

    /// Lists orders with typed filters and pagination, newest first.
    ///
    /// Filters use `(?N IS NULL OR column = ?N)` so the SQL text is one
    /// static statement regardless of which filters are set.
    pub async fn list(
        &self,
        filter: &OrderFilter,
        page: u32,
        per_page: u32,
    ) -> DbResult<Paginated<OrderHeader>> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 200);
        let offset = (page - 1) as i64 * per_page as i64;

        const WHERE_CLAUSE: &str = r#"
            WHERE (?1 IS NULL OR kind = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 IS NULL OR branch_id = ?3)
              AND (?4 IS NULL OR party_id = ?4)
              AND (?5 IS NULL OR source_channel = ?5)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders {WHERE_CLAUSE}"))
            .bind(filter.kind)
            .bind(filter.status)
            .bind(&filter.branch_id)
            .bind(&filter.party_id)
            .bind(&filter.source_channel)
            .fetch_one(&self.pool)
            .await?;

        let items = sqlx::query_as::<_, OrderHeader>(&format!(
            r#"
            SELECT {HEADER_COLUMNS} FROM orders
            {WHERE_CLAUSE}
            ORDER BY created_at DESC, id DESC
            LIMIT ?6 OFFSET ?7
            "#
        ))
        .bind(filter.kind)
        .bind(filter.status)
        .bind(&filter.branch_id)
        .bind(&filter.party_id)
        .bind(&filter.source_channel)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(Paginated {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Advances an order through its status machine.
    ///
    /// ## Errors
    /// * `DbError::NotFound` - order doesn't exist
    /// * `DbError::Domain(CoreError::InvalidStatusTransition)` - transition
    ///   not allowed from the current status
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        next: OrderStatus,
    ) -> DbResult<OrderHeader> {
        let mut tx = self.pool.begin().await?;

        let header = sqlx::query_as::<_, OrderHeader>(&format!(
            "SELECT {HEADER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Order", id))?;

        if !header.status.can_transition_to(next) {
            return Err(CoreError::InvalidStatusTransition {
                order_id: id.to_string(),
                from: header.status.as_str().to_string(),
                to: next.as_str().to_string(),
            }
            .into());
        }

        let now = Utc::now();
        sqlx::query("UPDATE orders SET status = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(next)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        audit::record_tx(
            &mut tx,
            ctx,
            "order",
            id,
            "status_changed",
            Some(serde_json::json!({
                "from": header.status.as_str(),
                "to": next.as_str(),
            })),
        )
        .await?;

        tx.commit().await?;

        debug!(order_id = %id, from = header.status.as_str(), to = next.as_str(), "Order status changed");

        Ok(OrderHeader {
            status: next,
            updated_at: now,
            ..header
        })
    }

    /// Re-derives an order's totals from its stored lines and checks them
    /// against the header, within the 0.01 tolerance.
    ///
    /// ## Errors
    /// `DbError::Domain(CoreError::UnbalancedTotals)` when the header has
    /// drifted from its lines.
    pub async fn verify_totals(&self, id: &str) -> DbResult<()> {
        let order = self
            .get_with_lines(id)
            .await?
            .ok_or_else(|| DbError::not_found("Order", id))?;

        let computed_sub = order
            .lines
            .iter()
            .fold(Money::zero(), |acc, line| acc + line.line_total);

        let computed_grand = computed_sub - order.header.discount_total
            + order.header.tax_total
            + order.header.shipping_total;

        if !order.header.sub_total.approx_eq(computed_sub)
            || !order.header.grand_total.approx_eq(computed_grand)
        {
            return Err(CoreError::UnbalancedTotals {
                order_id: id.to_string(),
                stored: order.header.grand_total,
                computed: computed_grand,
            }
            .into());
        }

        Ok(())
    }
}

/// Loads a product inside the order transaction so the snapshot and the
/// availability check see the same row the movements will reference.
async fn resolve_product_tx(
    tx: &mut Transaction<'_, Sqlite>,
    product_id: &str,
) -> DbResult<Product> {
    sqlx::query_as::<_, Product>(
        r#"
        SELECT id, branch_id, sku, barcode, name, description,
               default_price, standard_cost, min_stock, is_active,
               created_at, updated_at
        FROM products WHERE id = ?1
        "#,
    )
    .bind(product_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| {
        CoreError::ProductUnavailable {
            product: product_id.to_string(),
            reason: "product does not exist".to_string(),
        }
        .into()
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::product::NewProduct;
    use tally_core::NewOrderLine;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn ctx() -> RequestContext {
        RequestContext::new("tester", "branch-a")
    }

    async fn seed_product(db: &Database, sku: &str, price: i64) -> Product {
        db.products()
            .insert(
                &ctx(),
                NewProduct {
                    sku: sku.into(),
                    barcode: None,
                    name: format!("Product {sku}"),
                    description: None,
                    default_price: Money::from_major(price),
                    standard_cost: Some(Money::from_major(price / 2)),
                    min_stock: 0,
                },
            )
            .await
            .unwrap()
    }

    fn sale(lines: Vec<NewOrderLine>) -> NewOrder {
        NewOrder {
            kind: OrderKind::Sale,
            party_id: "cust-1".into(),
            currency: "USD".into(),
            lines,
            header_discount: Money::zero(),
            header_tax: Money::zero(),
            shipping: Money::zero(),
            external_reference: None,
            source_channel: None,
        }
    }

    fn line(product_id: &str, qty: i64) -> NewOrderLine {
        NewOrderLine {
            product_id: product_id.into(),
            qty,
            unit_price: None,
            discount: Money::zero(),
            tax_rate_bps: None,
        }
    }

    #[tokio::test]
    async fn test_checkout_writes_order_and_movements() {
        let db = test_db().await;
        let p1 = seed_product(&db, "ITEM-A", 10).await;
        let p2 = seed_product(&db, "ITEM-B", 50).await;

        let order = db
            .orders()
            .create(&ctx(), sale(vec![line(&p1.id, 2), line(&p2.id, 1)]))
            .await
            .unwrap();

        assert_eq!(order.header.sub_total, Money::from_major(70));
        assert_eq!(order.header.grand_total, Money::from_major(70));
        assert_eq!(order.header.due_total, Money::from_major(70));
        assert_eq!(order.header.status, OrderStatus::Pending);
        assert_eq!(order.lines.len(), 2);

        // One out-movement per line
        assert_eq!(db.stock().current_stock(&p1.id, None).await.unwrap(), -2);
        assert_eq!(db.stock().current_stock(&p2.id, None).await.unwrap(), -1);

        let movements = db
            .stock()
            .entries_for_reference("order", &order.header.id)
            .await
            .unwrap();
        assert_eq!(movements.len(), 2);
    }

    #[tokio::test]
    async fn test_purchase_moves_stock_in() {
        let db = test_db().await;
        let p = seed_product(&db, "ITEM-C", 20).await;

        let mut new = sale(vec![line(&p.id, 5)]);
        new.kind = OrderKind::Purchase;
        new.party_id = "supplier-1".into();

        db.orders().create(&ctx(), new).await.unwrap();
        assert_eq!(db.stock().current_stock(&p.id, None).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_bad_line_rolls_back_everything() {
        let db = test_db().await;
        let p1 = seed_product(&db, "ITEM-D", 10).await;
        let p2 = seed_product(&db, "ITEM-E", 10).await;

        let err = db
            .orders()
            .create(
                &ctx(),
                sale(vec![line(&p1.id, 1), line("no-such-product", 1), line(&p2.id, 1)]),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::ProductUnavailable { .. })
        ));

        // Nothing persisted: no orders, no movements, no stock change
        let page = db
            .orders()
            .list(&OrderFilter::default(), 1, 50)
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(db.stock().current_stock(&p1.id, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_other_branch_product_unavailable() {
        let db = test_db().await;
        let p = seed_product(&db, "ITEM-F", 10).await;

        let other_branch = RequestContext::new("tester", "branch-b");
        let err = db
            .orders()
            .create(&other_branch, sale(vec![line(&p.id, 1)]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::ProductUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_line_snapshots_survive_product_edits() {
        let db = test_db().await;
        let p = seed_product(&db, "ITEM-G", 10).await;

        let order = db
            .orders()
            .create(&ctx(), sale(vec![line(&p.id, 1)]))
            .await
            .unwrap();

        let mut edited = p.clone();
        edited.name = "Renamed".into();
        edited.default_price = Money::from_major(99);
        db.products().update(&edited).await.unwrap();

        let reloaded = db
            .orders()
            .get_with_lines(&order.header.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.lines[0].name_snapshot, "Product ITEM-G");
        assert_eq!(reloaded.lines[0].unit_price, Money::from_major(10));
    }

    #[tokio::test]
    async fn test_status_machine() {
        let db = test_db().await;
        let p = seed_product(&db, "ITEM-H", 10).await;
        let order = db
            .orders()
            .create(&ctx(), sale(vec![line(&p.id, 1)]))
            .await
            .unwrap();
        let id = order.header.id;

        let updated = db
            .orders()
            .update_status(&ctx(), &id, OrderStatus::Processing)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);

        // Can't jump back, can't refund a non-completed order
        let err = db
            .orders()
            .update_status(&ctx(), &id, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InvalidStatusTransition { .. })
        ));

        db.orders()
            .update_status(&ctx(), &id, OrderStatus::Completed)
            .await
            .unwrap();
        db.orders()
            .update_status(&ctx(), &id, OrderStatus::Refunded)
            .await
            .unwrap();

        // Refunded is terminal
        let err = db
            .orders()
            .update_status(&ctx(), &id, OrderStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }

    #[tokio::test]
    async fn test_cancel_leaves_ledger_untouched() {
        let db = test_db().await;
        let p = seed_product(&db, "ITEM-I", 10).await;
        let order = db
            .orders()
            .create(&ctx(), sale(vec![line(&p.id, 3)]))
            .await
            .unwrap();

        db.orders()
            .update_status(&ctx(), &order.header.id, OrderStatus::Cancelled)
            .await
            .unwrap();

        // No automatic compensation: the caller reverses explicitly
        assert_eq!(db.stock().current_stock(&p.id, None).await.unwrap(), -3);

        db.stock()
            .reverse(&ctx(), "order", &order.header.id)
            .await
            .unwrap();
        assert_eq!(db.stock().current_stock(&p.id, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_external_reference_is_unique() {
        let db = test_db().await;
        let p = seed_product(&db, "ITEM-J", 10).await;

        let mut new = sale(vec![line(&p.id, 1)]);
        new.external_reference = Some("ext-100".into());
        new.source_channel = Some("webstore".into());
        db.orders().create(&ctx(), new.clone()).await.unwrap();

        let err = db.orders().create(&ctx(), new).await.unwrap_err();
        assert!(err.is_unique_violation());

        let found = db
            .orders()
            .find_by_external_reference("webstore", "ext-100")
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_list_filters_and_pagination() {
        let db = test_db().await;
        let p = seed_product(&db, "ITEM-K", 10).await;

        for _ in 0..3 {
            db.orders()
                .create(&ctx(), sale(vec![line(&p.id, 1)]))
                .await
                .unwrap();
        }
        let mut purchase = sale(vec![line(&p.id, 1)]);
        purchase.kind = OrderKind::Purchase;
        db.orders().create(&ctx(), purchase).await.unwrap();

        let all = db
            .orders()
            .list(&OrderFilter::default(), 1, 50)
            .await
            .unwrap();
        assert_eq!(all.total, 4);

        let sales_only = db
            .orders()
            .list(
                &OrderFilter {
                    kind: Some(OrderKind::Sale),
                    ..Default::default()
                },
                1,
                2,
            )
            .await
            .unwrap();
        assert_eq!(sales_only.total, 3);
        assert_eq!(sales_only.items.len(), 2);
        assert_eq!(sales_only.last_page(), 2);
    }

    #[tokio::test]
    async fn test_verify_totals() {
        let db = test_db().await;
        let p = seed_product(&db, "ITEM-L", 10).await;
        let order = db
            .orders()
            .create(&ctx(), sale(vec![line(&p.id, 2)]))
            .await
            .unwrap();

        db.orders().verify_totals(&order.header.id).await.unwrap();

        // Corrupt the header directly, bypassing the repository
        sqlx::query("UPDATE orders SET grand_total = 999999 WHERE id = ?1")
            .bind(&order.header.id)
            .execute(db.pool())
            .await
            .unwrap();

        let err = db.orders().verify_totals(&order.header.id).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::UnbalancedTotals { .. })
        ));
    }
}

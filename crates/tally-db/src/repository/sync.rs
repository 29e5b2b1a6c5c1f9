//! # External Sync Repository
//!
//! Reconciles product and order payloads pushed by an external sales
//! channel into local entities.
//!
//! ## Reconciliation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Webhook → Local Entity                               │
//! │                                                                         │
//! │  payload (external_id)                                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  external_mappings lookup (store_id, entity_type, external_id)          │
//! │       │                                                                 │
//! │       ├── hit  ──► UPDATE the mapped local entity                       │
//! │       │                                                                 │
//! │       └── miss ──► CREATE local entity + INSERT mapping                 │
//! │                    (unique index resolves the concurrent-replay race)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is at-least-once, so every path here must be idempotent:
//! replaying any payload leaves the database exactly as the first delivery
//! left it.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::new_id;
use crate::repository::order::{OrderRepository, OrderWithLines};
use crate::repository::product::{NewProduct, ProductRepository};
use tally_core::{
    ExternalMapping, ExternalOrder, ExternalProduct, Money, NewOrder, NewOrderLine, OrderHeader,
    OrderKind, Product, RequestContext, ValidationError,
};

/// Entity type discriminators stored in `external_mappings`.
const ENTITY_PRODUCT: &str = "product";
const ENTITY_ORDER: &str = "order";

/// Outcome of an order upsert, so callers can tell a fresh creation from
/// a replay or status refresh.
#[derive(Debug, Clone)]
pub enum OrderSyncOutcome {
    Created(OrderWithLines),
    Updated(OrderHeader),
    /// Replay or a payload carrying nothing new.
    Unchanged(OrderHeader),
}

impl OrderSyncOutcome {
    pub fn header(&self) -> &OrderHeader {
        match self {
            OrderSyncOutcome::Created(order) => &order.header,
            OrderSyncOutcome::Updated(header) => header,
            OrderSyncOutcome::Unchanged(header) => header,
        }
    }
}

/// Repository for external-channel reconciliation.
#[derive(Debug, Clone)]
pub struct SyncRepository {
    pool: SqlitePool,
}

impl SyncRepository {
    /// Creates a new SyncRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SyncRepository { pool }
    }

    /// Looks up a mapping by its idempotency key.
    pub async fn get_mapping(
        &self,
        store_id: &str,
        entity_type: &str,
        external_id: &str,
    ) -> DbResult<Option<ExternalMapping>> {
        let mapping = sqlx::query_as::<_, ExternalMapping>(
            r#"
            SELECT id, store_id, entity_type, external_id, local_id, last_synced_at
            FROM external_mappings
            WHERE store_id = ?1 AND entity_type = ?2 AND external_id = ?3
            "#,
        )
        .bind(store_id)
        .bind(entity_type)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    /// Creates or refreshes a local product from a channel payload.
    ///
    /// Mapped external id: update name/price/barcode/description in place.
    /// Unmapped: create the product and record the mapping. Replays of the
    /// same payload converge on the same local product either way.
    pub async fn upsert_product(
        &self,
        ctx: &RequestContext,
        store_id: &str,
        payload: ExternalProduct,
    ) -> DbResult<Product> {
        let price = parse_amount("price", &payload.price)?;
        let products = ProductRepository::new(self.pool.clone());

        if let Some(mapping) = self
            .get_mapping(store_id, ENTITY_PRODUCT, &payload.external_id)
            .await?
        {
            let mut product = products
                .get_by_id(&mapping.local_id)
                .await?
                .ok_or_else(|| DbError::not_found("Product", &mapping.local_id))?;

            product.name = payload.name;
            product.description = payload.description;
            product.default_price = price;
            product.barcode = payload.barcode;
            products.update(&product).await?;
            self.touch_mapping(&mapping.id).await?;

            debug!(
                external_id = %payload.external_id,
                local_id = %product.id,
                "External product refreshed"
            );
            return Ok(product);
        }

        let created = match products
            .insert(
                ctx,
                NewProduct {
                    sku: payload.sku.clone(),
                    barcode: payload.barcode.clone(),
                    name: payload.name.clone(),
                    description: payload.description.clone(),
                    default_price: price,
                    standard_cost: None,
                    min_stock: 0,
                },
            )
            .await
        {
            Ok(product) => product,
            // SKU collision: the channel re-announced a product we already
            // carry locally. Adopt the existing row instead of failing.
            Err(e) if e.is_unique_violation() => products
                .get_by_sku(ctx, &payload.sku)
                .await?
                .ok_or_else(|| DbError::not_found("Product", &payload.sku))?,
            Err(e) => return Err(e),
        };

        self.insert_mapping(store_id, ENTITY_PRODUCT, &payload.external_id, &created.id)
            .await?;

        info!(
            external_id = %payload.external_id,
            local_id = %created.id,
            sku = %created.sku,
            "External product created"
        );
        Ok(created)
    }

    /// Creates or refreshes a local order from a channel payload.
    ///
    /// An already-mapped order only accepts a status refresh: line edits
    /// from the channel never rewrite a posted order. Lines whose product
    /// has no mapping yet are dropped with a warning; a payload where ALL
    /// lines drop is rejected rather than creating an empty order.
    pub async fn upsert_order(
        &self,
        ctx: &RequestContext,
        store_id: &str,
        payload: ExternalOrder,
    ) -> DbResult<OrderSyncOutcome> {
        let orders = OrderRepository::new(self.pool.clone());

        if let Some(existing) = orders
            .find_by_external_reference(store_id, &payload.external_id)
            .await?
        {
            let Some(next) = payload.status else {
                return Ok(OrderSyncOutcome::Unchanged(existing));
            };
            if next == existing.status {
                return Ok(OrderSyncOutcome::Unchanged(existing));
            }
            if !existing.status.can_transition_to(next) {
                // Out-of-order delivery: keep our state, don't fail the
                // webhook into the channel's retry loop.
                warn!(
                    order_id = %existing.id,
                    from = existing.status.as_str(),
                    to = next.as_str(),
                    "Ignoring invalid status transition from channel"
                );
                return Ok(OrderSyncOutcome::Unchanged(existing));
            }
            let updated = orders.update_status(ctx, &existing.id, next).await?;
            return Ok(OrderSyncOutcome::Updated(updated));
        }

        let mut lines = Vec::with_capacity(payload.lines.len());
        for line in &payload.lines {
            let Some(mapping) = self
                .get_mapping(store_id, ENTITY_PRODUCT, &line.external_product_id)
                .await?
            else {
                warn!(
                    external_order = %payload.external_id,
                    external_product = %line.external_product_id,
                    "Dropping order line: product not mapped"
                );
                continue;
            };

            let unit_price = parse_amount("unit_price", &line.unit_price)?;
            let discount = parse_optional_amount("discount", line.discount.as_deref())?;

            lines.push(NewOrderLine {
                product_id: mapping.local_id,
                qty: line.qty,
                unit_price: Some(unit_price),
                discount,
                tax_rate_bps: None,
            });
        }

        if lines.is_empty() {
            return Err(ValidationError::Required {
                field: "lines".to_string(),
            }
            .into());
        }

        let new_order = NewOrder {
            kind: OrderKind::Sale,
            party_id: payload.party_id,
            currency: payload.currency,
            lines,
            header_discount: parse_optional_amount("discount", payload.discount.as_deref())?,
            header_tax: parse_optional_amount("tax", payload.tax.as_deref())?,
            shipping: parse_optional_amount("shipping", payload.shipping.as_deref())?,
            external_reference: Some(payload.external_id.clone()),
            source_channel: Some(store_id.to_string()),
        };

        let created = match orders.create(ctx, new_order).await {
            Ok(order) => order,
            // Concurrent replay lost the insert race; the winner's order
            // is the canonical one.
            Err(e) if e.is_unique_violation() => {
                let existing = orders
                    .find_by_external_reference(store_id, &payload.external_id)
                    .await?
                    .ok_or_else(|| DbError::not_found("Order", &payload.external_id))?;
                return Ok(OrderSyncOutcome::Unchanged(existing));
            }
            Err(e) => return Err(e),
        };

        self.insert_mapping(store_id, ENTITY_ORDER, &payload.external_id, &created.header.id)
            .await?;

        info!(
            external_id = %payload.external_id,
            local_id = %created.header.id,
            lines = created.lines.len(),
            "External order created"
        );
        Ok(OrderSyncOutcome::Created(created))
    }

    /// Records a mapping; a concurrent duplicate is treated as success.
    async fn insert_mapping(
        &self,
        store_id: &str,
        entity_type: &str,
        external_id: &str,
        local_id: &str,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO external_mappings (
                id, store_id, entity_type, external_id, local_id, last_synced_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(new_id())
        .bind(store_id)
        .bind(entity_type)
        .bind(external_id)
        .bind(local_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let db_err = DbError::from(e);
                if db_err.is_unique_violation() {
                    Ok(())
                } else {
                    Err(db_err)
                }
            }
        }
    }

    async fn touch_mapping(&self, mapping_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE external_mappings SET last_synced_at = ?2 WHERE id = ?1")
            .bind(mapping_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Parses a channel decimal string ("19.99") into fixed-point money.
/// Never goes through floating point.
fn parse_amount(field: &str, value: &str) -> DbResult<Money> {
    value.parse::<Money>().map_err(|e| {
        ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn parse_optional_amount(field: &str, value: Option<&str>) -> DbResult<Money> {
    match value {
        Some(v) => parse_amount(field, v),
        None => Ok(Money::zero()),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

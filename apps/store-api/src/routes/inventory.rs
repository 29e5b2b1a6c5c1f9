//! Inventory endpoints: stock updates, bulk updates, and stock lookups.
//!
//! ## Bulk Updates Are Not Atomic
//! `bulk-update-stock` processes each item in its own transaction and
//! reports per-item outcomes. A failed item never blocks the rest of the
//! batch: partial progress plus a precise failure list beats all-or-nothing
//! for storefront imports, where item 37 of 80 having a typo shouldn't
//! discard the other 79.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::{validation, Money, Product, RequestContext, StockDirection};
use tally_db::repository;
use tally_db::repository::stock::NewStockMovement;

use crate::error::{ApiError, ApiResult};
use crate::response::Envelope;
use crate::state::AppState;

fn actor(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-actor-id").and_then(|v| v.to_str().ok())
}

/// How the `quantity` field is interpreted.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// `quantity` is the target level; the delta is derived.
    Set,
    /// `quantity` is a signed delta.
    Adjust,
}

/// One stock update. The product is addressed either by local id or by
/// the channel's external id (resolved through the sync mappings).
#[derive(Debug, Clone, Deserialize)]
pub struct StockUpdateRequest {
    pub product_id: Option<String>,
    pub external_id: Option<String>,
    pub quantity: i64,
    #[serde(rename = "type")]
    pub mode: UpdateMode,
    pub reason: Option<String>,
    pub warehouse_id: Option<String>,
}

impl StockUpdateRequest {
    /// The identifier the caller supplied, for error reporting.
    fn key(&self) -> String {
        self.product_id
            .clone()
            .or_else(|| self.external_id.clone())
            .unwrap_or_else(|| "<missing id>".to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StockUpdateResult {
    pub product_id: String,
    pub sku: String,
    pub old_quantity: i64,
    pub new_quantity: i64,
}

/// `POST /api/inventory/update-stock`
pub async fn update_stock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<StockUpdateRequest>,
) -> ApiResult<Json<Envelope<StockUpdateResult>>> {
    let ctx = state.api_context(actor(&headers));
    let result = apply_stock_update(&state, &ctx, &request).await?;
    Ok(Json(Envelope::ok("Stock updated", result)))
}

#[derive(Debug, Deserialize)]
pub struct BulkStockUpdateRequest {
    pub items: Vec<StockUpdateRequest>,
}

#[derive(Debug, Serialize)]
pub struct BulkItemFailure {
    pub id: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BulkStockUpdateResult {
    pub success: Vec<StockUpdateResult>,
    pub failed: Vec<BulkItemFailure>,
}

/// `POST /api/inventory/bulk-update-stock`
///
/// At most 100 items; each item is its own transaction.
pub async fn bulk_update_stock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BulkStockUpdateRequest>,
) -> ApiResult<Json<Envelope<BulkStockUpdateResult>>> {
    validation::validate_bulk_batch(request.items.len())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let ctx = state.api_context(actor(&headers));
    let mut success = Vec::new();
    let mut failed = Vec::new();

    for item in &request.items {
        match apply_stock_update(&state, &ctx, item).await {
            Ok(result) => success.push(result),
            Err(e) => failed.push(BulkItemFailure {
                id: item.key(),
                error: e.to_string(),
            }),
        }
    }

    let message = format!(
        "Processed {} items: {} succeeded, {} failed",
        request.items.len(),
        success.len(),
        failed.len()
    );
    Ok(Json(Envelope::ok(
        message,
        BulkStockUpdateResult { success, failed },
    )))
}

#[derive(Debug, Deserialize)]
pub struct StockQuery {
    pub warehouse_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StockLevel {
    pub product_id: String,
    pub quantity: i64,
    pub low_stock: bool,
}

/// `GET /api/inventory/:product_id/stock`
pub async fn get_stock(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    Query(query): Query<StockQuery>,
) -> ApiResult<Json<Envelope<StockLevel>>> {
    state
        .db
        .products()
        .get_by_id(&product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {product_id}")))?;

    let stock = state.db.stock();
    let quantity = stock
        .current_stock(&product_id, query.warehouse_id.as_deref())
        .await?;
    let low_stock = stock.is_low_stock(&product_id).await?;

    Ok(Json(Envelope::ok(
        "Stock level",
        StockLevel {
            product_id,
            quantity,
            low_stock,
        },
    )))
}

/// Resolves the product (local id first, channel external id second).
async fn resolve_product(
    state: &AppState,
    request: &StockUpdateRequest,
) -> ApiResult<Product> {
    if let Some(product_id) = &request.product_id {
        return state
            .db
            .products()
            .get_by_id(product_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Product not found: {product_id}")));
    }

    if let Some(external_id) = &request.external_id {
        let mapping = state
            .db
            .sync()
            .get_mapping(&state.config.store_id, "product", external_id)
            .await?
            .ok_or_else(|| {
                ApiError::NotFound(format!("No product mapped for external id: {external_id}"))
            })?;
        return state
            .db
            .products()
            .get_by_id(&mapping.local_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Product not found: {}", mapping.local_id)));
    }

    Err(ApiError::BadRequest(
        "either product_id or external_id is required".to_string(),
    ))
}

/// Derives the movement from the mode and records it.
async fn apply_stock_update(
    state: &AppState,
    ctx: &RequestContext,
    request: &StockUpdateRequest,
) -> ApiResult<StockUpdateResult> {
    let product = resolve_product(state, request).await?;

    let stock = state.db.stock();
    let old_quantity = stock
        .current_stock(&product.id, request.warehouse_id.as_deref())
        .await?;

    let delta = match request.mode {
        UpdateMode::Set => request.quantity - old_quantity,
        UpdateMode::Adjust => request.quantity,
    };

    if delta == 0 {
        // Already at the target level; nothing to append.
        return Ok(StockUpdateResult {
            product_id: product.id,
            sku: product.sku,
            old_quantity,
            new_quantity: old_quantity,
        });
    }

    let direction = if delta > 0 {
        StockDirection::In
    } else {
        StockDirection::Out
    };

    let unit_cost = product.standard_cost.unwrap_or(Money::zero());
    stock
        .record(
            ctx,
            NewStockMovement {
                product_id: product.id.clone(),
                warehouse_id: request.warehouse_id.clone(),
                direction,
                qty: delta.abs(),
                unit_cost,
                reference_type: "adjustment".to_string(),
                reference_id: repository::new_id(),
                reason: request.reason.clone(),
            },
        )
        .await?;

    Ok(StockUpdateResult {
        product_id: product.id,
        sku: product.sku,
        old_quantity,
        new_quantity: old_quantity + delta,
    })
}

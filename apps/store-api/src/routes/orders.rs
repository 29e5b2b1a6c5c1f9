//! Order endpoints: creation, lookup, listing, status changes, payments.
//!
//! Handlers stay thin: deserialize, build a [`RequestContext`], call the
//! repository, wrap the result in the envelope. All business rules live
//! below this layer.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::{
    Money, NewOrder, NewOrderLine, OrderKind, OrderStatus, SettlementEntry, SettlementMethod,
    SettlementStatus,
};
use tally_db::repository::settlement::NewSettlement;
use tally_db::{OrderFilter, OrderWithLines};

use crate::error::{ApiError, ApiResult};
use crate::response::{Envelope, PageEnvelope};
use crate::state::AppState;

fn actor(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-actor-id").and_then(|v| v.to_str().ok())
}

/// One order line on the wire. Amounts are decimal strings ("10.99"),
/// the same convention the channel and the payment endpoint use.
#[derive(Debug, Deserialize)]
pub struct CreateOrderLine {
    pub product_id: String,
    pub qty: i64,
    /// Price override; defaults to the product's price.
    pub unit_price: Option<String>,
    /// Absolute line discount.
    pub discount: Option<String>,
    pub tax_rate_bps: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub kind: OrderKind,
    pub party_id: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub lines: Vec<CreateOrderLine>,
    /// Header adjustments, decimal strings.
    pub discount: Option<String>,
    pub tax: Option<String>,
    pub shipping: Option<String>,
    pub external_reference: Option<String>,
    pub source_channel: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl CreateOrderRequest {
    fn into_new_order(self) -> Result<NewOrder, ApiError> {
        let mut lines = Vec::with_capacity(self.lines.len());
        for line in self.lines {
            let unit_price = match line.unit_price.as_deref() {
                Some(value) => Some(parse_amount("unit_price", value)?),
                None => None,
            };
            lines.push(NewOrderLine {
                product_id: line.product_id,
                qty: line.qty,
                unit_price,
                discount: parse_optional_amount("discount", line.discount.as_deref())?,
                tax_rate_bps: line.tax_rate_bps,
            });
        }

        Ok(NewOrder {
            kind: self.kind,
            party_id: self.party_id,
            currency: self.currency,
            lines,
            header_discount: parse_optional_amount("discount", self.discount.as_deref())?,
            header_tax: parse_optional_amount("tax", self.tax.as_deref())?,
            shipping: parse_optional_amount("shipping", self.shipping.as_deref())?,
            external_reference: self.external_reference,
            source_channel: self.source_channel,
        })
    }
}

fn parse_amount(field: &str, value: &str) -> Result<Money, ApiError> {
    value
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid {field}: {e}")))
}

fn parse_optional_amount(field: &str, value: Option<&str>) -> Result<Money, ApiError> {
    match value {
        Some(value) => parse_amount(field, value),
        None => Ok(Money::zero()),
    }
}

/// `POST /api/orders`
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<OrderWithLines>>)> {
    let ctx = state.api_context(actor(&headers));
    let order = state.db.orders().create(&ctx, request.into_new_order()?).await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok("Order created", order)),
    ))
}

/// Full order view: header, lines, and the settlement trail.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderWithLines,
    pub payments: Vec<SettlementEntry>,
}

/// `GET /api/orders/:id`
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Envelope<OrderDetail>>> {
    let order = state
        .db
        .orders()
        .get_with_lines(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order not found: {id}")))?;
    let payments = state.db.settlements().payments_for_order(&id).await?;

    Ok(Json(Envelope::ok("Order", OrderDetail { order, payments })))
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub kind: Option<OrderKind>,
    pub status: Option<OrderStatus>,
    pub party_id: Option<String>,
    pub source_channel: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    50
}

/// `GET /api/orders`
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<Json<Envelope<PageEnvelope<tally_core::OrderHeader>>>> {
    let filter = OrderFilter {
        kind: query.kind,
        status: query.status,
        branch_id: Some(state.config.default_branch_id.clone()),
        party_id: query.party_id,
        source_channel: query.source_channel,
    };

    let page = state
        .db
        .orders()
        .list(&filter, query.page, query.per_page)
        .await?;

    Ok(Json(Envelope::ok("Orders", PageEnvelope::from(page))))
}

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: OrderStatus,
}

/// `PATCH /api/orders/:id/status`
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<StatusChangeRequest>,
) -> ApiResult<Json<Envelope<tally_core::OrderHeader>>> {
    let ctx = state.api_context(actor(&headers));
    let header = state
        .db
        .orders()
        .update_status(&ctx, &id, request.status)
        .await?;

    Ok(Json(Envelope::ok("Order status updated", header)))
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub method: SettlementMethod,
    /// Decimal string, e.g. "49.99". Same wire convention as the channel.
    pub amount: String,
    pub reference_no: Option<String>,
}

/// `POST /api/orders/:id/payments`
pub async fn apply_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<PaymentRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<SettlementEntry>>)> {
    let amount = parse_amount("amount", &request.amount)?;

    let ctx = state.api_context(actor(&headers));
    let entry = state
        .db
        .settlements()
        .apply(
            &ctx,
            NewSettlement {
                order_id: id,
                method: request.method,
                amount,
                reference_no: request.reference_no,
                status: SettlementStatus::Completed,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok("Payment applied", entry)),
    ))
}

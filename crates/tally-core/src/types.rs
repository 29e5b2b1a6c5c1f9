//! # Domain Types
//!
//! Core domain types for the stock-ledger and order-settlement engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Product      │   │   OrderHeader   │   │  SettlementEntry    │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────      │   │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)          │   │
//! │  │  sku (business) │   │  kind/status    │   │  order_id (FK)      │   │
//! │  │  min_stock      │   │  totals         │   │  method/amount      │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────┐   ┌─────────────────┐   ┌─────────────────┐   │
//! │  │ StockMovementEntry  │   │   OrderLine     │   │ ExternalMapping │   │
//! │  │  append-only fact   │   │  frozen on post │   │ idempotency key │   │
//! │  └─────────────────────┘   └─────────────────┘   └─────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has:
//! - `id`: UUID v4 - immutable, used for database relations
//! - Business ID: (sku, external reference, etc.) - human-readable
//!
//! ## Derived, Never Cached
//! `Product` carries no stock quantity. Current stock is always an
//! aggregation over `StockMovementEntry` rows; `paid_total`/`due_total` on
//! the order header are projections re-derived from the settlement ledger
//! inside the same transaction that appends to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000
/// 825 bps = 8.25%
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Explicit caller context passed into every mutating operation.
///
/// There is no ambient "current user" anywhere in the engine: the acting
/// user and branch scope always travel as parameters, so every audit row
/// and branch check is reproducible from the call site alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Acting user or service principal.
    pub actor_id: String,
    /// Branch the caller operates in; products and orders are scoped to it.
    pub branch_id: String,
}

impl RequestContext {
    pub fn new(actor_id: impl Into<String>, branch_id: impl Into<String>) -> Self {
        RequestContext {
            actor_id: actor_id.into(),
            branch_id: branch_id.into(),
        }
    }
}

// =============================================================================
// Product
// =============================================================================

/// A product that can appear on order lines and in the stock ledger.
///
/// Deliberately has NO current-quantity field: stock is a derived
/// projection over the movement ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Branch this product belongs to.
    pub branch_id: String,

    /// Stock Keeping Unit - business identifier, unique per branch.
    pub sku: String,

    /// Barcode (EAN-13, UPC-A, etc.), unique per branch when present.
    pub barcode: Option<String>,

    /// Display name.
    pub name: String,

    /// Optional description.
    pub description: Option<String>,

    /// Default selling price.
    pub default_price: Money,

    /// Standard purchase cost, used when a movement has no explicit cost.
    pub standard_cost: Option<Money>,

    /// Low-stock threshold; 0 disables the low-stock flag.
    pub min_stock: i64,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Checks whether this product may appear on an order for `branch_id`.
    pub fn available_in(&self, branch_id: &str) -> bool {
        self.is_active && self.branch_id == branch_id
    }
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Direction of a stock movement. Quantity is always positive; the
/// direction encodes the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum StockDirection {
    /// Quantity enters the warehouse (purchase, return, adjustment up).
    In,
    /// Quantity leaves the warehouse (sale, shrinkage, adjustment down).
    Out,
}

impl StockDirection {
    /// The opposite direction, used for compensating entries.
    #[inline]
    pub const fn flipped(&self) -> Self {
        match self {
            StockDirection::In => StockDirection::Out,
            StockDirection::Out => StockDirection::In,
        }
    }

    /// Signed multiplier for aggregation (`in` = +1, `out` = -1).
    #[inline]
    pub const fn sign(&self) -> i64 {
        match self {
            StockDirection::In => 1,
            StockDirection::Out => -1,
        }
    }
}

/// An immutable stock ledger fact.
///
/// Created once per triggering event, never updated or deleted. Corrections
/// are compensating entries in the opposite direction with the same
/// quantity and reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockMovementEntry {
    pub id: String,
    pub product_id: String,
    /// Warehouse scope; None means the branch default location.
    pub warehouse_id: Option<String>,
    pub direction: StockDirection,
    /// Always positive; direction carries the sign.
    pub qty: i64,
    /// Unit cost at the time of the movement.
    pub unit_cost: Money,
    /// What caused this movement: "order", "adjustment", "reversal:order", ...
    pub reference_type: String,
    /// Id of the causing entity (order id, adjustment id, ...).
    pub reference_id: String,
    /// Acting user recorded for the audit trail.
    pub actor_id: String,
    pub occurred_at: DateTime<Utc>,
}

// =============================================================================
// Orders
// =============================================================================

/// Whether an order moves stock out (sale) or in (purchase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Sale,
    Purchase,
}

impl OrderKind {
    /// Stock direction implied by the order kind.
    #[inline]
    pub const fn stock_direction(&self) -> StockDirection {
        match self {
            OrderKind::Sale => StockDirection::Out,
            OrderKind::Purchase => StockDirection::In,
        }
    }
}

/// Order lifecycle status.
///
/// ```text
/// draft ──► pending ──► processing ──► completed ──► refunded
///   │          │            │
///   └──────────┴────────────┴───────► cancelled
/// ```
///
/// `cancelled` and `refunded` are terminal. Transitioning into them does
/// NOT emit compensating stock or settlement entries; reversal is an
/// explicit ledger operation the caller invokes separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Draft,
    Pending,
    Processing,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Validates a status transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Draft, Cancelled)
                | (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Cancelled)
                | (Completed, Refunded)
        )
    }

    /// Lines may only change while the order is draft or pending.
    #[inline]
    pub const fn lines_frozen(&self) -> bool {
        !matches!(self, OrderStatus::Draft | OrderStatus::Pending)
    }

    /// Terminal states allow no further transitions.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Stable lowercase name (matches storage and wire format).
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

/// A sale or purchase order header with derived monetary totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderHeader {
    pub id: String,
    pub kind: OrderKind,
    pub branch_id: String,
    /// Customer (sale) or supplier (purchase).
    pub party_id: String,
    pub status: OrderStatus,
    /// ISO currency code; informational, no conversion happens here.
    pub currency: String,
    pub sub_total: Money,
    pub discount_total: Money,
    pub tax_total: Money,
    pub shipping_total: Money,
    pub grand_total: Money,
    pub paid_total: Money,
    /// `max(0, grand_total - paid_total)`; the settlement ledger keeps the
    /// raw amounts, only this projection clamps.
    pub due_total: Money,
    /// Channel order id for externally-created orders.
    pub external_reference: Option<String>,
    /// Channel name; unique together with `external_reference`.
    pub source_channel: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item on an order.
///
/// Uses the snapshot pattern: sku/name/price are frozen at order time so
/// later product edits never rewrite history. Lines are immutable once the
/// order status freezes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// SKU at order time (frozen).
    pub sku_snapshot: String,
    /// Product name at order time (frozen).
    pub name_snapshot: String,
    pub qty: i64,
    pub unit_price: Money,
    /// Absolute discount, already clamped to `[0, qty * unit_price]`.
    pub discount: Money,
    pub tax_rate_bps: u32,
    /// `qty * unit_price` before discount and tax.
    pub gross: Money,
    pub tax: Money,
    /// `gross - discount + tax`.
    pub line_total: Money,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Order Creation Input
// =============================================================================

/// Input for creating one order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub product_id: String,
    pub qty: i64,
    /// Price override; defaults to the product's `default_price`.
    pub unit_price: Option<Money>,
    /// Absolute line discount (clamped, never errors when too large).
    #[serde(default)]
    pub discount: Money,
    /// Tax rate override in bps; defaults to 0.
    pub tax_rate_bps: Option<u32>,
}

/// Input for creating an order (header adjustments + lines).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub kind: OrderKind,
    pub party_id: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub lines: Vec<NewOrderLine>,
    /// Header-level absolute discount, clamped to `[0, sub_total]`.
    #[serde(default)]
    pub header_discount: Money,
    /// Header-level tax amount added after the discount clamp.
    #[serde(default)]
    pub header_tax: Money,
    #[serde(default)]
    pub shipping: Money,
    pub external_reference: Option<String>,
    pub source_channel: Option<String>,
}

fn default_currency() -> String {
    "USD".to_string()
}

// =============================================================================
// Settlement Ledger
// =============================================================================

/// How a settlement entry was tendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum SettlementMethod {
    Cash,
    Card,
    BankTransfer,
    /// External payment gateway; `reference_no` is the gateway's id and
    /// acts as the replay-detection key.
    Gateway,
}

/// Status of a settlement entry. Only `completed` entries count towards
/// `paid_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Completed,
    Failed,
}

/// A payment (sale) or disbursement (purchase) applied against an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SettlementEntry {
    pub id: String,
    pub order_id: String,
    pub method: SettlementMethod,
    /// Always positive.
    pub amount: Money,
    /// Gateway/bank reference; unique per (order, method) when present.
    pub reference_no: Option<String>,
    pub status: SettlementStatus,
    pub actor_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// External Sync
// =============================================================================

/// The join point between internal entities and an external channel.
///
/// Unique on `(store_id, entity_type, external_id)` - this is the
/// idempotency key that makes at-least-once webhook delivery safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ExternalMapping {
    pub id: String,
    pub store_id: String,
    /// "product" or "order".
    pub entity_type: String,
    pub external_id: String,
    pub local_id: String,
    pub last_synced_at: DateTime<Utc>,
}

/// Product payload as delivered by the external channel.
///
/// Amounts arrive as decimal strings and are parsed into fixed-point
/// `Money`; never through floating point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalProduct {
    pub external_id: String,
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Decimal string, e.g. "19.99".
    pub price: String,
    #[serde(default)]
    pub barcode: Option<String>,
}

/// Order line payload from the external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalOrderLine {
    pub external_product_id: String,
    pub qty: i64,
    /// Decimal string.
    pub unit_price: String,
    /// Decimal string, absolute discount for the line.
    #[serde(default)]
    pub discount: Option<String>,
}

/// Order payload from the external channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalOrder {
    pub external_id: String,
    pub party_id: String,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default = "default_currency")]
    pub currency: String,
    pub lines: Vec<ExternalOrderLine>,
    /// Decimal strings for header adjustments.
    #[serde(default)]
    pub discount: Option<String>,
    #[serde(default)]
    pub tax: Option<String>,
    #[serde(default)]
    pub shipping: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(825);
        assert_eq!(rate.bps(), 825);
        assert!((rate.percentage() - 8.25).abs() < 0.001);
    }

    #[test]
    fn test_order_kind_stock_direction() {
        assert_eq!(OrderKind::Sale.stock_direction(), StockDirection::Out);
        assert_eq!(OrderKind::Purchase.stock_direction(), StockDirection::In);
    }

    #[test]
    fn test_direction_flip_and_sign() {
        assert_eq!(StockDirection::In.flipped(), StockDirection::Out);
        assert_eq!(StockDirection::Out.flipped(), StockDirection::In);
        assert_eq!(StockDirection::In.sign(), 1);
        assert_eq!(StockDirection::Out.sign(), -1);
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::*;

        assert!(Draft.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Completed.can_transition_to(Refunded));
        assert!(Pending.can_transition_to(Cancelled));

        // No skipping forward, no leaving terminal states
        assert!(!Draft.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Refunded));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Refunded.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn test_lines_frozen() {
        assert!(!OrderStatus::Draft.lines_frozen());
        assert!(!OrderStatus::Pending.lines_frozen());
        assert!(OrderStatus::Processing.lines_frozen());
        assert!(OrderStatus::Completed.lines_frozen());
        assert!(OrderStatus::Cancelled.lines_frozen());
    }

    #[test]
    fn test_product_branch_scope() {
        let product = Product {
            id: "p1".into(),
            branch_id: "branch-a".into(),
            sku: "SKU-1".into(),
            barcode: None,
            name: "Widget".into(),
            description: None,
            default_price: Money::from_major(10),
            standard_cost: None,
            min_stock: 0,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(product.available_in("branch-a"));
        assert!(!product.available_in("branch-b"));

        let inactive = Product {
            is_active: false,
            ..product
        };
        assert!(!inactive.available_in("branch-a"));
    }

    #[test]
    fn test_external_payload_deserializes() {
        let json = r#"{
            "external_id": "ext-1",
            "party_id": "cust-9",
            "lines": [
                {"external_product_id": "ep-1", "qty": 2, "unit_price": "10.00"}
            ]
        }"#;
        let order: ExternalOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.external_id, "ext-1");
        assert_eq!(order.currency, "USD");
        assert_eq!(order.lines.len(), 1);
        assert!(order.status.is_none());
    }
}

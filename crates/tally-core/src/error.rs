//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                          │
//! │  ├── CoreError        - Domain rule violations                          │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                       │
//! │  └── DbError          - Database operation failures                     │
//! │                                                                         │
//! │  store-api errors (app)                                                 │
//! │  └── ApiError         - HTTP status + response envelope                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Client        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (SKU, ID, amounts)
//! 3. Errors are enum variants, never String - callers branch on kind
//! 4. A domain error always aborts the enclosing transaction

use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Domain rule violations.
///
/// Every variant aborts the operation it occurs in; nothing is partially
/// applied when one of these surfaces.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The product cannot be used on this order: wrong branch, inactive,
    /// or missing entirely.
    #[error("Product unavailable ({product}): {reason}")]
    ProductUnavailable { product: String, reason: String },

    /// A stock movement or order line carried a non-positive quantity.
    /// The ledger only stores positive quantities; direction encodes sign.
    #[error("Invalid quantity {qty}: must be positive")]
    InvalidQuantity { qty: i64 },

    /// An order line failed arithmetic validation (qty <= 0 or negative
    /// unit price).
    #[error("Invalid order line: {reason}")]
    InvalidLine { reason: String },

    /// Recomputed totals disagree with the persisted header beyond the
    /// 0.01 epsilon. Defensive invariant check.
    #[error("Order {order_id} totals out of balance: stored {stored}, computed {computed}")]
    UnbalancedTotals {
        order_id: String,
        stored: Money,
        computed: Money,
    },

    /// Requested status change is not an allowed transition.
    #[error("Order {order_id}: cannot transition from {from} to {to}")]
    InvalidStatusTransition {
        order_id: String,
        from: String,
        to: String,
    },

    /// Settlement amount must be strictly positive.
    #[error("Invalid settlement amount {amount}: must be positive")]
    InvalidSettlementAmount { amount: Money },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These occur before any business logic or persistence runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, unparsable decimal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Batch exceeds the per-request limit.
    #[error("batch of {got} items exceeds limit of {max}")]
    BatchTooLarge { got: usize, max: usize },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::ProductUnavailable {
            product: "SKU-COKE".to_string(),
            reason: "belongs to another branch".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Product unavailable (SKU-COKE): belongs to another branch"
        );

        let err = CoreError::InvalidQuantity { qty: -3 };
        assert_eq!(err.to_string(), "Invalid quantity -3: must be positive");
    }

    #[test]
    fn test_unbalanced_totals_message() {
        let err = CoreError::UnbalancedTotals {
            order_id: "o-1".to_string(),
            stored: Money::from_major(70),
            computed: Money::from_major(65),
        };
        assert_eq!(
            err.to_string(),
            "Order o-1 totals out of balance: stored 70.00, computed 65.00"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "sku".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}

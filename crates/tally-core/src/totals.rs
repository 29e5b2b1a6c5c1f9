//! # Totals Module
//!
//! Pure arithmetic for line totals and order totals.
//!
//! ## Clamp-Then-Combine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  DISCOUNT CLAMPING ORDER (normative)                                    │
//! │                                                                         │
//! │  line:   gross = qty × unit_price                                       │
//! │          discount' = clamp(discount, 0, gross)     ← BEFORE tax         │
//! │          tax = (gross − discount') × rate                               │
//! │          total = gross − discount' + tax                                │
//! │                                                                         │
//! │  order:  sub_total = Σ line totals                                      │
//! │          header_discount' = clamp(header_discount, 0, sub_total)        │
//! │          grand = sub_total − header_discount' + header_tax + shipping   │
//! │                                                                         │
//! │  A discount larger than the amount it applies to silently truncates.    │
//! │  This is documented behavior, covered by tests, not a bug to fix.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::TaxRate;

// =============================================================================
// Result Types
// =============================================================================

/// Breakdown of a single line's totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    /// `qty * unit_price` before any adjustment.
    pub gross: Money,
    /// Discount after clamping to `[0, gross]`.
    pub discount: Money,
    /// Tax on the discounted amount.
    pub tax: Money,
    /// `gross - discount + tax`. Never negative.
    pub total: Money,
}

/// Breakdown of an order's header totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub sub_total: Money,
    /// Header discount after clamping to `[0, sub_total]`.
    pub discount_total: Money,
    pub tax_total: Money,
    pub shipping_total: Money,
    /// `sub_total - discount_total + tax_total + shipping_total`.
    pub grand_total: Money,
}

// =============================================================================
// Line Total
// =============================================================================

/// Computes one line's totals.
///
/// ## Errors
/// `CoreError::InvalidLine` when `qty <= 0` or `unit_price < 0`.
///
/// ## Example
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::totals::line_total;
/// use tally_core::types::TaxRate;
///
/// // qty=2 @ 10.00, discount 25.00 clamps to 20.00 -> total 0, not negative
/// let t = line_total(2, Money::from_major(10), Money::from_major(25), TaxRate::zero()).unwrap();
/// assert_eq!(t.discount, Money::from_major(20));
/// assert!(t.total.is_zero());
/// ```
pub fn line_total(
    qty: i64,
    unit_price: Money,
    discount: Money,
    tax_rate: TaxRate,
) -> CoreResult<LineTotals> {
    if qty <= 0 {
        return Err(CoreError::InvalidLine {
            reason: format!("quantity {} must be positive", qty),
        });
    }
    if unit_price.is_negative() {
        return Err(CoreError::InvalidLine {
            reason: format!("unit price {} must not be negative", unit_price),
        });
    }

    let gross = unit_price.multiply_quantity(qty);
    let discount = discount.clamp(Money::zero(), gross);
    let taxable = gross - discount;
    let tax = taxable.calculate_tax(tax_rate);

    Ok(LineTotals {
        gross,
        discount,
        tax,
        total: taxable + tax,
    })
}

// =============================================================================
// Order Totals
// =============================================================================

/// Combines line totals with header-level adjustments.
///
/// The header discount is clamped against the summed sub-total BEFORE the
/// grand total is combined; `header_tax` and `shipping` are taken as
/// amounts, not rates.
pub fn order_totals(
    lines: &[LineTotals],
    header_discount: Money,
    header_tax: Money,
    shipping: Money,
) -> OrderTotals {
    let sub_total = lines
        .iter()
        .fold(Money::zero(), |acc, line| acc + line.total);

    let discount_total = header_discount.clamp(Money::zero(), sub_total);
    let shipping_total = shipping.max(Money::zero());

    OrderTotals {
        sub_total,
        discount_total,
        tax_total: header_tax,
        shipping_total,
        grand_total: sub_total - discount_total + header_tax + shipping_total,
    }
}

/// Checks the header-totals invariant within the 0.01 epsilon.
///
/// `grand_total == sub_total - discount_total + tax_total + shipping_total`
pub fn totals_balanced(totals: &OrderTotals) -> bool {
    let computed =
        totals.sub_total - totals.discount_total + totals.tax_total + totals.shipping_total;
    totals.grand_total.approx_eq(computed)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn money(major: i64) -> Money {
        Money::from_major(major)
    }

    #[test]
    fn test_simple_line() {
        let t = line_total(3, money(10), Money::zero(), TaxRate::zero()).unwrap();
        assert_eq!(t.gross, money(30));
        assert_eq!(t.discount, Money::zero());
        assert_eq!(t.tax, Money::zero());
        assert_eq!(t.total, money(30));
    }

    #[test]
    fn test_line_discount_clamps_to_gross() {
        // qty=2, price=10, discount=25 -> clamped to 20, total 0
        let t = line_total(2, money(10), money(25), TaxRate::zero()).unwrap();
        assert_eq!(t.discount, money(20));
        assert!(t.total.is_zero());
        assert!(!t.total.is_negative());
    }

    #[test]
    fn test_negative_discount_clamps_to_zero() {
        let t = line_total(1, money(10), money(-5), TaxRate::zero()).unwrap();
        assert_eq!(t.discount, Money::zero());
        assert_eq!(t.total, money(10));
    }

    #[test]
    fn test_tax_applies_to_discounted_amount() {
        // gross 100, discount 20 -> taxable 80 @ 10% = 8, total 88
        let t = line_total(10, money(10), money(20), TaxRate::from_bps(1000)).unwrap();
        assert_eq!(t.tax, money(8));
        assert_eq!(t.total, money(88));
    }

    #[test]
    fn test_invalid_lines_rejected() {
        assert!(matches!(
            line_total(0, money(10), Money::zero(), TaxRate::zero()),
            Err(CoreError::InvalidLine { .. })
        ));
        assert!(matches!(
            line_total(-2, money(10), Money::zero(), TaxRate::zero()),
            Err(CoreError::InvalidLine { .. })
        ));
        assert!(matches!(
            line_total(1, money(-1), Money::zero(), TaxRate::zero()),
            Err(CoreError::InvalidLine { .. })
        ));
    }

    #[test]
    fn test_checkout_scenario() {
        // items = [{qty:2, price:10, discount:0}, {qty:1, price:50, discount:5}]
        let lines = vec![
            line_total(2, money(10), Money::zero(), TaxRate::zero()).unwrap(),
            line_total(1, money(50), money(5), TaxRate::zero()).unwrap(),
        ];
        let totals = order_totals(&lines, Money::zero(), Money::zero(), Money::zero());

        assert_eq!(totals.sub_total, money(65));
        assert_eq!(totals.discount_total, Money::zero());
        assert_eq!(totals.grand_total, money(65));
        assert!(totals_balanced(&totals));
    }

    #[test]
    fn test_checkout_scenario_no_line_discounts() {
        // items = [{qty:2, price:10}, {qty:1, price:50}], no adjustments
        let lines = vec![
            line_total(2, money(10), Money::zero(), TaxRate::zero()).unwrap(),
            line_total(1, money(50), Money::zero(), TaxRate::zero()).unwrap(),
        ];
        let totals = order_totals(&lines, Money::zero(), Money::zero(), Money::zero());

        assert_eq!(totals.sub_total, money(70));
        assert_eq!(totals.discount_total, Money::zero());
        assert_eq!(totals.grand_total, money(70));
    }

    #[test]
    fn test_header_discount_clamps_before_combining() {
        // sub 30, header discount 100 clamps to 30, then shipping 5 added.
        // Clamp happens against sub_total alone, NOT sub_total + shipping.
        let lines = vec![line_total(3, money(10), Money::zero(), TaxRate::zero()).unwrap()];
        let totals = order_totals(&lines, money(100), Money::zero(), money(5));

        assert_eq!(totals.discount_total, money(30));
        assert_eq!(totals.grand_total, money(5));
    }

    #[test]
    fn test_empty_order() {
        let totals = order_totals(&[], money(10), Money::zero(), Money::zero());
        assert_eq!(totals.sub_total, Money::zero());
        assert_eq!(totals.discount_total, Money::zero());
        assert_eq!(totals.grand_total, Money::zero());
    }

    #[test]
    fn test_totals_balanced_detects_drift() {
        let mut totals = order_totals(&[], Money::zero(), Money::zero(), Money::zero());
        assert!(totals_balanced(&totals));

        totals.grand_total = money(1);
        assert!(!totals_balanced(&totals));
    }
}

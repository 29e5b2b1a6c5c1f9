//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Fixed-Point Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Over thousands of ledger lines this drift becomes a real              │
//! │  reconciliation problem.                                                │
//! │                                                                         │
//! │  OUR SOLUTION: i64 at 4 fractional digits                               │
//! │    10.9900 is stored as 109_900                                         │
//! │    Unit costs keep 4 digits; display rounds to 2.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//!
//! // Create from whole currency units
//! let price = Money::from_major(10);            // 10.0000
//! let precise = Money::from_scaled(109_900);    // 10.9900
//!
//! let total = price + precise;
//! assert_eq!(total.scaled(), 209_900);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::str::FromStr;

use crate::types::TaxRate;

/// Number of scaled units per whole currency unit (4 fractional digits).
pub const MONEY_SCALE: i64 = 10_000;

/// Epsilon for totals comparisons: 0.01 in display units.
pub const MONEY_EPSILON: i64 = 100;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value as a fixed-point integer with 4 fractional digits.
///
/// ## Design Decisions
/// - **i64 (signed)**: allows negative values for refunds and adjustments
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **4 fractional digits**: unit costs/prices keep sub-cent precision;
///   display rounds to 2 digits
///
/// Every monetary value in the system (prices, discounts, taxes, paid/due
/// totals) flows through this type. Quantities stay plain `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from scaled units (ten-thousandths).
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let price = Money::from_scaled(109_900); // 10.99
    /// assert_eq!(price.scaled(), 109_900);
    /// ```
    #[inline]
    pub const fn from_scaled(scaled: i64) -> Self {
        Money(scaled)
    }

    /// Creates a Money value from whole currency units.
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * MONEY_SCALE)
    }

    /// Creates a Money value from major units and display cents.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let price = Money::from_major_minor(10, 99); // 10.99
    /// assert_eq!(price.scaled(), 109_900);
    ///
    /// let refund = Money::from_major_minor(-5, 50); // -5.50
    /// assert_eq!(refund.scaled(), -55_000);
    /// ```
    ///
    /// ## Note
    /// For negative amounts, only the major unit should be negative.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * MONEY_SCALE - minor * 100)
        } else {
            Money(major * MONEY_SCALE + minor * 100)
        }
    }

    /// Returns the raw scaled value (ten-thousandths).
    #[inline]
    pub const fn scaled(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / MONEY_SCALE
    }

    /// Returns the display cents portion (always 0-99, absolute).
    #[inline]
    pub const fn minor_display(&self) -> i64 {
        ((self.0 % MONEY_SCALE) / 100).abs()
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the smaller of two values.
    #[inline]
    pub fn min(self, other: Self) -> Self {
        Money(self.0.min(other.0))
    }

    /// Returns the larger of two values.
    #[inline]
    pub fn max(self, other: Self) -> Self {
        Money(self.0.max(other.0))
    }

    /// Clamps this value into `[lo, hi]`.
    ///
    /// This is the building block for discount bounding: a discount larger
    /// than the amount it applies to silently truncates, it never errors.
    #[inline]
    pub fn clamp(self, lo: Self, hi: Self) -> Self {
        Money(self.0.clamp(lo.0, hi.0))
    }

    /// Calculates tax on this amount.
    ///
    /// ## Implementation
    /// Integer math with an i128 intermediate: `(amount * bps + 5000) / 10000`.
    /// The `+5000` rounds the half-unit boundary up.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::TaxRate;
    ///
    /// let price = Money::from_major(10);   // 10.0000
    /// let rate = TaxRate::from_bps(825);   // 8.25%
    ///
    /// let tax = price.calculate_tax(rate);
    /// assert_eq!(tax.scaled(), 8_250); // 0.8250
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        // i128 prevents overflow on large amounts
        let tax = (self.0 as i128 * rate.bps() as i128 + 5_000) / 10_000;
        Money::from_scaled(tax as i64)
    }

    /// Multiplies money by a quantity.
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Checks whether two amounts agree within the totals epsilon (0.01).
    #[inline]
    pub fn approx_eq(&self, other: Money) -> bool {
        (self.0 - other.0).abs() <= MONEY_EPSILON
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Error returned when a decimal money string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMoneyError(pub String);

impl fmt::Display for ParseMoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid money value: {}", self.0)
    }
}

impl std::error::Error for ParseMoneyError {}

/// Parses decimal strings like `"10.99"`, `"-5.5"`, `"12.3456"`.
///
/// External channels deliver amounts as decimal strings; this is the only
/// ingestion path for them. At most 4 fractional digits are kept, extra
/// digits are rejected rather than silently rounded.
impl FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ParseMoneyError(s.to_string()));
        }

        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(ParseMoneyError(s.to_string()));
        }
        if frac_part.len() > 4 {
            return Err(ParseMoneyError(s.to_string()));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(ParseMoneyError(s.to_string()));
        }

        let major: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| ParseMoneyError(s.to_string()))?
        };

        // Right-pad the fraction to 4 digits: "5" -> 5000
        let mut frac: i64 = 0;
        if !frac_part.is_empty() {
            frac = frac_part.parse().map_err(|_| ParseMoneyError(s.to_string()))?;
            for _ in 0..(4 - frac_part.len()) {
                frac *= 10;
            }
        }

        let scaled = major * MONEY_SCALE + frac;
        Ok(Money(if negative { -scaled } else { scaled }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display renders 2 fractional digits. This is the display projection;
/// storage and arithmetic keep all 4 digits.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_display())
    }
}

/// Default money is zero.
impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

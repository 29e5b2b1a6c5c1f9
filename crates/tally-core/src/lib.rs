//! # tally-core: Pure Business Logic for Tally
//!
//! This crate is the **heart** of the stock-ledger and order-settlement
//! engine. It contains all business rules as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Tally Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                  store-api (axum HTTP)                          │    │
//! │  │    POST /orders ── PATCH status ── inventory ── webhooks        │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               ★ tally-core (THIS CRATE) ★                       │    │
//! │  │                                                                 │    │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐   │    │
//! │  │   │   types   │  │   money   │  │  totals   │  │ validation│   │    │
//! │  │   │  Product  │  │   Money   │  │ line math │  │   rules   │   │    │
//! │  │   │  Orders   │  │  TaxRate  │  │ clamping  │  │  checks   │   │    │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘   │    │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │                   tally-db (Database Layer)                     │    │
//! │  │        SQLite ledgers, migrations, repositories                 │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, OrderHeader, StockMovementEntry, ...)
//! - [`money`] - Fixed-point money (4 fractional digits, no floating point!)
//! - [`totals`] - Line and order total arithmetic with discount clamping
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation rules
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: deterministic - same input, same output
//! 2. **No I/O**: database, network, file system access is FORBIDDEN here
//! 3. **Fixed-Point Money**: i64 at 4 fractional digits, no float drift
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//! 5. **Explicit Context**: actor and branch always arrive as parameters

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, MONEY_EPSILON, MONEY_SCALE};
pub use totals::{line_total, order_totals, totals_balanced, LineTotals, OrderTotals};
pub use types::*;

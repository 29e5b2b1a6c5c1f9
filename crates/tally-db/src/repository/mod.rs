//! # Repository Module
//!
//! Database repository implementations.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  HTTP handler                                                           │
//! │       │                                                                 │
//! │       │  db.orders().create(&ctx, new_order)                            │
//! │       ▼                                                                 │
//! │  OrderRepository                                                        │
//! │  ├── create(&self, ctx, order)      ← one transaction                   │
//! │  ├── update_status(&self, ctx, ..)                                      │
//! │  └── find_by_external_reference(..)                                     │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! │                                                                         │
//! │  Benefits:                                                              │
//! │  • Transaction boundaries live in exactly one place                     │
//! │  • SQL is isolated, handlers stay thin                                  │
//! │  • Optional filters are typed struct fields, not query chains           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Product CRUD, branch-scoped lookups
//! - [`stock::StockLedgerRepository`] - Append-only movements, derived stock
//! - [`order::OrderRepository`] - Atomic order creation, status machine
//! - [`settlement::SettlementRepository`] - Payment ledger, paid/due totals
//! - [`sync::SyncRepository`] - External-id mappings, idempotent upserts
//! - [`audit::AuditRepository`] - Audit trail queries

pub mod audit;
pub mod order;
pub mod product;
pub mod settlement;
pub mod stock;
pub mod sync;

use uuid::Uuid;

/// Generates a new entity ID (UUID v4 string).
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

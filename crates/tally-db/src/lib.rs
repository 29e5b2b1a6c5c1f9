//! # Tally Database Layer
//!
//! SQLite persistence for the stock-ledger and order-settlement engine.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         tally-db                                        │
//! │                                                                         │
//! │  ┌────────────┐   ┌──────────────────────────────────────────────────┐  │
//! │  │  Database  │──►│  Repositories                                    │  │
//! │  │  (pool)    │   │  products / stock / orders / settlements / sync  │  │
//! │  └────────────┘   └──────────────────────────────────────────────────┘  │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  SQLite (WAL mode, foreign keys on, embedded migrations)                │
//! │                                                                         │
//! │  Ground rules:                                                          │
//! │  • stock_movements, settlements, audit_log are append-only              │
//! │  • stock and paid/due totals are derived, never independently edited    │
//! │  • every multi-row mutation is one transaction, audit row included      │
//! │  • idempotency keys are UNIQUE indexes, not application-level checks    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("/var/lib/tally/tally.db")).await?;
//! let ctx = RequestContext::new("user-1", "branch-main");
//! let order = db.orders().create(&ctx, new_order).await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::audit::{AuditEntry, AuditRepository};
pub use repository::order::{OrderFilter, OrderRepository, OrderWithLines, Paginated};
pub use repository::product::{NewProduct, ProductRepository};
pub use repository::settlement::{NewSettlement, SettlementRepository};
pub use repository::stock::{NewStockMovement, StockLedgerRepository};
pub use repository::sync::{OrderSyncOutcome, SyncRepository};

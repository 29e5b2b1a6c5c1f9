//! # Tally Store API
//!
//! HTTP surface of the stock-ledger and order-settlement engine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Store API                                       │
//! │                                                                         │
//! │  POS / back office ──► /api/*       (bearer token)                      │
//! │  Sales channel     ──► /webhooks/*  (HMAC-signed push)                  │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                     tally-db repositories                               │
//! │                              │                                          │
//! │                              ▼                                          │
//! │                      SQLite (WAL mode)                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod response;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use routes::build_router;
pub use state::AppState;

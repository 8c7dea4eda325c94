//! # keymint-ledger
//!
//! The durable sales ledger: one immutable row per fulfilled payment,
//! plus the read-only projections consumed by the admin surface
//! (revenue aggregation, CSV and JSON export).
//!
//! The `SalesLedger` trait is the contract the orchestrator fulfills
//! against; `MemoryLedger` backs tests and secret-free local runs,
//! `PgLedger` is the production store.

pub mod export;
pub mod postgres;
pub mod sale;
pub mod store;

pub use export::{export_csv, export_json};
pub use postgres::PgLedger;
pub use sale::{Sale, SaleInput};
pub use store::{
    InsertOutcome, LedgerError, MemoryLedger, Result, RevenueSummary, SalesLedger,
    UnreachableLedger,
};

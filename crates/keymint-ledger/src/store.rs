//! Ledger Contract and In-Memory Store

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use keymint_core::{FeeSchedule, round2};

use crate::sale::{Sale, SaleInput};

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Backing store unreachable or write failure. The orchestrator
    /// treats this as non-fatal: logged loudly, run continues.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

/// Outcome of an insert attempt.
///
/// Re-delivered webhook events carry the same checkout-session id; the
/// ledger deduplicates on it and reports the existing row instead of
/// appending a duplicate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was appended
    Recorded(i64),
    /// A row with this session id already exists
    AlreadyRecorded(i64),
}

impl InsertOutcome {
    pub fn sale_id(&self) -> i64 {
        match *self {
            InsertOutcome::Recorded(id) | InsertOutcome::AlreadyRecorded(id) => id,
        }
    }
}

/// Revenue projection, recomputed on every call, never stored
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevenueSummary {
    pub gross: f64,
    pub net: f64,
    pub fees: f64,
}

/// The sales ledger contract.
///
/// Append-only: `insert` never updates an existing row. Concurrent
/// inserts from parallel fulfillment runs rely on the store's native
/// single-row atomicity; no cross-run in-memory state exists.
#[async_trait]
pub trait SalesLedger: Send + Sync {
    /// Append a new sale, assigning id and timestamp.
    ///
    /// Deduplicates on the external session id when one is present:
    /// a repeat insert reports `AlreadyRecorded` with the original id.
    async fn insert(&self, input: SaleInput) -> Result<InsertOutcome>;

    /// All sales, newest first by creation timestamp
    async fn list_all(&self) -> Result<Vec<Sale>>;

    /// Total number of sales
    async fn count(&self) -> Result<i64>;

    /// Aggregate revenue under the given fee schedule:
    /// `fees = gross * rate + count * per_transaction`, `net = gross - fees`.
    async fn revenue(&self, fees: &FeeSchedule) -> Result<RevenueSummary> {
        let sales = self.list_all().await?;
        let gross: f64 = sales.iter().map(|s| s.amount).sum();
        let total_fees = round2(gross * fees.rate + sales.len() as f64 * fees.per_transaction);
        Ok(RevenueSummary {
            gross: round2(gross),
            net: round2(gross - total_fees),
            fees: total_fees,
        })
    }
}

/// In-memory ledger for tests and secret-free local runs
pub struct MemoryLedger {
    sales: RwLock<Vec<Sale>>,
    next_id: RwLock<i64>,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            sales: RwLock::new(Vec::new()),
            next_id: RwLock::new(1),
        }
    }
}

#[async_trait]
impl SalesLedger for MemoryLedger {
    async fn insert(&self, input: SaleInput) -> Result<InsertOutcome> {
        let mut sales = self.sales.write().unwrap();

        if let Some(ref session_id) = input.session_id {
            if let Some(existing) = sales
                .iter()
                .find(|s| s.session_id.as_deref() == Some(session_id))
            {
                return Ok(InsertOutcome::AlreadyRecorded(existing.id));
            }
        }

        let mut next_id = self.next_id.write().unwrap();
        let id = *next_id;
        *next_id += 1;

        sales.push(input.into_sale(id, Utc::now()));
        Ok(InsertOutcome::Recorded(id))
    }

    async fn list_all(&self) -> Result<Vec<Sale>> {
        let mut sales = self.sales.read().unwrap().clone();
        sales.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(sales)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.sales.read().unwrap().len() as i64)
    }
}

/// A ledger whose store is unreachable; used to exercise the
/// degraded-persistence path.
pub struct UnreachableLedger;

#[async_trait]
impl SalesLedger for UnreachableLedger {
    async fn insert(&self, _input: SaleInput) -> Result<InsertOutcome> {
        Err(LedgerError::Storage("store unreachable".into()))
    }

    async fn list_all(&self) -> Result<Vec<Sale>> {
        Err(LedgerError::Storage("store unreachable".into()))
    }

    async fn count(&self) -> Result<i64> {
        Err(LedgerError::Storage("store unreachable".into()))
    }
}

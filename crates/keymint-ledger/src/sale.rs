//! Sale Records
//!
//! A `Sale` is the durable record of one fulfilled transaction. It is
//! born at ledger insert (which assigns id and timestamp), never
//! mutated afterward, and never deleted; retention and export are
//! read-only operations over it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One fulfilled transaction
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Sale {
    /// Monotonic id assigned by the ledger on insert
    pub id: i64,

    /// Customer name as entered at checkout
    pub name: String,

    /// Customer email
    pub email: String,

    /// Client-supplied device fingerprint, opaque to this system
    pub hardware_id: String,

    /// Derived license key, immutable once computed
    pub license_key: String,

    /// Gross amount charged, tax inclusive, in major currency units
    pub amount: f64,

    /// ISO currency code
    pub currency: String,

    /// Authoritative time of record, assigned by the ledger at insert
    pub created_at: DateTime<Utc>,

    /// Jurisdiction metadata supplied at checkout, passed through unvalidated
    pub court: Option<String>,
    pub court_number: Option<String>,
    pub judicial_district: Option<String>,

    /// External payment-provider references, audit/export only
    pub session_id: Option<String>,
    pub payment_intent: Option<String>,
    pub customer_id: Option<String>,
    pub billing_country: Option<String>,
    pub billing_address: Option<String>,
}

/// Everything the orchestrator supplies for one insert; id and
/// timestamp are the ledger's to assign.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SaleInput {
    pub name: String,
    pub email: String,
    pub hardware_id: String,
    pub license_key: String,
    pub amount: f64,
    pub currency: String,
    pub court: Option<String>,
    pub court_number: Option<String>,
    pub judicial_district: Option<String>,
    pub session_id: Option<String>,
    pub payment_intent: Option<String>,
    pub customer_id: Option<String>,
    pub billing_country: Option<String>,
    pub billing_address: Option<String>,
}

impl SaleInput {
    /// Materialize a `Sale` with ledger-assigned identity facts
    pub(crate) fn into_sale(self, id: i64, created_at: DateTime<Utc>) -> Sale {
        Sale {
            id,
            name: self.name,
            email: self.email,
            hardware_id: self.hardware_id,
            license_key: self.license_key,
            amount: self.amount,
            currency: self.currency,
            created_at,
            court: self.court,
            court_number: self.court_number,
            judicial_district: self.judicial_district,
            session_id: self.session_id,
            payment_intent: self.payment_intent,
            customer_id: self.customer_id,
            billing_country: self.billing_country,
            billing_address: self.billing_address,
        }
    }
}

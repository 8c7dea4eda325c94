//! PostgreSQL Ledger
//!
//! Append-only `sales` table with additive column evolution: new
//! optional columns are added with `ADD COLUMN IF NOT EXISTS`, and old
//! rows read back with NULL for them. Deduplication of webhook
//! redeliveries rides on a partial unique index over the external
//! checkout-session id.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::sale::{Sale, SaleInput};
use crate::store::{InsertOutcome, LedgerError, Result, SalesLedger};

/// Columns appended after the initial schema shipped. Kept additive so
/// existing deployments migrate in place at boot.
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[
    ("court", "VARCHAR(100)"),
    ("court_number", "VARCHAR(20)"),
    ("judicial_district", "VARCHAR(100)"),
    ("payment_intent", "VARCHAR(255)"),
    ("customer_id", "VARCHAR(255)"),
    ("billing_country", "VARCHAR(50)"),
    ("billing_address", "TEXT"),
];

/// PostgreSQL-backed sales ledger
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Connect and run schema setup.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let ledger = Self { pool };
        ledger.init_schema().await?;
        Ok(ledger)
    }

    /// Wrap an existing pool (tests, shared pools)
    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the sales table, additive migrations, and indexes.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sales (
                id BIGSERIAL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL,
                hardware_id VARCHAR(100) NOT NULL,
                license_key VARCHAR(50) NOT NULL,
                amount DOUBLE PRECISION NOT NULL,
                currency VARCHAR(10) NOT NULL DEFAULT 'EUR',
                session_id VARCHAR(255),
                created_at TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .execute(&self.pool)
        .await?;

        for (column, sql_type) in ADDITIVE_COLUMNS {
            sqlx::query(&format!(
                "ALTER TABLE sales ADD COLUMN IF NOT EXISTS {column} {sql_type}"
            ))
            .execute(&self.pool)
            .await?;
        }

        // Operational lookups by customer
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sales_email ON sales(email)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sales_hardware_id ON sales(hardware_id)")
            .execute(&self.pool)
            .await?;

        // At-most-one fulfillment per checkout session
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_sales_session_id
             ON sales(session_id) WHERE session_id IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("Sales schema initialized");
        Ok(())
    }
}

#[async_trait]
impl SalesLedger for PgLedger {
    async fn insert(&self, input: SaleInput) -> Result<InsertOutcome> {
        let inserted: Option<(i64,)> = sqlx::query_as(
            "INSERT INTO sales (
                name, email, hardware_id, license_key, amount, currency, session_id,
                court, court_number, judicial_district,
                payment_intent, customer_id, billing_country, billing_address
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (session_id) WHERE session_id IS NOT NULL DO NOTHING
            RETURNING id",
        )
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.hardware_id)
        .bind(&input.license_key)
        .bind(input.amount)
        .bind(&input.currency)
        .bind(&input.session_id)
        .bind(&input.court)
        .bind(&input.court_number)
        .bind(&input.judicial_district)
        .bind(&input.payment_intent)
        .bind(&input.customer_id)
        .bind(&input.billing_country)
        .bind(&input.billing_address)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = inserted {
            return Ok(InsertOutcome::Recorded(id));
        }

        // Conflict path: a row with this session id already exists
        let session_id = input
            .session_id
            .as_deref()
            .ok_or_else(|| LedgerError::Storage("insert returned no row".into()))?;
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM sales WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(InsertOutcome::AlreadyRecorded(id))
    }

    async fn list_all(&self) -> Result<Vec<Sale>> {
        let sales = sqlx::query_as::<_, Sale>(
            "SELECT id, name, email, hardware_id, license_key, amount, currency, created_at,
                court, court_number, judicial_district,
                session_id, payment_intent, customer_id, billing_country, billing_address
             FROM sales
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(sales)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

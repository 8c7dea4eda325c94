//! Configuration
//!
//! All process configuration is read from the environment exactly once
//! at boot and injected into the components that need it. The deriver,
//! synthesizer, and ledger never read ambient global state, which keeps
//! them pure and testable with synthetic values.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// License key derivation configuration
#[derive(Clone, Debug)]
pub struct LicenseConfig {
    /// Shared secret bound into every derived key. Must match the
    /// secret held by the desktop application's activation check.
    pub secret: String,
}

/// Seller identity printed on invoices
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SellerInfo {
    pub name: String,
    pub tax_id: String,
    pub address: String,
    pub city: String,
    pub email: String,
}

/// Payment processor fee schedule used by revenue projections
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Proportional fee on the gross amount (0.015 = 1.5%)
    pub rate: f64,
    /// Flat fee per transaction, in the sale currency
    pub per_transaction: f64,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        // Stripe Spain card pricing: 1.5% + 0.25 EUR per transaction
        Self {
            rate: 0.015,
            per_transaction: 0.25,
        }
    }
}

impl FeeSchedule {
    /// Fee for a single transaction of the given gross amount
    #[must_use]
    pub fn fee_for(&self, gross: f64) -> f64 {
        crate::round2(gross * self.rate + self.per_transaction)
    }
}

/// Full service configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub license: LicenseConfig,
    pub seller: SellerInfo,
    pub fees: FeeSchedule,
    /// VAT percentage included in the gross amount (21% for software in Spain)
    pub tax_rate_percent: f64,
    /// Product display name used on invoices and in the email
    pub product_name: String,
    /// Token gating the read-only admin views
    pub admin_token: String,
    /// Public base URL for checkout redirects
    pub base_url: String,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// Only the license secret is mandatory here; Stripe and Brevo
    /// credentials are owned by their clients and checked at their own
    /// construction time.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var("LICENSE_SECRET_KEY")
            .map_err(|_| CoreError::Config("LICENSE_SECRET_KEY not set".into()))?;
        if secret.trim().is_empty() {
            return Err(CoreError::Config("LICENSE_SECRET_KEY is empty".into()));
        }

        let fees = FeeSchedule {
            rate: env_f64("FEE_RATE", 0.015)?,
            per_transaction: env_f64("FEE_PER_TRANSACTION", 0.25)?,
        };

        Ok(Self {
            license: LicenseConfig { secret },
            seller: SellerInfo {
                name: env_or("SELLER_NAME", ""),
                tax_id: env_or("SELLER_TAX_ID", ""),
                address: env_or("SELLER_ADDRESS", ""),
                city: env_or("SELLER_CITY", ""),
                email: env_or("SELLER_EMAIL", ""),
            },
            fees,
            tax_rate_percent: env_f64("TAX_RATE_PERCENT", 21.0)?,
            product_name: env_or("PRODUCT_NAME", "keymint"),
            admin_token: env_or("ADMIN_TOKEN", ""),
            base_url: normalize_base_url(&env_or("BASE_URL", "http://localhost:3000")),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_f64(key: &str, default: f64) -> Result<f64> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CoreError::Config(format!("{key} is not a number: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Hosting platforms hand out bare hostnames; checkout redirect URLs
/// must be absolute.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_schedule_default() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.fee_for(100.0), 1.75);
        assert_eq!(fees.fee_for(300.0), 4.75);
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("myapp.up.railway.app"),
            "https://myapp.up.railway.app"
        );
        assert_eq!(
            normalize_base_url("http://localhost:3000/"),
            "http://localhost:3000"
        );
        assert_eq!(normalize_base_url("https://pay.example.com"), "https://pay.example.com");
    }
}

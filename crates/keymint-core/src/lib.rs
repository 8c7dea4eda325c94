//! # keymint-core
//!
//! Pure fulfillment logic shared by the keymint workspace: license key
//! derivation, invoice synthesis, configuration, and the error taxonomy.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     keymint-core                          │
//! │  ┌─────────────┐  ┌──────────────┐  ┌────────────────┐   │
//! │  │ KeyDeriver  │  │ Invoice      │  │ Config         │   │
//! │  │ (SHA-256)   │  │ Synthesizer  │  │ (injected)     │   │
//! │  └─────────────┘  └──────────────┘  └────────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this crate performs I/O. The deriver and synthesizer take
//! their configuration explicitly so they can be unit tested with
//! synthetic secrets and seller identities.

pub mod config;
pub mod error;
pub mod invoice;
pub mod license;

pub use config::{Config, FeeSchedule, LicenseConfig, SellerInfo};
pub use error::{CoreError, Result};
pub use invoice::{InvoiceDocument, InvoiceRequest, InvoiceSynthesizer, PriceBreakdown};
pub use license::{KeyDeriver, LicenseKey};

/// Round a monetary amount to two decimal places.
///
/// Gross amounts are authoritative; base and tax are derived from them,
/// so the rounding residue always lands in the displayed gross.
#[must_use]
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(300.0 / 1.21), 247.93);
        assert_eq!(round2(300.0 - 247.93), 52.07);
        assert_eq!(round2(100.0), 100.0);
    }
}

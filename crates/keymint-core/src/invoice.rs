//! Invoice Synthesis
//!
//! Turns a completed sale into a finished invoice artifact (bytes plus
//! a reference number). The gross amount is what the processor charged
//! and is authoritative; base and tax are derived by division so the
//! rounding residue lands in the displayed gross, never the base.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SellerInfo;
use crate::error::{CoreError, Result};
use crate::round2;

/// Tax-inclusive price breakdown
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    /// Tax-exclusive portion (base imponible)
    pub base: f64,
    /// Tax portion
    pub tax: f64,
    /// Authoritative amount charged, tax inclusive
    pub gross: f64,
}

impl PriceBreakdown {
    /// Derive base and tax from a tax-inclusive gross amount.
    #[must_use]
    pub fn from_gross(gross: f64, tax_rate_percent: f64) -> Self {
        let base = round2(gross / (1.0 + tax_rate_percent / 100.0));
        let tax = round2(gross - base);
        Self { base, tax, gross }
    }
}

/// Generate an invoice reference number.
///
/// `{year}-{monthday}-{sale id, 4 digits}` when the sale id is known,
/// otherwise a `HHMMSS` timestamp suffix. The fallback can collide for
/// two invoices generated in the same second; it only fires when the
/// ledger insert failed and the number is advisory there.
#[must_use]
pub fn invoice_number(now: DateTime<Utc>, sale_id: Option<i64>) -> String {
    let prefix = format!("{}-{:02}{:02}", now.year(), now.month(), now.day());
    match sale_id {
        Some(id) => format!("{prefix}-{id:04}"),
        None => format!(
            "{prefix}-{:02}{:02}{:02}",
            now.hour(),
            now.minute(),
            now.second()
        ),
    }
}

/// Filesystem-safe attachment name for an invoice
#[must_use]
pub fn invoice_filename(number: &str) -> String {
    let safe = number.replace(['/', '\\'], "-");
    format!("Invoice_{safe}.html")
}

/// Everything needed to synthesize one invoice
#[derive(Clone, Debug)]
pub struct InvoiceRequest {
    pub customer_name: String,
    pub customer_email: String,
    /// Gross amount charged, tax inclusive
    pub gross: f64,
    pub currency: String,
    pub issued_at: DateTime<Utc>,
    /// Supplied by the caller when known; generated otherwise
    pub number: Option<String>,
    pub sale_id: Option<i64>,
    pub customer_country: Option<String>,
    pub customer_address: Option<String>,
    pub customer_tax_id: Option<String>,
}

/// A finished invoice artifact
#[derive(Clone, Debug)]
pub struct InvoiceDocument {
    pub number: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Renders invoice documents from sale facts and the configured seller
/// identity and tax rate.
#[derive(Clone)]
pub struct InvoiceSynthesizer {
    seller: SellerInfo,
    tax_rate_percent: f64,
    product_name: String,
}

impl InvoiceSynthesizer {
    pub fn new(seller: SellerInfo, tax_rate_percent: f64, product_name: impl Into<String>) -> Self {
        Self {
            seller,
            tax_rate_percent,
            product_name: product_name.into(),
        }
    }

    /// Synthesize the invoice document.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Synthesis` for non-positive gross amounts.
    /// The orchestrator treats any failure here as degrading, never
    /// fatal: delivery proceeds without an attachment.
    pub fn synthesize(&self, request: &InvoiceRequest) -> Result<InvoiceDocument> {
        if request.gross <= 0.0 {
            return Err(CoreError::Synthesis(format!(
                "gross amount must be positive, got {}",
                request.gross
            )));
        }

        let number = request
            .number
            .clone()
            .unwrap_or_else(|| invoice_number(request.issued_at, request.sale_id));
        let filename = invoice_filename(&number);
        let breakdown = PriceBreakdown::from_gross(request.gross, self.tax_rate_percent);

        let html = self.render(request, &number, &breakdown);

        tracing::debug!(number = %number, bytes = html.len(), "Invoice synthesized");

        Ok(InvoiceDocument {
            number,
            filename,
            bytes: html.into_bytes(),
        })
    }

    fn render(&self, request: &InvoiceRequest, number: &str, breakdown: &PriceBreakdown) -> String {
        let date = request.issued_at.format("%d/%m/%Y");
        let currency = &request.currency;

        let mut customer_lines = vec![escape(&request.customer_name)];
        if let Some(ref tax_id) = request.customer_tax_id {
            customer_lines.push(format!("Tax ID: {}", escape(tax_id)));
        }
        if let Some(ref address) = request.customer_address {
            customer_lines.push(escape(address));
        }
        if let Some(ref country) = request.customer_country {
            customer_lines.push(format!("Country: {}", escape(country)));
        }
        customer_lines.push(format!("Email: {}", escape(&request.customer_email)));
        let customer_block = customer_lines.join("<br>\n        ");

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Invoice {number}</title>
</head>
<body style="font-family: Helvetica, Arial, sans-serif; color: #333; max-width: 700px; margin: 0 auto; padding: 30px;">
    <div style="background-color: #2c3e50; color: #fff; padding: 20px 25px;">
        <h1 style="margin: 0;">INVOICE</h1>
        <p style="margin: 5px 0 0 0;">{product}</p>
    </div>
    <p style="text-align: right;">
        <strong>Invoice no.: {number}</strong><br>
        Date: {date}
    </p>
    <h3 style="background-color: #f0f0f0; padding: 5px 10px;">SELLER</h3>
    <p>
        {seller_name}<br>
        Tax ID: {seller_tax_id}<br>
        {seller_address}<br>
        {seller_city}<br>
        Email: {seller_email}
    </p>
    <h3 style="background-color: #f0f0f0; padding: 5px 10px;">CUSTOMER</h3>
    <p>
        {customer_block}
    </p>
    <table style="width: 100%; border-collapse: collapse;" border="1" cellpadding="8">
        <tr style="background-color: #2c3e50; color: #fff;">
            <th align="left">ITEM</th><th>QTY</th><th align="right">PRICE</th><th align="right">TOTAL</th>
        </tr>
        <tr>
            <td>{product} license</td>
            <td align="center">1</td>
            <td align="right">{base:.2} {currency}</td>
            <td align="right">{base:.2} {currency}</td>
        </tr>
    </table>
    <p style="text-align: right;">
        Taxable base: {base:.2} {currency}<br>
        VAT ({rate:.0}%): {tax:.2} {currency}<br>
        <strong style="background-color: #2c3e50; color: #fff; padding: 4px 10px;">TOTAL: {gross:.2} {currency}</strong>
    </p>
    <p style="font-size: 12px; color: #555;">
        Payment method: credit/debit card (Stripe).<br>
        The purchased license is personal and non-transferable.<br>
        This invoice was generated electronically and is valid without a signature.<br>
        Issued on {date}.
    </p>
</body>
</html>
"#,
            number = number,
            product = escape(&self.product_name),
            date = date,
            seller_name = escape(&self.seller.name),
            seller_tax_id = escape(&self.seller.tax_id),
            seller_address = escape(&self.seller.address),
            seller_city = escape(&self.seller.city),
            seller_email = escape(&self.seller.email),
            customer_block = customer_block,
            base = breakdown.base,
            tax = breakdown.tax,
            gross = breakdown.gross,
            rate = self.tax_rate_percent,
            currency = escape(currency),
        )
    }
}

fn escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn synthesizer() -> InvoiceSynthesizer {
        InvoiceSynthesizer::new(
            SellerInfo {
                name: "Test Seller".into(),
                tax_id: "X0000000T".into(),
                address: "C/ Mayor 1".into(),
                city: "Madrid".into(),
                email: "seller@example.com".into(),
            },
            21.0,
            "Test Product",
        )
    }

    fn request(gross: f64) -> InvoiceRequest {
        InvoiceRequest {
            customer_name: "Juan Garcia".into(),
            customer_email: "juan@example.com".into(),
            gross,
            currency: "EUR".into(),
            issued_at: Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 45).unwrap(),
            number: None,
            sale_id: Some(7),
            customer_country: Some("ES".into()),
            customer_address: None,
            customer_tax_id: None,
        }
    }

    #[test]
    fn test_tax_breakdown_vector() {
        let breakdown = PriceBreakdown::from_gross(300.0, 21.0);
        assert_eq!(breakdown.base, 247.93);
        assert_eq!(breakdown.tax, 52.07);
        assert_eq!(crate::round2(breakdown.base + breakdown.tax), breakdown.gross);
    }

    #[test]
    fn test_invoice_number_with_sale_id() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 45).unwrap();
        assert_eq!(invoice_number(now, Some(7)), "2025-0314-0007");
    }

    #[test]
    fn test_invoice_number_fallback_is_time_based() {
        let now = Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 45).unwrap();
        assert_eq!(invoice_number(now, None), "2025-0314-103045");
    }

    #[test]
    fn test_invoice_filename_sanitized() {
        assert_eq!(invoice_filename("2025/0314\\0007"), "Invoice_2025-0314-0007.html");
    }

    #[test]
    fn test_synthesize_displays_derived_breakdown() {
        let doc = synthesizer().synthesize(&request(300.0)).unwrap();
        assert_eq!(doc.number, "2025-0314-0007");
        assert_eq!(doc.filename, "Invoice_2025-0314-0007.html");
        let html = String::from_utf8(doc.bytes).unwrap();
        assert!(html.contains("247.93 EUR"));
        assert!(html.contains("52.07 EUR"));
        assert!(html.contains("TOTAL: 300.00 EUR"));
    }

    #[test]
    fn test_synthesize_rejects_non_positive_gross() {
        let err = synthesizer().synthesize(&request(0.0)).unwrap_err();
        assert!(matches!(err, CoreError::Synthesis(_)));
    }

    #[test]
    fn test_supplied_number_wins() {
        let mut req = request(100.0);
        req.number = Some("2025-0101-0042".into());
        let doc = synthesizer().synthesize(&req).unwrap();
        assert_eq!(doc.number, "2025-0101-0042");
    }

    #[test]
    fn test_customer_name_is_escaped() {
        let mut req = request(100.0);
        req.customer_name = "Juan <script>".into();
        let doc = synthesizer().synthesize(&req).unwrap();
        let html = String::from_utf8(doc.bytes).unwrap();
        assert!(html.contains("Juan &lt;script&gt;"));
    }
}

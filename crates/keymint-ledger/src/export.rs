//! Export Projections
//!
//! The CSV contract is spreadsheet-locale specific and deliberate:
//! semicolon delimiters with comma decimal separators, so the files
//! open cleanly in European Excel/Access installs. Fee and net are
//! recomputed per row with the same formula the aggregate uses.

use serde_json::json;

use keymint_core::{FeeSchedule, round2};

use crate::sale::Sale;
use crate::store::RevenueSummary;

const CSV_HEADER: &[&str] = &[
    "ID",
    "Date",
    "Name",
    "Email",
    "Hardware_ID",
    "License",
    "Gross",
    "Fee",
    "Net",
    "Currency",
    "Court",
    "Court_Number",
    "Judicial_District",
    "Session",
    "Payment_Intent",
    "Customer",
    "Country",
];

/// Render sales as semicolon-delimited CSV with comma decimals.
///
/// Returns an empty string when there are no sales.
#[must_use]
pub fn export_csv(sales: &[Sale], fees: &FeeSchedule) -> String {
    if sales.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(&CSV_HEADER.join(";"));
    out.push('\n');

    for sale in sales {
        let fee = fees.fee_for(sale.amount);
        let net = round2(sale.amount - fee);

        let row = [
            sale.id.to_string(),
            sale.created_at.format("%d/%m/%Y %H:%M").to_string(),
            csv_field(&sale.name),
            csv_field(&sale.email),
            csv_field(&sale.hardware_id),
            sale.license_key.clone(),
            decimal_comma(sale.amount),
            decimal_comma(fee),
            decimal_comma(net),
            sale.currency.clone(),
            csv_field(sale.court.as_deref().unwrap_or("")),
            csv_field(sale.court_number.as_deref().unwrap_or("")),
            csv_field(sale.judicial_district.as_deref().unwrap_or("")),
            csv_field(sale.session_id.as_deref().unwrap_or("")),
            csv_field(sale.payment_intent.as_deref().unwrap_or("")),
            csv_field(sale.customer_id.as_deref().unwrap_or("")),
            csv_field(sale.billing_country.as_deref().unwrap_or("")),
        ];
        out.push_str(&row.join(";"));
        out.push('\n');
    }

    out
}

/// Totals plus the full rows, as served by the admin JSON export
#[must_use]
pub fn export_json(sales: &[Sale], summary: &RevenueSummary) -> serde_json::Value {
    json!({
        "total_sales": sales.len(),
        "total_gross_revenue": summary.gross,
        "total_processor_fees": summary.fees,
        "total_net_revenue": summary.net,
        "sales": sales,
    })
}

/// Numbers render with a comma decimal separator, locale convention
fn decimal_comma(value: f64) -> String {
    format!("{value:.2}").replace('.', ",")
}

/// Minimal quoting: only fields carrying the delimiter, quotes, or
/// newlines get wrapped
fn csv_field(raw: &str) -> String {
    if raw.contains([';', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sale(id: i64, amount: f64) -> Sale {
        Sale {
            id,
            name: "Jane Doe".into(),
            email: "jane@example.com".into(),
            hardware_id: "ABC-123".into(),
            license_key: "FC1F02D5C55BD6C75B2B074F".into(),
            amount,
            currency: "EUR".into(),
            created_at: Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 0).unwrap(),
            court: None,
            court_number: None,
            judicial_district: None,
            session_id: Some(format!("cs_{id}")),
            payment_intent: None,
            customer_id: None,
            billing_country: Some("ES".into()),
            billing_address: None,
        }
    }

    #[test]
    fn test_csv_empty_when_no_sales() {
        assert_eq!(export_csv(&[], &FeeSchedule::default()), "");
    }

    #[test]
    fn test_csv_semicolons_and_comma_decimals() {
        let csv = export_csv(&[sale(1, 100.0)], &FeeSchedule::default());
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("ID;Date;Name"));
        let row = lines.next().unwrap();
        // 100.00 gross, 1.75 fee, 98.25 net, Spanish decimal commas
        assert!(row.contains(";100,00;1,75;98,25;EUR;"));
        assert!(row.contains("14/03/2025 10:30"));
    }

    #[test]
    fn test_csv_row_fee_matches_aggregate_formula() {
        let fees = FeeSchedule {
            rate: 0.015,
            per_transaction: 0.25,
        };
        let csv = export_csv(&[sale(1, 300.0)], &fees);
        assert!(csv.contains(";300,00;4,75;295,25;"));
    }

    #[test]
    fn test_csv_quotes_delimiter_in_field() {
        let mut s = sale(1, 100.0);
        s.name = "Doe; Jane".into();
        let csv = export_csv(&[s], &FeeSchedule::default());
        assert!(csv.contains("\"Doe; Jane\""));
    }

    #[test]
    fn test_json_export_totals() {
        let sales = vec![sale(1, 100.0), sale(2, 200.0)];
        let summary = RevenueSummary {
            gross: 300.0,
            net: 295.0,
            fees: 5.0,
        };
        let value = export_json(&sales, &summary);
        assert_eq!(value["total_sales"], 2);
        assert_eq!(value["total_gross_revenue"], 300.0);
        assert_eq!(value["total_net_revenue"], 295.0);
        assert_eq!(value["sales"][0]["license_key"], "FC1F02D5C55BD6C75B2B074F");
    }
}

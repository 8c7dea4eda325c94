//! Fulfillment Orchestrator
//!
//! Drives one verified payment event through the fulfillment steps in
//! strict order:
//!
//! 1. derive the license key (fatal if the deriver is unconfigured —
//!    checked at engine construction, so a running engine cannot fail
//!    here);
//! 2. record the sale in the ledger (non-fatal: an un-ledgered sale is
//!    accepted over a customer without a license);
//! 3. synthesize the invoice (non-fatal: email goes out without an
//!    attachment);
//! 4. dispatch the notification as a detached task (never awaited, no
//!    handle kept; its outcome is a log entry inside the task).
//!
//! Once the engine exists, `fulfill` always completes and reports each
//! step's outcome independently. Concurrent runs for different events
//! are safe: the ledger is the only shared resource and single-row
//! inserts rely on the store's own atomicity.

use std::sync::Arc;

use chrono::Utc;

use keymint_core::{
    Config, InvoiceRequest, InvoiceSynthesizer, KeyDeriver, LicenseKey, invoice::invoice_number,
};
use keymint_ledger::{InsertOutcome, SaleInput, SalesLedger};
use keymint_notify::{LicenseEmail, Notifier};

use crate::error::Result;
use crate::webhook::PaymentEvent;

/// Per-step outcome for the ledger write
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaleOutcome {
    /// A new sale row was appended
    Recorded(i64),
    /// This session was already fulfilled; no new row
    AlreadyRecorded(i64),
    /// The store was unreachable; the run proceeded without a record
    Failed,
}

impl SaleOutcome {
    pub fn sale_id(&self) -> Option<i64> {
        match *self {
            SaleOutcome::Recorded(id) | SaleOutcome::AlreadyRecorded(id) => Some(id),
            SaleOutcome::Failed => None,
        }
    }
}

/// What one fulfillment run did, step by step. There is no aggregate
/// status: callers that care inspect the step they care about.
#[derive(Clone, Debug)]
pub struct FulfillmentReport {
    pub license_key: LicenseKey,
    pub sale: SaleOutcome,
    /// Reference number of the synthesized invoice, absent on failure
    pub invoice_number: Option<String>,
    /// Whether a notification task was handed off (not whether it sent)
    pub notification_dispatched: bool,
}

/// The fulfillment orchestrator
pub struct FulfillmentEngine {
    deriver: KeyDeriver,
    invoices: InvoiceSynthesizer,
    ledger: Arc<dyn SalesLedger>,
    notifier: Arc<dyn Notifier>,
}

impl FulfillmentEngine {
    /// Build an engine from configuration and collaborators.
    ///
    /// # Errors
    ///
    /// Fails when the license secret is not configured; a service that
    /// cannot derive keys must not accept payment events at all.
    pub fn new(
        config: &Config,
        ledger: Arc<dyn SalesLedger>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let deriver = KeyDeriver::new(&config.license)?;
        let invoices = InvoiceSynthesizer::new(
            config.seller.clone(),
            config.tax_rate_percent,
            config.product_name.clone(),
        );

        Ok(Self {
            deriver,
            invoices,
            ledger,
            notifier,
        })
    }

    /// The deriver, shared with the success page so the displayed key
    /// is byte-identical to the delivered one.
    pub fn deriver(&self) -> &KeyDeriver {
        &self.deriver
    }

    /// Run one fulfillment for a verified payment event.
    ///
    /// The caller guarantees the event's authenticity and paid status;
    /// nothing here re-verifies payment state. Returns after steps 1-3
    /// and the notification hand-off, never waiting on delivery.
    pub async fn fulfill(&self, event: PaymentEvent) -> FulfillmentReport {
        let issued_at = Utc::now();

        // Step 1: derive. Pure and deterministic, so a redelivered
        // event always yields the identical key.
        let license_key = self.deriver.derive(&event.hardware_id, &event.name);
        tracing::info!(
            session_id = %event.session_id,
            key_prefix = &license_key.as_str()[..8],
            "License derived"
        );

        // Step 2: record. Non-fatal on failure.
        let sale = match self.ledger.insert(sale_input(&event, &license_key)).await {
            Ok(InsertOutcome::Recorded(id)) => {
                tracing::info!(sale_id = id, session_id = %event.session_id, "Sale recorded");
                SaleOutcome::Recorded(id)
            }
            Ok(InsertOutcome::AlreadyRecorded(id)) => {
                tracing::info!(
                    sale_id = id,
                    session_id = %event.session_id,
                    "Webhook redelivery, sale already recorded"
                );
                SaleOutcome::AlreadyRecorded(id)
            }
            Err(err) => {
                tracing::error!(
                    session_id = %event.session_id,
                    email = %event.email,
                    error = %err,
                    "Sale NOT recorded, continuing fulfillment without a durable record"
                );
                SaleOutcome::Failed
            }
        };

        // Step 3: synthesize. Non-fatal; the e-mail proceeds without an
        // attachment. The reference number uses the sale id when step 2
        // produced one, else the time-based fallback.
        let invoice = match self.invoices.synthesize(&InvoiceRequest {
            customer_name: event.name.clone(),
            customer_email: event.email.clone(),
            gross: event.amount,
            currency: event.currency.clone(),
            issued_at,
            number: Some(invoice_number(issued_at, sale.sale_id())),
            sale_id: sale.sale_id(),
            customer_country: event.billing_country.clone(),
            customer_address: event.billing_address.clone(),
            customer_tax_id: None,
        }) {
            Ok(doc) => {
                tracing::info!(number = %doc.number, bytes = doc.bytes.len(), "Invoice synthesized");
                Some(doc)
            }
            Err(err) => {
                tracing::warn!(
                    session_id = %event.session_id,
                    error = %err,
                    "Invoice synthesis failed, sending license without attachment"
                );
                None
            }
        };
        let invoice_ref = invoice.as_ref().map(|doc| doc.number.clone());

        // Step 4: dispatch, detached. No handle is kept and no result
        // observed; the task logs its own boolean outcome.
        let email = LicenseEmail {
            to_email: event.email.clone(),
            to_name: event.name.clone(),
            hardware_id: event.hardware_id.clone(),
            license_key: license_key.to_string(),
            invoice: invoice.map(Into::into),
            amount: event.amount,
            issued_at,
        };
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            keymint_notify::dispatch(notifier.as_ref(), &email).await;
        });

        FulfillmentReport {
            license_key,
            sale,
            invoice_number: invoice_ref,
            notification_dispatched: true,
        }
    }
}

fn sale_input(event: &PaymentEvent, key: &LicenseKey) -> SaleInput {
    SaleInput {
        name: event.name.clone(),
        email: event.email.clone(),
        hardware_id: event.hardware_id.clone(),
        license_key: key.to_string(),
        amount: event.amount,
        currency: event.currency.clone(),
        court: event.court.clone(),
        court_number: event.court_number.clone(),
        judicial_district: event.judicial_district.clone(),
        session_id: Some(event.session_id.clone()),
        payment_intent: event.payment_intent.clone(),
        customer_id: event.customer_id.clone(),
        billing_country: event.billing_country.clone(),
        billing_address: event.billing_address.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use keymint_core::{FeeSchedule, LicenseConfig, SellerInfo};
    use keymint_ledger::{MemoryLedger, UnreachableLedger};
    use keymint_notify::NotifyError;

    /// Notifier that reports every delivery over a channel
    struct ChannelNotifier {
        tx: mpsc::UnboundedSender<LicenseEmail>,
    }

    #[async_trait]
    impl Notifier for ChannelNotifier {
        async fn send_license(&self, email: &LicenseEmail) -> keymint_notify::Result<()> {
            self.tx
                .send(email.clone())
                .map_err(|e| NotifyError::Transport(e.to_string()))
        }
    }

    fn config(secret: &str) -> Config {
        Config {
            license: LicenseConfig {
                secret: secret.into(),
            },
            seller: SellerInfo::default(),
            fees: FeeSchedule::default(),
            tax_rate_percent: 21.0,
            product_name: "Test Product".into(),
            admin_token: "secret-admin".into(),
            base_url: "http://localhost:3000".into(),
        }
    }

    fn event(session: &str) -> PaymentEvent {
        PaymentEvent {
            name: "Jane Doe".into(),
            hardware_id: "ABC-123".into(),
            email: "jane@example.com".into(),
            amount: 300.0,
            currency: "EUR".into(),
            session_id: session.into(),
            court: None,
            court_number: None,
            judicial_district: None,
            payment_intent: Some("pi_123".into()),
            customer_id: None,
            billing_country: Some("ES".into()),
            billing_address: None,
        }
    }

    fn engine_with(
        ledger: Arc<dyn SalesLedger>,
    ) -> (FulfillmentEngine, mpsc::UnboundedReceiver<LicenseEmail>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let notifier = Arc::new(ChannelNotifier { tx });
        let engine = FulfillmentEngine::new(&config("S3CR3T"), ledger, notifier).unwrap();
        (engine, rx)
    }

    async fn next_email(rx: &mut mpsc::UnboundedReceiver<LicenseEmail>) -> LicenseEmail {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("notification was never dispatched")
            .expect("notifier channel closed")
    }

    #[tokio::test]
    async fn test_happy_path_reports_every_step() {
        let ledger = Arc::new(MemoryLedger::new());
        let (engine, mut rx) = engine_with(ledger.clone());

        let report = engine.fulfill(event("cs_1")).await;

        assert_eq!(report.license_key.as_str(), "FC1F02D5C55BD6C75B2B074F");
        assert_eq!(report.sale, SaleOutcome::Recorded(1));
        assert!(report.invoice_number.is_some());
        assert!(report.notification_dispatched);

        let email = next_email(&mut rx).await;
        assert_eq!(email.license_key, "FC1F02D5C55BD6C75B2B074F");
        assert!(email.invoice.is_some());

        let sales = ledger.list_all().await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].license_key, "FC1F02D5C55BD6C75B2B074F");
    }

    #[tokio::test]
    async fn test_redelivery_same_key_no_second_row() {
        let ledger = Arc::new(MemoryLedger::new());
        let (engine, mut rx) = engine_with(ledger.clone());

        let first = engine.fulfill(event("cs_1")).await;
        let second = engine.fulfill(event("cs_1")).await;

        assert_eq!(first.license_key, second.license_key);
        assert_eq!(first.sale, SaleOutcome::Recorded(1));
        assert_eq!(second.sale, SaleOutcome::AlreadyRecorded(1));
        assert_eq!(ledger.count().await.unwrap(), 1);

        // Both runs still dispatched a notification
        next_email(&mut rx).await;
        next_email(&mut rx).await;
    }

    #[tokio::test]
    async fn test_ledger_down_still_delivers_license() {
        let (engine, mut rx) = engine_with(Arc::new(UnreachableLedger));

        let report = engine.fulfill(event("cs_1")).await;

        assert_eq!(report.sale, SaleOutcome::Failed);
        assert_eq!(report.license_key.as_str(), "FC1F02D5C55BD6C75B2B074F");
        assert!(report.notification_dispatched);

        // Invoice number fell back to the time-based form (no sale id)
        let number = report.invoice_number.unwrap();
        assert_eq!(number.matches('-').count(), 2);
        assert_eq!(number.split('-').next_back().unwrap().len(), 6);

        let email = next_email(&mut rx).await;
        assert_eq!(email.license_key, "FC1F02D5C55BD6C75B2B074F");
    }

    #[tokio::test]
    async fn test_synthesis_failure_still_dispatches_without_attachment() {
        let ledger = Arc::new(MemoryLedger::new());
        let (engine, mut rx) = engine_with(ledger);

        // Zero gross makes the synthesizer refuse
        let mut bad = event("cs_1");
        bad.amount = 0.0;
        let report = engine.fulfill(bad).await;

        assert_eq!(report.sale, SaleOutcome::Recorded(1));
        assert!(report.invoice_number.is_none());
        assert!(report.notification_dispatched);

        let email = next_email(&mut rx).await;
        assert!(email.invoice.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_runs_for_different_events() {
        let ledger = Arc::new(MemoryLedger::new());
        let (engine, mut rx) = engine_with(ledger.clone());
        let engine = Arc::new(engine);

        let a = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.fulfill(event("cs_a")).await }
        });
        let b = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.fulfill(event("cs_b")).await }
        });

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_ne!(a.sale.sale_id(), b.sale.sale_id());
        assert_eq!(ledger.count().await.unwrap(), 2);
        next_email(&mut rx).await;
        next_email(&mut rx).await;
    }

    #[test]
    fn test_missing_secret_rejects_engine() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let notifier = Arc::new(ChannelNotifier { tx });
        let result = FulfillmentEngine::new(&config("  "), Arc::new(MemoryLedger::new()), notifier);
        assert!(result.is_err());
    }
}

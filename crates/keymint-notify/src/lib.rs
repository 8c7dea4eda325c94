//! # keymint-notify
//!
//! Best-effort delivery of the license key and invoice to the customer
//! via a transactional email provider. This sits off the fulfillment
//! critical path: the orchestrator dispatches it as a detached task and
//! never observes the outcome beyond a logged boolean.

pub mod brevo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use brevo::BrevoMailer;

/// Result type alias for notification operations
pub type Result<T> = std::result::Result<T, NotifyError>;

/// Notification errors. None of these escape the detached dispatch
/// task; they are reduced to a logged boolean at the boundary.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Provider API key not configured
    #[error("Notifier not configured: {0}")]
    Config(String),

    /// Transport failure reaching the provider
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider rejected the request
    #[error("Provider error ({status}): {body}")]
    Provider { status: u16, body: String },
}

/// Invoice facts attached to a license email
#[derive(Clone, Debug)]
pub struct InvoiceAttachment {
    pub number: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl From<keymint_core::InvoiceDocument> for InvoiceAttachment {
    fn from(doc: keymint_core::InvoiceDocument) -> Self {
        Self {
            number: doc.number,
            filename: doc.filename,
            bytes: doc.bytes,
        }
    }
}

/// One license delivery
#[derive(Clone, Debug)]
pub struct LicenseEmail {
    pub to_email: String,
    pub to_name: String,
    pub hardware_id: String,
    pub license_key: String,
    /// Absent when invoice synthesis failed; the email still goes out
    pub invoice: Option<InvoiceAttachment>,
    pub amount: f64,
    pub issued_at: DateTime<Utc>,
}

/// Notification dispatcher seam.
///
/// Implementations convert every transport and provider failure into
/// `NotifyError`; callers on the fulfillment path reduce that to a
/// logged boolean and never retry.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_license(&self, email: &LicenseEmail) -> Result<()>;
}

/// Dispatch an email and reduce the outcome to a boolean plus a log
/// entry. This is the only surface the orchestrator's detached task
/// touches.
pub async fn dispatch(notifier: &dyn Notifier, email: &LicenseEmail) -> bool {
    match notifier.send_license(email).await {
        Ok(()) => {
            tracing::info!(to = %email.to_email, "License email sent");
            true
        }
        Err(err) => {
            tracing::warn!(to = %email.to_email, error = %err, "License email failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingNotifier {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_license(&self, _email: &LicenseEmail) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Transport("connection reset".into()))
            } else {
                Ok(())
            }
        }
    }

    fn email() -> LicenseEmail {
        LicenseEmail {
            to_email: "jane@example.com".into(),
            to_name: "Jane Doe".into(),
            hardware_id: "ABC-123".into(),
            license_key: "FC1F02D5C55BD6C75B2B074F".into(),
            invoice: None,
            amount: 300.0,
            issued_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_reports_success() {
        let notifier = RecordingNotifier {
            calls: AtomicUsize::new(0),
            fail: false,
        };
        assert!(dispatch(&notifier, &email()).await);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_swallows_failure() {
        let notifier = RecordingNotifier {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        // A failed send is a false, never a panic or an Err
        assert!(!dispatch(&notifier, &email()).await);
    }
}

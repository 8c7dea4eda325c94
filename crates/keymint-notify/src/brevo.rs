//! Brevo Transactional Email Client
//!
//! Thin adapter over the Brevo `smtp/email` HTTP endpoint. The wire
//! protocol is treated as opaque: one JSON POST with an `api-key`
//! header, attachments carried base64-encoded.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;

use crate::{LicenseEmail, Notifier, NotifyError, Result};

const BREVO_ENDPOINT: &str = "https://api.brevo.com/v3/smtp/email";

#[derive(Serialize)]
struct Party<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Serialize)]
struct Attachment {
    content: String,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    sender: Party<'a>,
    to: Vec<Party<'a>>,
    reply_to: Party<'a>,
    subject: String,
    html_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment: Option<Vec<Attachment>>,
}

/// Brevo-backed notifier
#[derive(Debug)]
pub struct BrevoMailer {
    client: reqwest::Client,
    api_key: String,
    from_email: String,
    from_name: String,
    product_name: String,
}

impl BrevoMailer {
    /// Create a mailer.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Config` when the API key is empty, so a
    /// misconfigured deployment surfaces at boot rather than on the
    /// first sale.
    pub fn new(
        api_key: impl Into<String>,
        from_email: impl Into<String>,
        from_name: impl Into<String>,
        product_name: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(NotifyError::Config("BREVO_API_KEY is empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            from_email: from_email.into(),
            from_name: from_name.into(),
            product_name: product_name.into(),
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("BREVO_API_KEY")
            .map_err(|_| NotifyError::Config("BREVO_API_KEY not set".into()))?;
        let from_email = std::env::var("FROM_EMAIL")
            .map_err(|_| NotifyError::Config("FROM_EMAIL not set".into()))?;
        let from_name =
            std::env::var("FROM_NAME").unwrap_or_else(|_| "License Delivery".to_string());
        let product_name = std::env::var("PRODUCT_NAME").unwrap_or_else(|_| "keymint".to_string());
        Self::new(api_key, from_email, from_name, product_name)
    }

    fn render_body(&self, email: &LicenseEmail) -> String {
        let invoice_section = email.invoice.as_ref().map_or_else(String::new, |invoice| {
            format!(
                r#"<div style="background: #e8f4f8; border: 1px solid #b8daff; border-radius: 8px; padding: 20px; margin: 20px 0;">
            <p style="margin: 0 0 10px 0; color: #666;">Invoice attached:</p>
            <p style="margin: 0; font-size: 14px;">
                <strong>Invoice no.:</strong> {}<br>
                <strong>Date:</strong> {}<br>
                <strong>Amount:</strong> {:.2} &euro;
            </p>
        </div>"#,
                invoice.number,
                email.issued_at.format("%d/%m/%Y"),
                email.amount,
            )
        });

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"></head>
<body style="font-family: 'Segoe UI', Arial, sans-serif; line-height: 1.6; color: #333; background-color: #f5f5f5; padding: 40px 20px;">
    <div style="max-width: 580px; margin: 0 auto; background-color: #ffffff; border-radius: 8px; padding: 40px;">
        <div style="text-align: center; border-bottom: 2px solid #2c3e50; padding-bottom: 20px; margin-bottom: 30px;">
            <h1 style="color: #2c3e50; margin: 0; font-size: 24px;">{product}</h1>
        </div>
        <p>Dear <strong>{name}</strong>,</p>
        <p>Thank you for purchasing a {product} license.</p>
        <div style="border: 2px solid #2c3e50; border-radius: 10px; padding: 25px; text-align: center; margin: 25px 0;">
            <p style="margin: 0 0 10px 0; color: #666;">Your activation key is:</p>
            <div style="font-family: Consolas, monospace; font-size: 28px; font-weight: bold; color: #2c3e50; letter-spacing: 2px; word-break: break-all;">{key}</div>
        </div>
        {invoice_section}
        <div style="background: #f8f9fa; border-left: 4px solid #2c3e50; padding: 15px 20px; margin: 20px 0;">
            <strong>To activate your license:</strong>
            <ol style="margin: 10px 0; padding-left: 20px;">
                <li>Open {product}</li>
                <li>Locate the activation key field in the activation window</li>
                <li>Copy and paste the key above</li>
                <li>Press Activate</li>
            </ol>
        </div>
        <div style="font-size: 14px; color: #666; margin-top: 20px;">
            <p><strong>This key is bound to:</strong></p>
            <ul>
                <li>Name: {name}</li>
                <li>Device: <code>{hardware_id}</code></li>
            </ul>
        </div>
        <div style="text-align: center; padding-top: 25px; margin-top: 25px; border-top: 1px solid #eee; color: #888; font-size: 13px;">
            <p>Questions? Simply reply to this email.</p>
        </div>
    </div>
</body>
</html>"#,
            product = self.product_name,
            name = email.to_name,
            key = email.license_key,
            invoice_section = invoice_section,
            hardware_id = email.hardware_id,
        )
    }
}

#[async_trait]
impl Notifier for BrevoMailer {
    async fn send_license(&self, email: &LicenseEmail) -> Result<()> {
        let subject = if email.invoice.is_some() {
            format!("Your {} license and invoice", self.product_name)
        } else {
            format!("Your {} license", self.product_name)
        };

        let attachment = email.invoice.as_ref().map(|invoice| {
            vec![Attachment {
                content: BASE64.encode(&invoice.bytes),
                name: invoice.filename.clone(),
            }]
        });

        let request = SendRequest {
            sender: Party {
                name: &self.from_name,
                email: &self.from_email,
            },
            to: vec![Party {
                name: &email.to_name,
                email: &email.to_email,
            }],
            reply_to: Party {
                name: &self.from_name,
                email: &self.from_email,
            },
            subject,
            html_content: self.render_body(email),
            attachment,
        };

        let response = self
            .client
            .post(BREVO_ENDPOINT)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(to = %email.to_email, "Brevo accepted message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mailer() -> BrevoMailer {
        BrevoMailer::new("xkeys-test", "seller@example.com", "Seller", "Test Product").unwrap()
    }

    fn email(with_invoice: bool) -> LicenseEmail {
        LicenseEmail {
            to_email: "jane@example.com".into(),
            to_name: "Jane Doe".into(),
            hardware_id: "ABC-123".into(),
            license_key: "FC1F02D5C55BD6C75B2B074F".into(),
            invoice: with_invoice.then(|| crate::InvoiceAttachment {
                number: "2025-0314-0007".into(),
                filename: "Invoice_2025-0314-0007.html".into(),
                bytes: b"<html></html>".to_vec(),
            }),
            amount: 300.0,
            issued_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let err = BrevoMailer::new("", "a@b.c", "A", "P").unwrap_err();
        assert!(matches!(err, NotifyError::Config(_)));
    }

    #[test]
    fn test_body_carries_key_and_binding_facts() {
        let body = mailer().render_body(&email(false));
        assert!(body.contains("FC1F02D5C55BD6C75B2B074F"));
        assert!(body.contains("ABC-123"));
        assert!(body.contains("Jane Doe"));
        assert!(!body.contains("Invoice attached"));
    }

    #[test]
    fn test_body_mentions_invoice_when_attached() {
        let body = mailer().render_body(&email(true));
        assert!(body.contains("Invoice attached"));
        assert!(body.contains("2025-0314-0007"));
    }

    #[test]
    fn test_request_serializes_brevo_shape() {
        let m = mailer();
        let e = email(true);
        let request = SendRequest {
            sender: Party {
                name: &m.from_name,
                email: &m.from_email,
            },
            to: vec![Party {
                name: &e.to_name,
                email: &e.to_email,
            }],
            reply_to: Party {
                name: &m.from_name,
                email: &m.from_email,
            },
            subject: "s".into(),
            html_content: "<p></p>".into(),
            attachment: Some(vec![Attachment {
                content: BASE64.encode(b"<html></html>"),
                name: "Invoice.html".into(),
            }]),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["sender"]["email"], "seller@example.com");
        assert_eq!(value["replyTo"]["email"], "seller@example.com");
        assert!(value["htmlContent"].is_string());
        assert_eq!(value["attachment"][0]["name"], "Invoice.html");
    }

    #[test]
    fn test_no_attachment_field_when_absent() {
        let request = SendRequest {
            sender: Party {
                name: "A",
                email: "a@b.c",
            },
            to: vec![],
            reply_to: Party {
                name: "A",
                email: "a@b.c",
            },
            subject: "s".into(),
            html_content: String::new(),
            attachment: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("attachment").is_none());
    }
}

//! Stripe Checkout Integration
//!
//! Thin adapter over Stripe's hosted checkout: one-off payment mode,
//! customer facts carried in session metadata so the webhook (and the
//! success page) can recover them without any server-side session
//! state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionBillingAddressCollection,
    CheckoutSessionId, CheckoutSessionMode, CheckoutSessionPaymentStatus, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
};

use crate::error::{PaymentError, Result};

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
    price_id: String,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str, price_id: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
            price_id: price_id.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;
        let price_id = std::env::var("STRIPE_PRICE_ID")
            .map_err(|_| PaymentError::Config("STRIPE_PRICE_ID not set".into()))?;

        Ok(Self::new(&secret_key, &webhook_secret, &price_id))
    }

    /// Get the webhook secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    /// Create a hosted checkout session for one license purchase.
    ///
    /// Returns the URL to redirect the customer to. The customer name,
    /// hardware id, and jurisdiction fields travel in session metadata
    /// and come back on the completed-payment webhook.
    pub async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
        base_url: &str,
    ) -> Result<CheckoutSession> {
        let success_url = format!("{base_url}/success?session_id={{CHECKOUT_SESSION_ID}}");
        let cancel_url = format!("{base_url}/cancelled");

        let mut metadata = HashMap::new();
        metadata.insert("name".to_string(), request.name.clone());
        metadata.insert("hardware_id".to_string(), request.hardware_id.clone());
        if let Some(ref court) = request.court {
            metadata.insert("court".to_string(), court.clone());
        }
        if let Some(ref number) = request.court_number {
            metadata.insert("court_number".to_string(), number.clone());
        }
        if let Some(ref district) = request.judicial_district {
            metadata.insert("judicial_district".to_string(), district.clone());
        }

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.customer_email = Some(&request.email);
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.metadata = Some(metadata);
        params.billing_address_collection = Some(CheckoutSessionBillingAddressCollection::Required);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(self.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        Ok(CheckoutSession {
            id: session.id.to_string(),
            checkout_url,
        })
    }

    /// Retrieve a session for the success page.
    ///
    /// The page re-derives the license key from the returned facts;
    /// derivation being pure guarantees the displayed key equals the
    /// one delivered by email.
    pub async fn retrieve_session(&self, session_id: &str) -> Result<SessionSummary> {
        let id: CheckoutSessionId = session_id
            .parse()
            .map_err(|_| PaymentError::Stripe(format!("Invalid session id: {session_id}")))?;

        let session = StripeCheckoutSession::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let metadata = session.metadata.unwrap_or_default();

        Ok(SessionSummary {
            paid: session.payment_status == CheckoutSessionPaymentStatus::Paid,
            name: metadata.get("name").cloned().unwrap_or_default(),
            hardware_id: metadata.get("hardware_id").cloned().unwrap_or_default(),
            email: session.customer_email.unwrap_or_default(),
        })
    }

    /// Get the underlying Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Request to create a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Customer name, exactly as it will be bound into the key
    pub name: String,

    /// Device fingerprint the license will be bound to
    pub hardware_id: String,

    /// Customer email
    pub email: String,

    /// Jurisdiction metadata, passed through unvalidated
    #[serde(default)]
    pub court: Option<String>,
    #[serde(default)]
    pub court_number: Option<String>,
    #[serde(default)]
    pub judicial_district: Option<String>,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session id
    pub id: String,

    /// URL to redirect the customer to
    pub checkout_url: String,
}

/// Facts recovered from a completed session, for the success page
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSummary {
    pub paid: bool,
    pub name: String,
    pub hardware_id: String,
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_request_optional_fields_default() {
        let request: CheckoutRequest = serde_json::from_str(
            r#"{"name": "Jane Doe", "hardware_id": "ABC-123", "email": "jane@example.com"}"#,
        )
        .unwrap();
        assert!(request.court.is_none());
        assert!(request.judicial_district.is_none());
    }
}

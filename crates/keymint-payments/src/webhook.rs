//! Stripe Webhook Handling
//!
//! Signature verification plus extraction of the one event this
//! service fulfills on: `checkout.session.completed` with a paid
//! status. Everything downstream of here trusts that verification.

use stripe::{
    CheckoutSessionPaymentStatus, Event, EventObject, EventType, Expandable, Webhook,
};

use crate::error::{PaymentError, Result};

/// A verified payment-completed event, the orchestrator's sole input
#[derive(Clone, Debug)]
pub struct PaymentEvent {
    /// Customer name as entered at checkout
    pub name: String,

    /// Device fingerprint the license binds to
    pub hardware_id: String,

    /// Customer email
    pub email: String,

    /// Gross amount in major currency units (converted once here from
    /// the smallest-unit wire value)
    pub amount: f64,

    /// Upper-cased ISO currency code
    pub currency: String,

    /// External checkout-session id, the deduplication key
    pub session_id: String,

    /// Jurisdiction metadata, passed through unvalidated
    pub court: Option<String>,
    pub court_number: Option<String>,
    pub judicial_district: Option<String>,

    /// Additional provider references, audit only
    pub payment_intent: Option<String>,
    pub customer_id: Option<String>,
    pub billing_country: Option<String>,
    pub billing_address: Option<String>,
}

/// Verify the webhook signature and parse the event
pub fn parse_event(payload: &str, signature: &str, secret: &str) -> Result<Event> {
    Webhook::construct_event(payload, signature, secret)
        .map_err(|e| PaymentError::WebhookSignature(e.to_string()))
}

/// Extract a `PaymentEvent` from a verified Stripe event.
///
/// Returns `Ok(None)` for event types this service ignores and for
/// completed sessions that are not paid (async payment methods fire
/// `completed` before settlement).
pub fn extract_payment_event(event: &Event) -> Result<Option<PaymentEvent>> {
    if event.type_ != EventType::CheckoutSessionCompleted {
        tracing::debug!(event_type = ?event.type_, "Ignoring webhook event");
        return Ok(None);
    }

    let EventObject::CheckoutSession(session) = &event.data.object else {
        return Err(PaymentError::WebhookParse(
            "Invalid checkout session data".into(),
        ));
    };

    if session.payment_status != CheckoutSessionPaymentStatus::Paid {
        tracing::info!(session_id = %session.id, "Session completed but not paid, skipping");
        return Ok(None);
    }

    let metadata = session.metadata.clone().unwrap_or_default();
    let details = session.customer_details.as_ref();

    let email = session
        .customer_email
        .clone()
        .or_else(|| details.and_then(|d| d.email.clone()))
        .unwrap_or_default();

    let address = details.and_then(|d| d.address.as_ref());

    Ok(Some(PaymentEvent {
        name: metadata.get("name").cloned().unwrap_or_default(),
        hardware_id: metadata.get("hardware_id").cloned().unwrap_or_default(),
        email,
        amount: session.amount_total.unwrap_or_default() as f64 / 100.0,
        currency: session
            .currency
            .map(|c| c.to_string().to_uppercase())
            .unwrap_or_else(|| "EUR".to_string()),
        session_id: session.id.to_string(),
        court: metadata.get("court").cloned(),
        court_number: metadata.get("court_number").cloned(),
        judicial_district: metadata.get("judicial_district").cloned(),
        payment_intent: session
            .payment_intent
            .as_ref()
            .map(|pi: &Expandable<stripe::PaymentIntent>| pi.id().to_string()),
        customer_id: session
            .customer
            .as_ref()
            .map(|c: &Expandable<stripe::Customer>| c.id().to_string()),
        billing_country: address.and_then(|a| a.country.clone()),
        billing_address: address.and_then(format_address),
    }))
}

/// Flatten a billing address into the single line the invoice prints
fn format_address(address: &stripe::Address) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(ref line1) = address.line1 {
        parts.push(line1.clone());
    }
    if let Some(ref line2) = address.line2 {
        parts.push(line2.clone());
    }
    let city_line = format!(
        "{} {}",
        address.postal_code.as_deref().unwrap_or(""),
        address.city.as_deref().unwrap_or("")
    )
    .trim()
    .to_string();
    if !city_line.is_empty() {
        parts.push(city_line);
    }
    if let Some(ref state) = address.state {
        parts.push(state.clone());
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_address_joins_present_parts() {
        let address = stripe::Address {
            line1: Some("C/ Mayor 1".into()),
            postal_code: Some("28001".into()),
            city: Some("Madrid".into()),
            state: Some("Madrid".into()),
            country: Some("ES".into()),
            ..Default::default()
        };
        assert_eq!(
            format_address(&address).unwrap(),
            "C/ Mayor 1, 28001 Madrid, Madrid"
        );
    }

    #[test]
    fn test_format_address_empty_is_none() {
        let address = stripe::Address::default();
        assert!(format_address(&address).is_none());
    }
}

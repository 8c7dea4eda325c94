//! # keymint-payments
//!
//! Stripe integration and the fulfillment orchestrator.
//!
//! The payment flow uses Stripe Checkout (hosted): the customer is
//! redirected to Stripe's page, and a verified
//! `checkout.session.completed` webhook drives fulfillment.
//!
//! ```text
//! ┌───────────┐   ┌────────────────┐   ┌──────────────────────────┐
//! │ /checkout │──▶│ Stripe Hosted  │──▶│ webhook ─▶ Fulfillment   │
//! │  (form)   │   │ Checkout Page  │   │  derive ▸ record ▸       │
//! └───────────┘   └────────────────┘   │  invoice ▸ email (async) │
//!                                      └──────────────────────────┘
//! ```
//!
//! The orchestrator's contract: once the key is derived, the run always
//! completes; ledger, invoice, and email failures degrade individual
//! steps without unwinding the earlier ones.

mod checkout;
mod error;
mod fulfillment;
mod webhook;

pub use checkout::{CheckoutRequest, CheckoutSession, SessionSummary, StripeClient};
pub use error::{PaymentError, Result};
pub use fulfillment::{FulfillmentEngine, FulfillmentReport, SaleOutcome};
pub use webhook::{PaymentEvent, extract_payment_event, parse_event};

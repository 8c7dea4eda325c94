//! Application State

use std::sync::Arc;

use keymint_core::Config;
use keymint_ledger::SalesLedger;
use keymint_payments::{FulfillmentEngine, StripeClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Service configuration (seller identity, fees, admin token)
    pub config: Arc<Config>,

    /// Sales ledger (Postgres in production, memory otherwise)
    pub ledger: Arc<dyn SalesLedger>,

    /// The fulfillment orchestrator
    pub engine: Arc<FulfillmentEngine>,

    /// Stripe client (None if not configured - checkout disabled)
    pub stripe: Option<Arc<StripeClient>>,
}

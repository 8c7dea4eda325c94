//! keymint HTTP Server
//!
//! Axum-based server exposing the checkout, webhook, success-page, and
//! admin endpoints around the fulfillment core.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keymint_core::Config;
use keymint_ledger::{MemoryLedger, PgLedger, SalesLedger};
use keymint_notify::{BrevoMailer, Notifier};
use keymint_payments::{FulfillmentEngine, StripeClient};

use crate::handlers::{
    admin_export_csv, admin_export_json, admin_panel, cancelled, create_checkout, health_check,
    stripe_webhook, success,
};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = Arc::new(Config::from_env()?);

    // Ledger: Postgres when configured, memory otherwise
    let ledger: Arc<dyn SalesLedger> = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let ledger = PgLedger::connect(&url).await?;
            tracing::info!("✓ Connected to Postgres ledger");
            Arc::new(ledger)
        }
        Err(_) => {
            tracing::warn!("⚠ DATABASE_URL not set - sales will NOT survive restarts");
            Arc::new(MemoryLedger::new())
        }
    };

    // Notifier
    let notifier: Arc<dyn Notifier> = match BrevoMailer::from_env() {
        Ok(mailer) => {
            tracing::info!("✓ Brevo configured");
            Arc::new(mailer)
        }
        Err(e) => {
            tracing::warn!("⚠ Email disabled: {}", e);
            Arc::new(NullNotifier)
        }
    };

    // The engine refuses to start without a license secret; without it
    // no customer could ever receive a working key.
    let engine = Arc::new(FulfillmentEngine::new(
        &config,
        Arc::clone(&ledger),
        notifier,
    )?);

    let stripe = StripeClient::from_env().ok();
    if stripe.is_some() {
        tracing::info!("✓ Stripe configured");
    } else {
        tracing::warn!("⚠ Stripe not configured - checkout disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY, STRIPE_WEBHOOK_SECRET and STRIPE_PRICE_ID");
    }

    let state = AppState {
        config,
        ledger,
        engine,
        stripe: stripe.map(Arc::new),
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        // Health
        .route("/health", get(health_check))
        // Purchase flow
        .route("/checkout", post(create_checkout))
        .route("/success", get(success))
        .route("/cancelled", get(cancelled))
        .route("/webhook/stripe", post(stripe_webhook))
        // Admin (token-gated, read-only)
        .route("/admin", get(admin_panel))
        .route("/admin/export", get(admin_export_json))
        .route("/admin/export.csv", get(admin_export_csv))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 keymint server running on http://{}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health            - Health check");
    tracing::info!("  POST /checkout          - Create Stripe checkout");
    tracing::info!("  GET  /success           - Success page data");
    tracing::info!("  POST /webhook/stripe    - Payment webhook");
    tracing::info!("  GET  /admin             - Sales listing");
    tracing::info!("  GET  /admin/export      - JSON export");
    tracing::info!("  GET  /admin/export.csv  - CSV export");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Notifier used when Brevo is not configured: logs and reports failure
/// so fulfillment still completes in development environments.
struct NullNotifier;

#[async_trait::async_trait]
impl Notifier for NullNotifier {
    async fn send_license(
        &self,
        email: &keymint_notify::LicenseEmail,
    ) -> keymint_notify::Result<()> {
        Err(keymint_notify::NotifyError::Config(format!(
            "email provider not configured, license for {} not sent",
            email.to_email
        )))
    }
}

//! HTTP Handlers
//!
//! Thin adapters around the core: checkout creation, the webhook entry
//! point, the success page's key re-derivation, and the token-gated
//! read-only admin views over the ledger.

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use keymint_ledger::{export_csv, export_json};
use keymint_payments::{CheckoutRequest, extract_payment_event, parse_event};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub ledger_reachable: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub name: String,
    pub email: String,
    pub license_key: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminQuery {
    #[serde(default)]
    pub token: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: &str, code: &str) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let ledger_reachable = state.ledger.count().await.is_ok();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.stripe.is_some(),
        ledger_reachable,
    })
}

/// Create a Stripe checkout session for one license purchase
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, HandlerError> {
    let stripe = state.stripe.as_ref().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    if payload.name.trim().is_empty()
        || payload.hardware_id.trim().is_empty()
        || payload.email.trim().is_empty()
    {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "name, hardware_id and email are required",
            "MISSING_FIELDS",
        ));
    }

    let session = stripe
        .create_checkout_session(payload, &state.config.base_url)
        .await
        .map_err(|e| {
            tracing::error!("Checkout error: {}", e);
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.user_message(),
                "CHECKOUT_ERROR",
            )
        })?;

    Ok(Json(CheckoutResponse {
        checkout_url: session.checkout_url,
        session_id: session.id,
    }))
}

/// Success page data: re-derives the license key from the session's
/// own facts. Derivation being pure guarantees this equals the key the
/// webhook path stored and emailed.
pub async fn success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> Result<Json<SuccessResponse>, HandlerError> {
    let stripe = state.stripe.as_ref().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let session_id = query
        .session_id
        .ok_or_else(|| error(StatusCode::BAD_REQUEST, "Invalid session", "MISSING_SESSION"))?;

    let summary = stripe.retrieve_session(&session_id).await.map_err(|e| {
        tracing::error!("Session retrieval error: {}", e);
        error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Could not verify the payment",
            "SESSION_ERROR",
        )
    })?;

    if !summary.paid {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "Payment has not completed",
            "NOT_PAID",
        ));
    }

    let license_key = state
        .engine
        .deriver()
        .derive(&summary.hardware_id, &summary.name);

    Ok(Json(SuccessResponse {
        name: summary.name,
        email: summary.email,
        license_key: license_key.to_string(),
    }))
}

/// Checkout cancelled by the customer
pub async fn cancelled() -> Json<serde_json::Value> {
    Json(json!({"status": "cancelled"}))
}

/// Stripe webhook: verify, extract, fulfill.
///
/// Returns 200 once fulfillment completes (or for event types this
/// service ignores); Stripe redelivers on anything else, and the
/// ledger's session-id dedup makes that redelivery harmless.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, HandlerError> {
    let stripe = state.stripe.as_ref().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error(
                StatusCode::BAD_REQUEST,
                "Missing Stripe signature",
                "MISSING_SIGNATURE",
            )
        })?;

    let event = parse_event(&body, signature, stripe.webhook_secret()).map_err(|e| {
        tracing::warn!("Webhook signature failed: {}", e);
        error(
            StatusCode::BAD_REQUEST,
            "Invalid signature",
            "INVALID_SIGNATURE",
        )
    })?;

    let payment = extract_payment_event(&event).map_err(|e| {
        tracing::warn!("Webhook payload invalid: {}", e);
        error(StatusCode::BAD_REQUEST, "Invalid payload", "INVALID_PAYLOAD")
    })?;

    if let Some(payment) = payment {
        let report = state.engine.fulfill(payment).await;
        tracing::info!(
            sale = ?report.sale,
            invoice = ?report.invoice_number,
            "Fulfillment run completed"
        );
    }

    Ok(StatusCode::OK)
}

// ============================================================================
// Admin (token-gated, read-only)
// ============================================================================

fn check_admin(state: &AppState, token: &str) -> Result<(), HandlerError> {
    if state.config.admin_token.is_empty() || token != state.config.admin_token {
        return Err(error(
            StatusCode::UNAUTHORIZED,
            "Unauthorized",
            "UNAUTHORIZED",
        ));
    }
    Ok(())
}

/// Sales listing with revenue totals
pub async fn admin_panel(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    check_admin(&state, &query.token)?;

    let sales = state.ledger.list_all().await.map_err(ledger_error)?;
    let count = state.ledger.count().await.map_err(ledger_error)?;
    let revenue = state
        .ledger
        .revenue(&state.config.fees)
        .await
        .map_err(ledger_error)?;

    Ok(Json(json!({
        "total_count": count,
        "revenue": revenue,
        "sales": sales,
    })))
}

/// Full JSON export: totals plus every row
pub async fn admin_export_json(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
) -> Result<Json<serde_json::Value>, HandlerError> {
    check_admin(&state, &query.token)?;

    let sales = state.ledger.list_all().await.map_err(ledger_error)?;
    let revenue = state
        .ledger
        .revenue(&state.config.fees)
        .await
        .map_err(ledger_error)?;

    Ok(Json(export_json(&sales, &revenue)))
}

/// CSV export as a download, UTF-8 BOM for spreadsheet tools
pub async fn admin_export_csv(
    State(state): State<AppState>,
    Query(query): Query<AdminQuery>,
) -> Result<Response, HandlerError> {
    check_admin(&state, &query.token)?;

    let sales = state.ledger.list_all().await.map_err(ledger_error)?;
    let csv = export_csv(&sales, &state.config.fees);

    if csv.is_empty() {
        return Err(error(StatusCode::NOT_FOUND, "No sales to export", "EMPTY"));
    }

    let filename = format!("license_sales_{}.csv", Utc::now().format("%Y%m%d_%H%M"));
    let body = format!("\u{feff}{csv}");

    Ok((
        [
            (
                header::CONTENT_TYPE,
                "text/csv; charset=utf-8".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response())
}

fn ledger_error(err: keymint_ledger::LedgerError) -> HandlerError {
    tracing::error!("Ledger error: {}", err);
    error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Ledger unavailable",
        "LEDGER_ERROR",
    )
}

use axum::{Router, extract::State, middleware, routing::post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::jwt::{FINAL_FEE_TOKEN, PaymentTokenClaims};
use crate::middleware::admin_auth;
use crate::models::FinalFeePayment;
use crate::payments::checked_minor_units;

/// Upper bound on admin-chosen token lifetimes (7 days).
const MAX_TTL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest {
    pub user_id: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub ttl_minutes: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenResponse {
    pub token: String,
    pub application_id: String,
    pub amount: f64,
    pub expires_at: DateTime<Utc>,
}

/// Amount a token should carry: the explicit one, else the payable amount.
pub fn token_amount(explicit: Option<f64>, payment: &FinalFeePayment) -> Result<f64> {
    match explicit.or(payment.payable_amount) {
        Some(a) if checked_minor_units(a).is_some() => Ok(a),
        _ => Err(AppError::InvalidAmount),
    }
}

/// POST /api/admin/payment-token
///
/// Mints a `final_fee` token for an application. Used by the admin dashboard
/// to build the payment link sent to the student.
pub async fn issue_payment_token(
    State(state): State<AppState>,
    Json(request): Json<IssueTokenRequest>,
) -> Result<Json<IssueTokenResponse>> {
    let codec = state
        .tokens
        .as_ref()
        .ok_or(AppError::ServerMisconfigured(msg::TOKEN_SECRET_NOT_CONFIGURED))?;

    let conn = state.db.get()?;
    let application = queries::find_application_for_user(&conn, request.user_id.trim())?
        .ok_or(AppError::ApplicationNotFound)?;

    if application.final_fee_payment.is_paid() {
        return Err(AppError::AlreadyPaid);
    }

    let amount = token_amount(request.amount, &application.final_fee_payment)?;
    let ttl_minutes = request
        .ttl_minutes
        .unwrap_or(state.config.payment_token_ttl_minutes)
        .clamp(1, MAX_TTL_MINUTES);

    let issued_at = Utc::now();
    let expires_at = issued_at + chrono::Duration::minutes(ttl_minutes as i64);
    let token = codec.encode_at(
        &PaymentTokenClaims {
            user_id: application.id.clone(),
            amount,
            token_type: FINAL_FEE_TOKEN.to_string(),
        },
        issued_at.timestamp(),
        expires_at.timestamp(),
    )?;

    tracing::info!(
        application_id = %application.id,
        amount,
        ttl_minutes,
        "Issued payment token"
    );

    Ok(Json(IssueTokenResponse {
        token,
        application_id: application.id,
        amount,
        expires_at,
    }))
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/payment-token", post(issue_payment_token))
        .layer(middleware::from_fn_with_state(state, admin_auth))
}

use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Query};
use crate::jwt::{FINAL_FEE_TOKEN, RECEIPT_TOKEN, decode_unverified};
use crate::models::PaymentStatus;

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPreview {
    pub user_id: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub token_type: String,
    pub issued_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub expired: bool,
}

/// GET /api/payment/token/preview
///
/// Decodes without verifying, so the payment page can show the amount
/// before checkout. Nothing here is trusted server-side.
pub async fn preview_token(Query(query): Query<TokenQuery>) -> Result<Json<TokenPreview>> {
    let decoded = decode_unverified(query.token.trim()).map_err(|_| AppError::InvalidToken)?;
    let expired = decoded.is_expired(Utc::now().timestamp());

    Ok(Json(TokenPreview {
        user_id: decoded.user_id,
        amount: decoded.amount,
        token_type: decoded.token_type,
        issued_at: decoded.iat,
        expires_at: decoded.exp,
        expired,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceSummary {
    pub number: String,
    pub date: DateTime<Utc>,
    pub amount_paid: f64,
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub application_id: String,
    pub payment_status: Option<PaymentStatus>,
    pub payable_amount: Option<f64>,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub history_count: usize,
    pub invoices: Vec<InvoiceSummary>,
}

/// GET /api/payment/status
///
/// Accepts either the payment token or the receipt token handed back by
/// verify.
pub async fn payment_status(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<PaymentStatusResponse>> {
    let codec = state
        .tokens
        .as_ref()
        .ok_or(AppError::ServerMisconfigured(msg::TOKEN_SECRET_NOT_CONFIGURED))?;

    let claims = codec.verify(query.token.trim())?;
    if claims.token_type != FINAL_FEE_TOKEN && claims.token_type != RECEIPT_TOKEN {
        return Err(AppError::InvalidToken);
    }

    let conn = state.db.get()?;
    let application = queries::find_application_for_user(&conn, &claims.user_id)?
        .ok_or(AppError::ApplicationNotFound)?;
    let payment = application.final_fee_payment;

    Ok(Json(PaymentStatusResponse {
        application_id: application.id,
        payment_status: payment.payment_status,
        payable_amount: payment.payable_amount,
        razorpay_order_id: payment.razorpay_order_id,
        razorpay_payment_id: payment.razorpay_payment_id,
        paid_at: payment.paid_at,
        history_count: payment.payment_history.len(),
        invoices: payment
            .invoice
            .into_iter()
            .map(|i| InvoiceSummary {
                number: i.number,
                date: i.date,
                amount_paid: i.amount_paid,
                url: i.url,
            })
            .collect(),
    }))
}

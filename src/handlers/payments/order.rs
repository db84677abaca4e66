use std::collections::BTreeMap;

use axum::{extract::State, http::HeaderMap};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::jwt::FINAL_FEE_TOKEN;
use crate::middleware::authenticate_payer;
use crate::models::Application;
use crate::payments::{OrderRequest, checked_minor_units, to_minor_units};
use crate::util::short_id;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Signed payment token or legacy plain token
    #[serde(default)]
    pub token: Option<String>,
    /// Direct amount in rupees (number or numeric string)
    #[serde(default)]
    pub amount: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub key_id: String,
    pub order_id: String,
    /// Minor units, as the hosted checkout expects
    pub amount: i64,
    pub currency: String,
    pub status: Option<String>,
}

/// Where the payable amount came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OrderSource {
    SignedToken,
    LegacyToken,
    Direct,
}

impl OrderSource {
    fn as_str(&self) -> &'static str {
        match self {
            OrderSource::SignedToken => "signed_token",
            OrderSource::LegacyToken => "legacy_token",
            OrderSource::Direct => "direct",
        }
    }
}

struct ResolvedOrder {
    source: OrderSource,
    amount: f64,
    /// Set when a token identified the application; the order is persisted on it
    application: Option<Application>,
    /// Payer identity for the gateway notes
    user_id: Option<String>,
}

/// Signed tokens are compact JWS (three dot-separated segments); anything
/// else is looked up as a legacy plain token.
fn is_signed_token(token: &str) -> bool {
    token.split('.').count() == 3
}

/// Amount must come to at least one paisa. Numeric strings are accepted.
fn parse_amount(value: &Value) -> Result<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    validate_amount(amount)
}

fn validate_amount(amount: Option<f64>) -> Result<f64> {
    match amount {
        Some(a) if checked_minor_units(a).is_some() => Ok(a),
        _ => Err(AppError::InvalidAmount),
    }
}

fn resolve_signed_token(state: &AppState, token: &str) -> Result<ResolvedOrder> {
    let codec = state
        .tokens
        .as_ref()
        .ok_or(AppError::ServerMisconfigured(msg::TOKEN_SECRET_NOT_CONFIGURED))?;
    let claims = codec.verify_typed(token, FINAL_FEE_TOKEN).map_err(|e| {
        tracing::warn!(error = %e, "Rejected payment token");
        AppError::InvalidToken
    })?;

    let conn = state.db.get()?;
    let application = queries::find_application_for_user(&conn, &claims.user_id)?
        .ok_or(AppError::ApplicationNotFound)?;

    if application.final_fee_payment.is_paid() {
        return Err(AppError::AlreadyPaid);
    }

    Ok(ResolvedOrder {
        source: OrderSource::SignedToken,
        amount: validate_amount(Some(claims.amount))?,
        user_id: Some(claims.user_id),
        application: Some(application),
    })
}

fn resolve_legacy_token(state: &AppState, token: &str) -> Result<ResolvedOrder> {
    let conn = state.db.get()?;
    let application =
        queries::find_application_by_legacy_token(&conn, token)?.ok_or(AppError::TokenNotFound)?;
    let payment = &application.final_fee_payment;

    if payment.token_expires.is_some_and(|exp| exp <= Utc::now()) {
        return Err(AppError::TokenExpired);
    }
    if payment.token_used {
        return Err(AppError::TokenUsed);
    }
    if payment.is_paid() {
        return Err(AppError::AlreadyPaid);
    }

    Ok(ResolvedOrder {
        source: OrderSource::LegacyToken,
        amount: validate_amount(payment.payable_amount)?,
        user_id: application.account.auth_id.clone(),
        application: Some(application),
    })
}

async fn resolve_direct(
    state: &AppState,
    headers: &HeaderMap,
    amount: Option<&Value>,
) -> Result<ResolvedOrder> {
    let amount = amount.ok_or_else(|| AppError::BadRequest(msg::MISSING_PAYMENT_SOURCE.into()))?;
    let identity = authenticate_payer(state, headers).await?;
    let amount = parse_amount(amount)?;

    Ok(ResolvedOrder {
        source: OrderSource::Direct,
        amount,
        user_id: identity.map(|i| i.uid),
        application: None,
    })
}

/// POST /api/payment/order
///
/// Creates a gateway order from a signed token, a legacy token, or a direct
/// amount. No retries: a gateway failure is reported as `order_create_failed`.
pub async fn create_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateOrderRequest>,
) -> Result<Json<CreateOrderResponse>> {
    let token = request.token.as_deref().map(str::trim).filter(|t| !t.is_empty());

    let resolved = match token {
        Some(token) if is_signed_token(token) => resolve_signed_token(&state, token)?,
        Some(token) => resolve_legacy_token(&state, token)?,
        None => resolve_direct(&state, &headers, request.amount.as_ref()).await?,
    };

    let gateway = state
        .gateway
        .clone()
        .ok_or(AppError::ServerMisconfigured(msg::GATEWAY_NOT_CONFIGURED))?;

    let amount_minor = to_minor_units(resolved.amount);
    let currency = state.config.payment_currency.clone();
    let receipt_subject = resolved
        .application
        .as_ref()
        .map(|a| a.id.as_str())
        .or(resolved.user_id.as_deref())
        .unwrap_or("guest");

    let mut notes = BTreeMap::new();
    notes.insert("source".to_string(), resolved.source.as_str().to_string());
    if let Some(ref user_id) = resolved.user_id {
        notes.insert("userId".to_string(), user_id.clone());
    }
    if let Some(ref application) = resolved.application {
        notes.insert("applicationId".to_string(), application.id.clone());
    }

    let order_request = OrderRequest {
        amount: amount_minor,
        currency: currency.clone(),
        receipt: format!(
            "fee_{}_{}",
            short_id(receipt_subject, 8),
            Utc::now().timestamp()
        ),
        notes,
    };

    let order = gateway.create_order(&order_request).await.map_err(|e| match e {
        AppError::OrderCreateFailed(detail) => AppError::OrderCreateFailed(detail),
        other => AppError::OrderCreateFailed(other.to_string()),
    })?;

    if let Some(ref application) = resolved.application {
        let mut conn = state.db.get()?;
        queries::record_gateway_order(&mut conn, &application.id, &order.id, amount_minor, &currency)
            .map_err(|e| AppError::UpdateFailed(format!("Failed to record order {}: {}", order.id, e)))?;
    }

    tracing::info!(
        order_id = %order.id,
        amount_minor,
        source = resolved.source.as_str(),
        application_id = resolved.application.as_ref().map(|a| a.id.as_str()),
        "Created payment order"
    );

    Ok(Json(CreateOrderResponse {
        key_id: gateway.key_id().to_string(),
        order_id: order.id,
        amount: order.amount,
        currency: order.currency,
        status: order.status,
    }))
}

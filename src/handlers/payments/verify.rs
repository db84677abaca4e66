use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::invoice::PaidPayment;
use crate::jwt::{FINAL_FEE_TOKEN, PaymentTokenClaims, RECEIPT_TOKEN};
use crate::ledger::{
    CLIENT_VERIFIED_EVENT, EventSource, IdempotencyScope, LedgerOutcome, PaymentEvent,
    apply_payment_event,
};
use crate::models::Application;
use crate::payments::{
    GatewayPayment, from_minor_units, to_minor_units, verify_checkout_signature,
};

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub ok: bool,
    /// Short-lived `payment_receipt` token for the confirmation page
    pub redirect_token: Option<String>,
}

/// Application named by the caller for an order this service never
/// recorded: the signed token the page was opened with, then the user id.
fn claimed_application(
    conn: &rusqlite::Connection,
    state: &AppState,
    request: &VerifyPaymentRequest,
) -> Result<Option<Application>> {
    if let (Some(token), Some(codec)) = (request.token.as_deref(), state.tokens.as_ref()) {
        match codec.verify_typed(token, FINAL_FEE_TOKEN) {
            Ok(claims) => {
                if let Some(app) = queries::find_application_for_user(conn, &claims.user_id)? {
                    return Ok(Some(app));
                }
            }
            Err(e) => tracing::debug!(error = %e, "Ignoring unusable token on verify"),
        }
    }

    match request.user_id.as_deref().filter(|u| !u.is_empty()) {
        Some(user_id) => queries::find_application_for_user(conn, user_id),
        None => Ok(None),
    }
}

/// Whether a gateway payment was made for `application` through `order_id`:
/// the order matches and its notes name the application or its applicant.
fn payment_belongs_to(payment: &GatewayPayment, order_id: &str, application: &Application) -> bool {
    if payment.order_id.as_deref() != Some(order_id) {
        return false;
    }
    match (payment.note("applicationId"), payment.note("userId")) {
        (Some(application_id), _) => application_id == application.id,
        (None, Some(user_id)) => {
            user_id == application.id || application.account.auth_id.as_deref() == Some(user_id)
        }
        (None, None) => false,
    }
}

/// Whether the captured amount covers what the application still owes.
fn covers_payable(payment: &GatewayPayment, application: &Application) -> bool {
    match application.final_fee_payment.payable_amount {
        Some(payable) => payment.amount >= to_minor_units(payable),
        None => true,
    }
}

struct ResolvedCheckout {
    application: Application,
    details: Option<GatewayPayment>,
}

/// Application for a verified checkout.
///
/// Orders recorded for an application are trusted as is. Any other order
/// only settles the application named by the token or user id when the
/// gateway payment's notes point at it and the payment covers the payable
/// amount. Everything else is left for the webhook.
async fn resolve_checkout(state: &AppState, request: &VerifyPaymentRequest) -> Result<ResolvedCheckout> {
    let order_id = request.razorpay_order_id.as_str();
    let (recorded, claimed) = {
        let conn = state.db.get()?;
        match queries::find_application_by_order_id(&conn, order_id)? {
            Some(app) => (Some(app), None),
            None => (None, claimed_application(&conn, state, request)?),
        }
    };

    let details = fetch_payment_details(state, &request.razorpay_payment_id).await;

    if let Some(application) = recorded {
        return Ok(ResolvedCheckout {
            application,
            details,
        });
    }

    let application = claimed.ok_or(AppError::ApplicationNotFound)?;
    let Some(payment) = details.as_ref() else {
        tracing::warn!(
            order_id,
            application_id = %application.id,
            "Unrecorded order without gateway details, leaving it to the webhook"
        );
        return Err(AppError::ApplicationNotFound);
    };

    if !payment_belongs_to(payment, order_id, &application) {
        tracing::warn!(
            order_id,
            application_id = %application.id,
            "Payment notes do not name the claimed application"
        );
        return Err(AppError::ApplicationNotFound);
    }

    if !covers_payable(payment, &application) {
        tracing::warn!(
            order_id,
            application_id = %application.id,
            amount_minor = payment.amount,
            "Payment does not cover the payable amount"
        );
        return Err(AppError::ApplicationNotFound);
    }

    Ok(ResolvedCheckout {
        application,
        details,
    })
}

/// Amount for the history entry of a recorded order when the gateway lookup
/// is unavailable: the recorded order amount, else the payable amount.
fn fallback_amount(state: &AppState, application: &Application, order_id: &str) -> f64 {
    let recorded = state
        .db
        .get()
        .ok()
        .and_then(|conn| queries::get_payment_order(&conn, order_id).ok().flatten())
        .map(|order| from_minor_units(order.amount_minor));

    recorded
        .or(application.final_fee_payment.payable_amount)
        .unwrap_or(0.0)
}

async fn fetch_payment_details(state: &AppState, payment_id: &str) -> Option<GatewayPayment> {
    let gateway = state.gateway.as_ref()?;
    match gateway.fetch_payment(payment_id).await {
        Ok(payment) => Some(payment),
        Err(e) => {
            tracing::warn!(payment_id, error = %e, "Could not fetch payment details");
            None
        }
    }
}

/// POST /api/payment/verify
///
/// Relayed by the browser after the hosted checkout succeeds. The webhook is
/// authoritative; this only shortens the time until the page shows "paid".
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>> {
    let key_secret = state
        .config
        .razorpay
        .as_ref()
        .map(|r| r.key_secret.clone())
        .ok_or(AppError::ServerMisconfigured(msg::GATEWAY_NOT_CONFIGURED))?;

    if !verify_checkout_signature(
        &key_secret,
        &request.razorpay_order_id,
        &request.razorpay_payment_id,
        &request.razorpay_signature,
    ) {
        return Err(AppError::InvalidSignature);
    }

    let ResolvedCheckout {
        application,
        details,
    } = resolve_checkout(&state, &request).await?;

    let mut event = PaymentEvent::new(
        CLIENT_VERIFIED_EVENT,
        request.razorpay_payment_id.clone(),
        EventSource::Client,
    );
    event.order_id = Some(request.razorpay_order_id.clone());
    match details {
        Some(payment) => {
            event.amount = payment.amount_major();
            event.status = payment.status.clone();
            event.method = payment.method.clone();
            event.gateway_created_at = payment.created_at;
        }
        None => {
            event.amount = fallback_amount(&state, &application, &request.razorpay_order_id);
        }
    }

    let outcome = {
        let mut conn = state.db.get()?;
        apply_payment_event(&mut conn, &application.id, &event, IdempotencyScope::PaymentId)?
    };

    if outcome.became_paid() {
        let paid = PaidPayment {
            payment_id: event.payment_id.clone(),
            order_id: event.order_id.clone(),
            amount: event.amount,
            method: event.method.clone(),
        };
        state
            .invoices
            .issue_for_payment(&state.db, &application.id, &paid)
            .await;
    } else if outcome == LedgerOutcome::AlreadyProcessed {
        tracing::info!(
            application_id = %application.id,
            payment_id = %event.payment_id,
            "Checkout verify for a payment already recorded"
        );
    }

    let redirect_token = match state.tokens.as_ref() {
        Some(codec) => Some(codec.encode(&PaymentTokenClaims {
            user_id: application.id.clone(),
            amount: event.amount,
            token_type: RECEIPT_TOKEN.to_string(),
        })?),
        None => None,
    };

    Ok(Json(VerifyPaymentResponse {
        ok: true,
        redirect_token,
    }))
}

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::invoice::PaidPayment;
use crate::ledger::{
    EventSource, IdempotencyScope, LedgerOutcome, PaymentEvent, apply_payment_event,
};
use crate::models::Application;
use crate::payments::{RazorpayWebhookEvent, from_minor_units, verify_webhook_signature};

/// Result type for webhook operations.
pub type WebhookResult = (StatusCode, &'static str);

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Events that change the ledger. Everything else is acknowledged and dropped.
pub const HANDLED_EVENTS: &[&str] = &[
    "payment.authorized",
    "payment.captured",
    "payment.failed",
    "order.paid",
    "refund.created",
    "refund.processed",
];

/// Normalize a webhook into a ledger event. `None` when the payload has no
/// payment (or refund) entity to record.
pub fn payment_event_from_webhook(webhook: &RazorpayWebhookEvent) -> Option<PaymentEvent> {
    if webhook.event.starts_with("refund.") {
        let refund = webhook.refund()?;
        let payment_id = refund
            .payment_id
            .clone()
            .or_else(|| webhook.payment().map(|p| p.id.clone()))?;

        let mut event = PaymentEvent::new(webhook.event.clone(), payment_id, EventSource::Webhook);
        event.order_id = webhook.payment().and_then(|p| p.order_id.clone());
        event.amount = from_minor_units(refund.amount);
        event.status = refund.status.clone();
        event.gateway_created_at = refund.created_at;
        return Some(event);
    }

    let payment = webhook.payment()?;
    let mut event = PaymentEvent::new(webhook.event.clone(), payment.id.clone(), EventSource::Webhook);
    event.order_id = payment
        .order_id
        .clone()
        .or_else(|| webhook.order().map(|o| o.id.clone()));
    event.amount = payment.amount_major();
    event.status = payment.status.clone();
    event.method = payment.method.clone();
    event.gateway_created_at = payment.created_at.or(webhook.created_at);
    event.error_code = payment.error_code.clone();
    event.error_description = payment.error_description.clone();
    Some(event)
}

/// Application owning the event: by order id, then by a payment already
/// on record, then by the `applicationId` note set at order creation.
fn resolve_application(
    state: &AppState,
    webhook: &RazorpayWebhookEvent,
    event: &PaymentEvent,
) -> Result<Option<Application>> {
    let conn = state.db.get()?;

    if let Some(ref order_id) = event.order_id
        && let Some(app) = queries::find_application_by_order_id(&conn, order_id)?
    {
        return Ok(Some(app));
    }

    if let Some(app) = queries::find_application_by_payment_id(&conn, &event.payment_id)? {
        return Ok(Some(app));
    }

    match webhook.payment().and_then(|p| p.note("applicationId")) {
        Some(application_id) => queries::get_application_by_id(&conn, application_id),
        None => Ok(None),
    }
}

/// POST /api/webhooks/razorpay
pub async fn handle_razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let Some(secret) = state.config.razorpay_webhook_secret.as_deref() else {
        tracing::error!("RAZORPAY_WEBHOOK_SECRET not configured, cannot verify webhook");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Webhook secret not configured");
    };

    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        tracing::warn!("Razorpay webhook without signature header");
        return (StatusCode::BAD_REQUEST, "Missing signature");
    };

    if !verify_webhook_signature(secret, &body, signature) {
        tracing::warn!("Razorpay webhook with invalid signature");
        return (StatusCode::BAD_REQUEST, "Invalid signature");
    }

    let webhook: RazorpayWebhookEvent = match serde_json::from_slice(&body) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "Razorpay webhook with invalid JSON");
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    if !HANDLED_EVENTS.contains(&webhook.event.as_str()) {
        tracing::debug!(event = %webhook.event, "Ignoring Razorpay event");
        return (StatusCode::OK, "Event ignored");
    }

    let Some(event) = payment_event_from_webhook(&webhook) else {
        tracing::debug!(event = %webhook.event, "Razorpay event without payment entity");
        return (StatusCode::OK, "Event ignored");
    };

    let application = match resolve_application(&state, &webhook, &event) {
        Ok(Some(app)) => app,
        Ok(None) => {
            tracing::warn!(
                event = %event.event,
                payment_id = %event.payment_id,
                order_id = ?event.order_id,
                "No application found for Razorpay webhook"
            );
            return (StatusCode::OK, "Application not found");
        }
        Err(e) => {
            tracing::error!(error = %e, "DB error resolving webhook application");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    let outcome = match state.db.get().map_err(AppError::from).and_then(|mut conn| {
        apply_payment_event(
            &mut conn,
            &application.id,
            &event,
            IdempotencyScope::PaymentIdAndEvent,
        )
    }) {
        Ok(outcome) => outcome,
        Err(AppError::ApplicationNotFound) => {
            tracing::warn!(application_id = %application.id, "Application disappeared before update");
            return (StatusCode::OK, "Application not found");
        }
        Err(e) => {
            tracing::error!(
                application_id = %application.id,
                payment_id = %event.payment_id,
                error = %e,
                "Failed to apply Razorpay webhook"
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, "Update failed");
        }
    };

    match outcome {
        LedgerOutcome::AlreadyProcessed => {
            tracing::info!(
                event = %event.event,
                payment_id = %event.payment_id,
                "Razorpay webhook already processed"
            );
            (StatusCode::OK, "Already processed")
        }
        LedgerOutcome::Applied { became_paid, .. } => {
            if became_paid {
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
            }
            (StatusCode::OK, "OK")
        }
    }
}

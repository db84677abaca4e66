//! Idempotent application of payment events to `final_fee_payment`.
//!
//! Both the checkout verify endpoint and the webhook receiver funnel into
//! [`apply_payment_event`]. The read-modify-write runs in one IMMEDIATE
//! transaction and the `(application, payment, event)` triple is claimed in
//! `payment_events`, so concurrent deliveries of the same event append at
//! most one history entry.

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{FinalFeePayment, PaymentHistoryEntry, PaymentStatus};

/// Event name recorded when the browser relays a verified checkout.
pub const CLIENT_VERIFIED_EVENT: &str = "client.verified";

/// What counts as "already applied".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdempotencyScope {
    /// Any history entry with the same payment id (checkout verify).
    PaymentId,
    /// Same payment id and same event name (webhooks).
    PaymentIdAndEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Webhook,
    Client,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Webhook => "webhook",
            EventSource::Client => "client",
        }
    }
}

/// One observed payment event, normalized from either source.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    pub event: String,
    pub payment_id: String,
    pub order_id: Option<String>,
    /// Major units
    pub amount: f64,
    pub status: Option<String>,
    pub method: Option<String>,
    pub source: EventSource,
    pub gateway_created_at: Option<i64>,
    pub error_code: Option<String>,
    pub error_description: Option<String>,
}

impl PaymentEvent {
    pub fn new(event: impl Into<String>, payment_id: impl Into<String>, source: EventSource) -> Self {
        Self {
            event: event.into(),
            payment_id: payment_id.into(),
            order_id: None,
            amount: 0.0,
            status: None,
            method: None,
            source,
            gateway_created_at: None,
            error_code: None,
            error_description: None,
        }
    }

    fn history_entry(&self) -> PaymentHistoryEntry {
        PaymentHistoryEntry {
            event: self.event.clone(),
            payment_id: self.payment_id.clone(),
            order_id: self.order_id.clone(),
            amount: self.amount,
            status: self.status.clone(),
            method: self.method.clone(),
            source: Some(self.source.as_str().to_string()),
            received_at: Utc::now(),
            gateway_created_at: self.gateway_created_at,
            error_code: self.error_code.clone(),
            error_description: self.error_description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOutcome {
    Applied {
        /// Status after this event (unchanged for history-only events)
        status: Option<PaymentStatus>,
        /// True when this event moved the application into `paid`
        became_paid: bool,
        payment: FinalFeePayment,
    },
    AlreadyProcessed,
}

impl LedgerOutcome {
    pub fn became_paid(&self) -> bool {
        matches!(self, LedgerOutcome::Applied { became_paid: true, .. })
    }
}

/// Apply `event` to the application's payment sub-document.
///
/// Errors: `ApplicationNotFound` when the row is missing, `UpdateFailed`
/// for any persistence failure. Nothing is written on either.
pub fn apply_payment_event(
    conn: &mut Connection,
    application_id: &str,
    event: &PaymentEvent,
    scope: IdempotencyScope,
) -> Result<LedgerOutcome> {
    apply_in_transaction(conn, application_id, event, scope).map_err(|e| match e {
        AppError::ApplicationNotFound => AppError::ApplicationNotFound,
        AppError::UpdateFailed(detail) => AppError::UpdateFailed(detail),
        other => AppError::UpdateFailed(other.to_string()),
    })
}

fn apply_in_transaction(
    conn: &mut Connection,
    application_id: &str,
    event: &PaymentEvent,
    scope: IdempotencyScope,
) -> Result<LedgerOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut payment = queries::get_final_fee_payment(&tx, application_id)?
        .ok_or(AppError::ApplicationNotFound)?;

    let duplicate = match scope {
        IdempotencyScope::PaymentId => payment.has_payment(&event.payment_id),
        IdempotencyScope::PaymentIdAndEvent => payment.has_event(&event.payment_id, &event.event),
    };
    if duplicate {
        return Ok(LedgerOutcome::AlreadyProcessed);
    }

    if !queries::try_record_payment_event(&tx, application_id, &event.payment_id, &event.event)? {
        return Ok(LedgerOutcome::AlreadyProcessed);
    }

    let was_paid = payment.is_paid();
    apply_to_document(&mut payment, event);
    let became_paid = !was_paid && payment.is_paid();

    if !queries::write_final_fee_payment(&tx, application_id, &payment)? {
        return Err(AppError::UpdateFailed("application row vanished".into()));
    }
    tx.commit()?;

    tracing::info!(
        application_id,
        payment_id = %event.payment_id,
        event = %event.event,
        source = event.source.as_str(),
        status = ?payment.payment_status,
        "Applied payment event"
    );

    Ok(LedgerOutcome::Applied {
        status: payment.payment_status,
        became_paid,
        payment,
    })
}

/// Append the history entry and recompute status. The latest event wins.
fn apply_to_document(payment: &mut FinalFeePayment, event: &PaymentEvent) {
    let now = Utc::now();
    payment.payment_history.push(event.history_entry());

    if let Some(status) = PaymentStatus::from_event(&event.event) {
        payment.payment_status = Some(status);

        if status == PaymentStatus::Paid {
            payment.razorpay_payment_id = Some(event.payment_id.clone());
            if event.method.is_some() {
                payment.payment_method = event.method.clone();
            }
            payment.paid_at = Some(now);
            if payment.token.is_some() {
                payment.token_used = true;
            }
        }
    }

    if payment.razorpay_order_id.is_none() {
        payment.razorpay_order_id = event.order_id.clone();
    }
    payment.updated_at = Some(now);
}

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    APPLICATION_COLS, PAYMENT_ORDER_COLS, PaymentOrder, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

// ============ Applications ============

pub fn create_application(conn: &Connection, input: &CreateApplication) -> Result<Application> {
    let id = gen_id();
    let now = now();
    let fee_json = input
        .final_fee_payment
        .as_ref()
        .map(to_json)
        .transpose()?;

    conn.execute(
        "INSERT INTO applications (id, auth_uid, basic, contact, account, application_details, final_fee_payment, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            &id,
            &input.account.auth_id,
            to_json(&input.basic)?,
            to_json(&input.contact)?,
            to_json(&input.account)?,
            to_json(&input.application_details)?,
            fee_json,
            now,
        ],
    )?;

    Ok(Application {
        id,
        basic: input.basic.clone(),
        contact: input.contact.clone(),
        account: input.account.clone(),
        application_details: input.application_details.clone(),
        final_fee_payment: input.final_fee_payment.clone().unwrap_or_default(),
        created_at: now,
        updated_at: now,
    })
}

pub fn get_application_by_id(conn: &Connection, id: &str) -> Result<Option<Application>> {
    query_one(
        conn,
        &format!("SELECT {} FROM applications WHERE id = ?1", APPLICATION_COLS),
        &[&id],
    )
}

/// Look up an application by the Firebase uid stored in `account.auth_id`.
pub fn get_application_by_auth_uid(conn: &Connection, auth_uid: &str) -> Result<Option<Application>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM applications WHERE auth_uid = ?1 ORDER BY created_at DESC LIMIT 1",
            APPLICATION_COLS
        ),
        &[&auth_uid],
    )
}

/// Resolve a token's `userId`: an application id, or the applicant's auth uid.
pub fn find_application_for_user(conn: &Connection, user_id: &str) -> Result<Option<Application>> {
    match get_application_by_id(conn, user_id)? {
        Some(app) => Ok(Some(app)),
        None => get_application_by_auth_uid(conn, user_id),
    }
}

/// Find the application whose embedded legacy token matches.
pub fn find_application_by_legacy_token(conn: &Connection, token: &str) -> Result<Option<Application>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM applications
             WHERE json_valid(final_fee_payment)
               AND json_extract(final_fee_payment, '$.token') = ?1
             LIMIT 1",
            APPLICATION_COLS
        ),
        &[&token],
    )
}

/// Resolve the application that owns a gateway order.
///
/// Uses the `payment_orders` index, falling back to scanning the embedded
/// `razorpay_order_id` for rows written before the index existed.
pub fn find_application_by_order_id(conn: &Connection, order_id: &str) -> Result<Option<Application>> {
    if let Some(order) = get_payment_order(conn, order_id)? {
        return get_application_by_id(conn, &order.application_id);
    }

    query_one(
        conn,
        &format!(
            "SELECT {} FROM applications
             WHERE json_valid(final_fee_payment)
               AND json_extract(final_fee_payment, '$.razorpay_order_id') = ?1
             LIMIT 1",
            APPLICATION_COLS
        ),
        &[&order_id],
    )
}

/// Resolve the application that already recorded a gateway payment.
/// Used for refund events, which may arrive without an order id.
pub fn find_application_by_payment_id(conn: &Connection, payment_id: &str) -> Result<Option<Application>> {
    let application_id: Option<String> = conn
        .query_row(
            "SELECT application_id FROM payment_events WHERE payment_id = ?1 LIMIT 1",
            params![payment_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = application_id {
        return get_application_by_id(conn, &id);
    }

    query_one(
        conn,
        &format!(
            "SELECT {} FROM applications
             WHERE json_valid(final_fee_payment)
               AND json_extract(final_fee_payment, '$.razorpay_payment_id') = ?1
             LIMIT 1",
            APPLICATION_COLS
        ),
        &[&payment_id],
    )
}

// ============ final_fee_payment sub-document ============

/// Read the payment sub-document. Outer `None` = no such application.
pub fn get_final_fee_payment(conn: &Connection, application_id: &str) -> Result<Option<FinalFeePayment>> {
    let raw: Option<Option<String>> = conn
        .query_row(
            "SELECT final_fee_payment FROM applications WHERE id = ?1",
            params![application_id],
            |row| row.get(0),
        )
        .optional()?;

    match raw {
        None => Ok(None),
        Some(None) => Ok(Some(FinalFeePayment::default())),
        Some(Some(text)) if text.trim().is_empty() => Ok(Some(FinalFeePayment::default())),
        Some(Some(text)) => Ok(Some(serde_json::from_str(&text)?)),
    }
}

/// Replace the payment sub-document as one field update.
pub fn write_final_fee_payment(
    conn: &Connection,
    application_id: &str,
    payment: &FinalFeePayment,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE applications SET final_fee_payment = ?1, updated_at = ?2 WHERE id = ?3",
        params![to_json(payment)?, now(), application_id],
    )?;
    Ok(affected > 0)
}

// ============ Gateway orders ============

pub fn get_payment_order(conn: &Connection, order_id: &str) -> Result<Option<PaymentOrder>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_orders WHERE order_id = ?1",
            PAYMENT_ORDER_COLS
        ),
        &[&order_id],
    )
}

pub fn list_payment_orders(conn: &Connection, application_id: &str) -> Result<Vec<PaymentOrder>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_orders WHERE application_id = ?1 ORDER BY created_at",
            PAYMENT_ORDER_COLS
        ),
        &[&application_id],
    )
}

/// Attach a freshly created gateway order to an application.
///
/// The sub-document update and the `payment_orders` index row are written
/// in one transaction so webhook resolution never sees one without the other.
pub fn record_gateway_order(
    conn: &mut Connection,
    application_id: &str,
    order_id: &str,
    amount_minor: i64,
    currency: &str,
) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut payment = get_final_fee_payment(&tx, application_id)?
        .ok_or(AppError::ApplicationNotFound)?;

    let created_at_dt = Utc::now();
    let created_at = created_at_dt.timestamp();

    payment.razorpay_order_id = Some(order_id.to_string());
    payment.razorpay_order_created_at = Some(created_at_dt);
    payment.updated_at = Some(created_at_dt);
    if payment.payment_status.is_none() {
        payment.payment_status = Some(PaymentStatus::Pending);
    }

    write_final_fee_payment(&tx, application_id, &payment)?;

    tx.execute(
        "INSERT OR REPLACE INTO payment_orders (order_id, application_id, amount_minor, currency, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![order_id, application_id, amount_minor, currency, created_at],
    )?;

    tx.commit()?;
    Ok(())
}

// ============ Payment events ============

/// Claim an (application, payment, event) triple.
///
/// Returns `Ok(true)` if this call recorded it, `Ok(false)` if it was
/// already recorded.
pub fn try_record_payment_event(
    conn: &Connection,
    application_id: &str,
    payment_id: &str,
    event: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO payment_events (application_id, payment_id, event, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![application_id, payment_id, event, now()],
    )?;
    Ok(affected > 0)
}

pub fn count_payment_events(conn: &Connection, application_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM payment_events WHERE application_id = ?1",
        params![application_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

// ============ Invoices ============

/// Append an invoice entry to the sub-document.
pub fn append_invoice(
    conn: &mut Connection,
    application_id: &str,
    entry: &InvoiceEntry,
) -> Result<bool> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(mut payment) = get_final_fee_payment(&tx, application_id)? else {
        return Ok(false);
    };
    payment.invoice.push(entry.clone());
    payment.updated_at = Some(Utc::now());
    write_final_fee_payment(&tx, application_id, &payment)?;

    tx.commit()?;
    Ok(true)
}

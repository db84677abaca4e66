//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};
use serde::de::DeserializeOwned;

use crate::models::*;

/// Parse a JSON text column, converting parse errors to rusqlite errors
/// instead of panicking on a corrupted document.
fn parse_json<T: DeserializeOwned + Default>(row: &Row, col: usize) -> rusqlite::Result<T> {
    match row.get::<_, Option<String>>(col)? {
        None => Ok(T::default()),
        Some(text) if text.trim().is_empty() => Ok(T::default()),
        Some(text) => serde_json::from_str(&text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                col,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        }),
    }
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub const APPLICATION_COLS: &str = "id, basic, contact, account, application_details, final_fee_payment, created_at, updated_at";

pub const PAYMENT_ORDER_COLS: &str = "order_id, application_id, amount_minor, currency, created_at";

impl FromRow for Application {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Application {
            id: row.get(0)?,
            basic: parse_json(row, 1)?,
            contact: parse_json(row, 2)?,
            account: parse_json(row, 3)?,
            application_details: parse_json(row, 4)?,
            final_fee_payment: parse_json(row, 5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

/// Row of the `payment_orders` index.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOrder {
    pub order_id: String,
    pub application_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub created_at: i64,
}

impl FromRow for PaymentOrder {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentOrder {
            order_id: row.get(0)?,
            application_id: row.get(1)?,
            amount_minor: row.get(2)?,
            currency: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// This provides graceful error handling instead of panicking when the database
/// contains invalid enum values (from corruption, migration errors, etc.).
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
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

// ============ SQL SELECT Constants ============

pub const LEAD_COLS: &str = "id, name, email, phone, country_code, country_name, tags, funnel_step, intent_plan, payment_provider, payment_id, paid_at, shipping_to, shipping_label_url, shipping_tracking_number, shipping_carrier, shipping_servicelevel, shipping_status, created_at, updated_at";

pub const WEBHOOK_EVENT_COLS: &str = "id, provider, event_id, event_type, order_id, lead_id, payload, headers, status, processing_error, created_at, processed_at";

// ============ FromRow Implementations ============

impl FromRow for Lead {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let tags_str: String = row.get(6)?;
        let shipping_to: Option<String> = row.get(12)?;
        Ok(Lead {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            country_code: row.get(4)?,
            country_name: row.get(5)?,
            tags: serde_json::from_str(&tags_str).unwrap_or_default(),
            funnel_step: row.get(7)?,
            intent_plan: row.get(8)?,
            payment_provider: row.get(9)?,
            payment_id: row.get(10)?,
            paid_at: row.get(11)?,
            shipping_to: shipping_to.and_then(|s| serde_json::from_str(&s).ok()),
            shipping_label_url: row.get(13)?,
            shipping_tracking_number: row.get(14)?,
            shipping_carrier: row.get(15)?,
            shipping_servicelevel: row.get(16)?,
            shipping_status: parse_enum(row, 17, "shipping_status")?,
            created_at: row.get(18)?,
            updated_at: row.get(19)?,
        })
    }
}

impl FromRow for WebhookEvent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookEvent {
            id: row.get(0)?,
            provider: row.get(1)?,
            event_id: row.get(2)?,
            event_type: row.get(3)?,
            order_id: row.get(4)?,
            lead_id: row.get(5)?,
            payload: row.get(6)?,
            headers: row.get(7)?,
            status: parse_enum(row, 8, "status")?,
            processing_error: row.get(9)?,
            created_at: row.get(10)?,
            processed_at: row.get(11)?,
        })
    }
}

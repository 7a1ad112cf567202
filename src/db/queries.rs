use chrono::Utc;
use rusqlite::{params, types::Value, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{query_one, LEAD_COLS, WEBHOOK_EVENT_COLS};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builder for dynamic UPDATE statements with optional fields.
/// Combines multiple field updates into a single query.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    fn execute(mut self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            return Ok(false);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, sets.join(", "));
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }
}

// ============ Leads ============

pub fn create_lead(conn: &Connection, input: &CreateLead) -> Result<Lead> {
    let id = gen_id();
    let now = now();
    let email = input.email.trim().to_lowercase();

    conn.execute(
        "INSERT INTO leads (id, name, email, phone, country_code, country_name, tags, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, '[]', ?7, ?8)",
        params![
            &id,
            &input.name,
            &email,
            &input.phone,
            &input.country_code,
            &input.country_name,
            now,
            now
        ],
    )?;

    Ok(Lead {
        id,
        name: input.name.clone(),
        email,
        phone: input.phone.clone(),
        country_code: input.country_code.clone(),
        country_name: input.country_name.clone(),
        tags: vec![],
        funnel_step: None,
        intent_plan: None,
        payment_provider: None,
        payment_id: None,
        paid_at: None,
        shipping_to: None,
        shipping_label_url: None,
        shipping_tracking_number: None,
        shipping_carrier: None,
        shipping_servicelevel: None,
        shipping_status: ShippingStatus::None,
        created_at: now,
        updated_at: now,
    })
}

pub fn get_lead_by_id(conn: &Connection, id: &str) -> Result<Option<Lead>> {
    query_one(
        conn,
        &format!("SELECT {} FROM leads WHERE id = ?1", LEAD_COLS),
        &[&id],
    )
}

/// Merge tags into a lead's tag set (normalized, deduped, capped).
/// Returns the updated lead, or None if the lead does not exist.
pub fn add_lead_tags(conn: &Connection, id: &str, tags: &[&str]) -> Result<Option<Lead>> {
    let Some(lead) = get_lead_by_id(conn, id)? else {
        return Ok(None);
    };
    let merged = merge_tags(&lead.tags, tags);
    if merged == lead.tags {
        return Ok(Some(lead));
    }
    let tags_json = serde_json::to_string(&merged)?;
    UpdateBuilder::new("leads", id)
        .with_updated_at()
        .set("tags", tags_json)
        .execute(conn)?;
    get_lead_by_id(conn, id)
}

/// Mark a lead paid: records the provider/order idempotency pair, stamps
/// `paid_at`, and advances the funnel step.
pub fn mark_lead_paid(
    conn: &Connection,
    id: &str,
    provider: &str,
    order_id: &str,
    intent_plan: Option<&str>,
) -> Result<bool> {
    UpdateBuilder::new("leads", id)
        .with_updated_at()
        .set("payment_provider", provider.to_string())
        .set("payment_id", order_id.to_string())
        .set("paid_at", now())
        .set("funnel_step", "paid".to_string())
        .set_opt("intent_plan", intent_plan.map(str::to_string))
        .execute(conn)
}

/// Persist a purchased shipping label and the address it was sent to.
pub fn set_lead_shipping_label(conn: &Connection, id: &str, label: &ShippingLabel) -> Result<bool> {
    let to_json = serde_json::to_string(&label.to_address)?;
    UpdateBuilder::new("leads", id)
        .with_updated_at()
        .set("shipping_to", to_json)
        .set_opt("shipping_label_url", label.label_url.clone())
        .set_opt("shipping_tracking_number", label.tracking_number.clone())
        .set_opt("shipping_carrier", label.carrier.clone())
        .set_opt("shipping_servicelevel", label.servicelevel.clone())
        .set("shipping_status", ShippingStatus::LabelCreated.as_str().to_string())
        .execute(conn)
}

pub fn set_lead_shipping_status(
    conn: &Connection,
    id: &str,
    status: ShippingStatus,
) -> Result<bool> {
    UpdateBuilder::new("leads", id)
        .with_updated_at()
        .set("shipping_status", status.as_str().to_string())
        .execute(conn)
}

// ============ Webhook event ledger ============

/// Record a webhook delivery in the ledger.
///
/// Returns the new row id, or `None` if this (provider, event_id) pair was
/// already recorded. Duplicate detection relies solely on the UNIQUE
/// constraint: `INSERT OR IGNORE` affecting zero rows means replay.
pub fn record_webhook_event(
    conn: &Connection,
    input: &RecordWebhookEvent<'_>,
) -> Result<Option<String>> {
    let id = gen_id();
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events
            (id, provider, event_id, event_type, payload, headers, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'received', ?7)",
        params![
            &id,
            input.provider,
            input.event_id,
            input.event_type,
            input.payload,
            input.headers,
            now()
        ],
    )?;

    if affected == 0 {
        return Ok(None);
    }
    Ok(Some(id))
}

/// Move a ledger row out of `received` to its terminal status.
/// Every handler exit path must call this exactly once.
pub fn finish_webhook_event(
    conn: &Connection,
    id: &str,
    status: EventStatus,
    error: Option<&str>,
    order_id: Option<&str>,
    lead_id: Option<&str>,
) -> Result<bool> {
    UpdateBuilder::new("webhook_events", id)
        .set("status", status.as_str().to_string())
        .set("processed_at", now())
        .set_opt("processing_error", error.map(str::to_string))
        .set_opt("order_id", order_id.map(str::to_string))
        .set_opt("lead_id", lead_id.map(str::to_string))
        .execute(conn)
}

pub fn get_webhook_event(
    conn: &Connection,
    provider: &str,
    event_id: &str,
) -> Result<Option<WebhookEvent>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM webhook_events WHERE provider = ?1 AND event_id = ?2",
            WEBHOOK_EVENT_COLS
        ),
        &[&provider, &event_id],
    )
}

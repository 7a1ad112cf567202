//! PayPal payment webhook handler.
//!
//! The flow is webhook-driven, not redirect-driven: the browser redirect is
//! cosmetic and capture happens here, on `CHECKOUT.ORDER.APPROVED`. Every
//! delivery is recorded in the webhook event ledger before any processing;
//! duplicate deliveries are acknowledged without reprocessing.
//!
//! Fulfillment idempotency is keyed on the lead's (paid_at, provider,
//! order id) triple rather than the ledger, because PayPal sends separate
//! events (approval, capture) for one order under different event ids.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{json, Value};

use crate::catalog::{self, Product};
use crate::db::{queries, AppState};
use crate::models::{EventStatus, Lead, RecordWebhookEvent, ShippingLabel, ShippingStatus};
use crate::payments::paypal::{extract_order_id, PayPalOrder, SignatureHeaders};
use crate::sync::{spawn_lead_sync, LeadSyncEvent};

const PROVIDER: &str = "paypal";

/// Event types that drive fulfillment. Everything else is acknowledged
/// and recorded as ignored.
const HANDLED_EVENTS: &[&str] = &[
    "CHECKOUT.ORDER.APPROVED",
    "CHECKOUT.ORDER.COMPLETED",
    "PAYMENT.CAPTURE.COMPLETED",
];

/// Terminal disposition of one webhook delivery: the ledger status to
/// record and the HTTP response to send.
struct ProcessOutcome {
    ledger: EventStatus,
    http: StatusCode,
    body: Value,
    error: Option<String>,
    order_id: Option<String>,
    lead_id: Option<String>,
}

impl ProcessOutcome {
    fn failed(http: StatusCode, error: String) -> Self {
        Self {
            ledger: EventStatus::Failed,
            http,
            body: json!({ "ok": false, "error": &error }),
            error: Some(error),
            order_id: None,
            lead_id: None,
        }
    }

    fn ignored(reason: &str) -> Self {
        Self {
            ledger: EventStatus::Ignored,
            http: StatusCode::OK,
            body: json!({ "ok": true, "ignored": true, "reason": reason }),
            error: Some(reason.to_string()),
            order_id: None,
            lead_id: None,
        }
    }

    /// A qualifying event we deliberately did not capture (shipping guard).
    fn not_captured(code: &str, ledger: EventStatus) -> Self {
        Self {
            ledger,
            http: StatusCode::OK,
            body: json!({ "ok": true, "captured": false, "code": code }),
            error: Some(code.to_string()),
            order_id: None,
            lead_id: None,
        }
    }

    fn processed(order_id: &str, lead_id: &str) -> Self {
        Self {
            ledger: EventStatus::Processed,
            http: StatusCode::OK,
            body: json!({
                "ok": true,
                "processed": true,
                "leadId": lead_id,
                "orderId": order_id,
            }),
            error: None,
            order_id: None,
            lead_id: Some(lead_id.to_string()),
        }
    }

    fn with_lead(mut self, lead_id: &str) -> Self {
        self.lead_id = Some(lead_id.to_string());
        self
    }
}

/// Headers worth keeping on the ledger row: the PayPal transmission set
/// plus the delivery user agent.
fn selected_headers_json(headers: &HeaderMap) -> String {
    let mut map = serde_json::Map::new();
    for (name, value) in headers {
        let name_str = name.as_str();
        if name_str.starts_with("paypal-") || name_str == "user-agent" {
            if let Ok(v) = value.to_str() {
                map.insert(name_str.to_string(), Value::String(v.to_string()));
            }
        }
    }
    Value::Object(map).to_string()
}

pub async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("invalid JSON: {}", e));
        }
    };

    let (event_id, event_type) = match (
        event.get("id").and_then(|v| v.as_str()),
        event.get("event_type").and_then(|v| v.as_str()),
    ) {
        (Some(id), Some(ty)) => (id.to_string(), ty.to_string()),
        _ => {
            return error_response(StatusCode::BAD_REQUEST, "missing event id or event_type");
        }
    };

    // Record the delivery before doing anything else. A duplicate insert
    // is the replay signal; acknowledge and stop.
    let payload = String::from_utf8_lossy(&body).into_owned();
    let headers_json = selected_headers_json(&headers);
    let row_id = {
        let conn = match state.db.get() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("DB connection error: {}", e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "database error");
            }
        };
        match queries::record_webhook_event(
            &conn,
            &RecordWebhookEvent {
                provider: PROVIDER,
                event_id: &event_id,
                event_type: Some(&event_type),
                payload: &payload,
                headers: Some(&headers_json),
            },
        ) {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::debug!("Duplicate webhook delivery: {} {}", PROVIDER, event_id);
                return (
                    StatusCode::OK,
                    axum::Json(json!({ "ok": true, "duplicate": true })),
                )
                    .into_response();
            }
            Err(e) => {
                tracing::error!("Failed to record webhook event: {}", e);
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, "database error");
            }
        }
    };

    let outcome = process_event(&state, &headers, &event, &event_type).await;

    // Every path out of processing lands here, so no row stays 'received'.
    match state.db.get() {
        Ok(conn) => {
            if let Err(e) = queries::finish_webhook_event(
                &conn,
                &row_id,
                outcome.ledger,
                outcome.error.as_deref(),
                outcome.order_id.as_deref(),
                outcome.lead_id.as_deref(),
            ) {
                tracing::error!("Failed to finish webhook event {}: {}", row_id, e);
            }
        }
        Err(e) => {
            tracing::error!("DB connection error finishing webhook event: {}", e);
        }
    }

    (outcome.http, axum::Json(outcome.body)).into_response()
}

fn error_response(status: StatusCode, error: &str) -> Response {
    (status, axum::Json(json!({ "ok": false, "error": error }))).into_response()
}

async fn process_event(
    state: &AppState,
    headers: &HeaderMap,
    event: &Value,
    event_type: &str,
) -> ProcessOutcome {
    // Authentication runs before any business-logic branch and fails
    // closed: no headers, no verification call, no processing.
    let Some(sig) = SignatureHeaders::from_headers(headers) else {
        return ProcessOutcome::failed(
            StatusCode::UNAUTHORIZED,
            "missing signature headers".to_string(),
        );
    };

    let token = match state.paypal.access_token().await {
        Ok(t) => t,
        Err(e) => {
            return ProcessOutcome::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    match state
        .paypal
        .verify_webhook_signature(&token, &sig, event)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return ProcessOutcome::failed(
                StatusCode::UNAUTHORIZED,
                "signature verification failed".to_string(),
            );
        }
        Err(e) => {
            return ProcessOutcome::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    }

    if !HANDLED_EVENTS.contains(&event_type) {
        return ProcessOutcome::ignored("event type not handled");
    }

    let resource = event.get("resource").cloned().unwrap_or(Value::Null);
    let Some(order_id) = extract_order_id(event_type, &resource) else {
        return ProcessOutcome::ignored("no order id in event");
    };

    let mut outcome = process_order(state, &token, &order_id, event_type).await;
    outcome.order_id = Some(order_id);
    outcome
}

async fn process_order(
    state: &AppState,
    token: &str,
    order_id: &str,
    event_type: &str,
) -> ProcessOutcome {
    let order = match state.paypal.get_order(token, order_id).await {
        Ok(o) => o,
        Err(e) => {
            return ProcessOutcome::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    };

    let product = order.product_key().and_then(catalog::get_product);
    let requires_shipping = product.map(|p| p.requires_shipping).unwrap_or(false);

    // An order without a valid lead reference is unattributable, not an
    // attack: acknowledge so the provider stops redelivering.
    let Some(lead_id) = order.lead_id().map(str::to_string) else {
        return ProcessOutcome::ignored("order has no lead reference");
    };

    let lead = {
        let conn = match state.db.get() {
            Ok(c) => c,
            Err(e) => {
                return ProcessOutcome::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        };
        match queries::get_lead_by_id(&conn, &lead_id) {
            Ok(Some(l)) => l,
            Ok(None) => {
                return ProcessOutcome::failed(
                    StatusCode::NOT_FOUND,
                    format!("lead {} not found", lead_id),
                )
                .with_lead(&lead_id);
            }
            Err(e) => {
                return ProcessOutcome::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        }
    };

    let mut completed = order.is_completed();
    if !completed {
        // Only the approval event may initiate capture. Any other event for
        // a not-yet-completed order waits for a later delivery.
        if event_type != "CHECKOUT.ORDER.APPROVED" {
            return ProcessOutcome::ignored("order not completed").with_lead(&lead_id);
        }

        // Do not charge someone we cannot ship to: the shipping guard runs
        // before the money moves, while the order is still capturable.
        if requires_shipping {
            if let Some(outcome) = shipping_precheck(state, &lead, &order, product) {
                return outcome;
            }
        }

        completed = match state.paypal.capture_order(token, order_id).await {
            Ok(captured) => captured.is_completed(),
            Err(e) => {
                // A concurrent delivery may have captured first. Re-fetch
                // once and trust the live status.
                tracing::warn!("Capture failed for order {}: {}; re-checking", order_id, e);
                match state.paypal.get_order(token, order_id).await {
                    Ok(refetched) => refetched.is_completed(),
                    Err(e2) => {
                        return ProcessOutcome::failed(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            e2.to_string(),
                        )
                        .with_lead(&lead_id);
                    }
                }
            }
        };

        if !completed {
            return ProcessOutcome::ignored("order not completed").with_lead(&lead_id);
        }
    }

    // First completion only. Later deliveries for the same order skip the
    // paid mutation but still run the shipping guard below.
    if !lead.already_marked_paid(PROVIDER, order_id) {
        let conn = match state.db.get() {
            Ok(c) => c,
            Err(e) => {
                return ProcessOutcome::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        };
        if let Err(e) = queries::mark_lead_paid(
            &conn,
            &lead_id,
            PROVIDER,
            order_id,
            product.map(|p| p.key),
        ) {
            return ProcessOutcome::failed(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                .with_lead(&lead_id);
        }
        if let Err(e) = queries::add_lead_tags(&conn, &lead_id, &["paid_paypal", "paypal_webhook"]) {
            tracing::warn!("Failed to tag paid lead {}: {}", lead_id, e);
        }
        drop(conn);

        tracing::info!("Lead {} marked paid for order {}", lead_id, order_id);

        // Best-effort CRM sync; a dead CRM never rolls back a payment.
        spawn_lead_sync(
            state.http_client.clone(),
            state.sync_webhook_url.clone(),
            LeadSyncEvent {
                lead_id: lead_id.clone(),
                reason: "paid".to_string(),
                timestamp: chrono::Utc::now().timestamp(),
            },
        );
    }

    if requires_shipping {
        if let Some(product) = product {
            ensure_shipping_label(state, &lead_id, &order, product).await;
        }
    }

    ProcessOutcome::processed(order_id, &lead_id)
}

/// Pre-capture shipping guard. Returns an outcome when capture must not
/// proceed, None when it may.
fn shipping_precheck(
    state: &AppState,
    lead: &Lead,
    order: &PayPalOrder,
    product: Option<&'static Product>,
) -> Option<ProcessOutcome> {
    let allowed = product.map(|p| p.allowed_countries).unwrap_or(&[]);
    match order.shipping_country() {
        None => Some(
            ProcessOutcome::not_captured("SHIPPING_ADDRESS_REQUIRED", EventStatus::Ignored)
                .with_lead(&lead.id),
        ),
        Some(country) if !allowed.contains(&country.as_str()) => {
            mark_shipping_not_allowed(state, &lead.id, &country);
            Some(
                ProcessOutcome::not_captured(
                    "SHIPPING_COUNTRY_NOT_ALLOWED",
                    EventStatus::Processed,
                )
                .with_lead(&lead.id),
            )
        }
        Some(_) => None,
    }
}

fn mark_shipping_not_allowed(state: &AppState, lead_id: &str, country: &str) {
    tracing::info!("Lead {} shipping destination {} not allowed", lead_id, country);
    match state.db.get() {
        Ok(conn) => {
            if let Err(e) = queries::add_lead_tags(&conn, lead_id, &["shipping_not_allowed"]) {
                tracing::warn!("Failed to tag lead {}: {}", lead_id, e);
            }
            if let Err(e) =
                queries::set_lead_shipping_status(&conn, lead_id, ShippingStatus::NotAllowed)
            {
                tracing::warn!("Failed to set shipping status for {}: {}", lead_id, e);
            }
        }
        Err(e) => tracing::warn!("DB connection error: {}", e),
    }
}

/// One-time label creation for physical products.
///
/// Never fails the webhook: the payment already succeeded, so every error
/// degrades to the `needs_shipping` tag for manual follow-up.
async fn ensure_shipping_label(
    state: &AppState,
    lead_id: &str,
    order: &PayPalOrder,
    product: &'static Product,
) {
    // Re-read the lead: the paid mutation above changed it, and a
    // concurrent delivery may have shipped already.
    let lead = {
        let conn = match state.db.get() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("DB connection error before label creation: {}", e);
                return;
            }
        };
        match queries::get_lead_by_id(&conn, lead_id) {
            Ok(Some(l)) => l,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!("Failed to re-read lead {}: {}", lead_id, e);
                return;
            }
        }
    };

    if lead.has_shipping_label() {
        tracing::debug!("Lead {} already has a shipping label, skipping", lead_id);
        return;
    }

    match order.shipping_country() {
        Some(country) if product.allowed_countries.contains(&country.as_str()) => {}
        Some(country) => {
            mark_shipping_not_allowed(state, lead_id, &country);
            return;
        }
        None => {
            tracing::warn!("Completed order {} has no shipping address", order.id);
            mark_needs_shipping(state, lead_id);
            return;
        }
    }

    let Some(to_address) = shipping_address_json(&lead, order) else {
        tracing::warn!("Could not build shipping address for lead {}", lead_id);
        mark_needs_shipping(state, lead_id);
        return;
    };

    match state.shippo.create_label(&to_address).await {
        Ok(purchased) => {
            let label = ShippingLabel {
                label_url: purchased.label_url,
                tracking_number: purchased.tracking_number,
                carrier: purchased.carrier,
                servicelevel: purchased.servicelevel,
                to_address,
            };
            match state.db.get() {
                Ok(conn) => {
                    if let Err(e) = queries::set_lead_shipping_label(&conn, lead_id, &label) {
                        // The label was purchased but not recorded; flag the
                        // lead so someone recovers it from the Shippo account.
                        tracing::error!("Failed to persist label for lead {}: {}", lead_id, e);
                        drop(conn);
                        mark_needs_shipping(state, lead_id);
                        return;
                    }
                    if let Err(e) = queries::add_lead_tags(
                        &conn,
                        lead_id,
                        &["shippo_label_created", "shippo_label"],
                    ) {
                        tracing::warn!("Failed to tag shipped lead {}: {}", lead_id, e);
                    }
                }
                Err(e) => {
                    tracing::error!("DB connection error persisting label: {}", e);
                    mark_needs_shipping(state, lead_id);
                    return;
                }
            }
            tracing::info!(
                "Shipping label created for lead {}: tracking={:?}",
                lead_id,
                label.tracking_number
            );
            spawn_lead_sync(
                state.http_client.clone(),
                state.sync_webhook_url.clone(),
                LeadSyncEvent {
                    lead_id: lead_id.to_string(),
                    reason: "shipping".to_string(),
                    timestamp: chrono::Utc::now().timestamp(),
                },
            );
        }
        Err(e) => {
            tracing::warn!("Label creation failed for lead {}: {}", lead_id, e);
            mark_needs_shipping(state, lead_id);
        }
    }
}

fn mark_needs_shipping(state: &AppState, lead_id: &str) {
    match state.db.get() {
        Ok(conn) => {
            if let Err(e) = queries::add_lead_tags(&conn, lead_id, &["needs_shipping"]) {
                tracing::warn!("Failed to tag lead {}: {}", lead_id, e);
            }
            if let Err(e) =
                queries::set_lead_shipping_status(&conn, lead_id, ShippingStatus::NeedsAttention)
            {
                tracing::warn!("Failed to set shipping status for {}: {}", lead_id, e);
            }
        }
        Err(e) => tracing::warn!("DB connection error: {}", e),
    }
}

/// Destination address for the shipping provider, built from the order's
/// shipping block with lead contact details as fallback.
fn shipping_address_json(lead: &Lead, order: &PayPalOrder) -> Option<Value> {
    let shipping = order.shipping()?;
    let address = shipping.address.as_ref()?;
    let name = shipping
        .name
        .as_ref()
        .and_then(|n| n.full_name.clone())
        .unwrap_or_else(|| lead.name.clone());
    Some(json!({
        "name": name,
        "street1": address.address_line_1,
        "street2": address.address_line_2,
        "city": address.admin_area_2,
        "state": address.admin_area_1,
        "zip": address.postal_code,
        "country": address.country_code,
        "phone": lead.phone,
        "email": lead.email,
    }))
}

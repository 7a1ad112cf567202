//! Checkout session creation for PayPal and Stripe.
//!
//! Both providers return a nullable redirect URL: a null URL is a soft
//! failure the frontend resolves by trying the other provider, so session
//! creation never fakes a URL and never retries server-side.

use axum::routing::post;
use axum::{extract::State, Router};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::catalog::{self, format_amount, Product};
use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::models::Lead;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout/paypal", post(paypal_checkout))
        .route("/checkout/stripe", post(stripe_checkout))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayPalCheckoutRequest {
    pub action: String,
    pub lead_id: String,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StripeCheckoutRequest {
    pub lead_id: String,
    pub product: String,
}

fn resolve_product(key: &str) -> Result<&'static Product> {
    catalog::get_product(key).ok_or_else(|| AppError::InvalidProduct(key.to_string()))
}

fn resolve_lead(conn: &Connection, lead_id: &str) -> Result<Lead> {
    if Uuid::parse_str(lead_id).is_err() {
        return Err(AppError::BadRequest("invalid lead id".to_string()));
    }
    queries::get_lead_by_id(conn, lead_id)?
        .ok_or_else(|| AppError::LeadNotFound(lead_id.to_string()))
}

/// Tag the lead without letting a tag failure break checkout.
fn tag_lead_best_effort(conn: &Connection, lead_id: &str, tags: &[&str]) {
    if let Err(e) = queries::add_lead_tags(conn, lead_id, tags) {
        tracing::warn!("Failed to tag lead {}: {}", lead_id, e);
    }
}

pub async fn paypal_checkout(
    State(state): State<AppState>,
    Json(req): Json<PayPalCheckoutRequest>,
) -> Result<Json<Value>> {
    match req.action.as_str() {
        "create" => paypal_create(&state, &req).await,
        "capture" => paypal_capture(&state, &req).await,
        other => Err(AppError::BadRequest(format!("unknown action: {}", other))),
    }
}

async fn paypal_create(state: &AppState, req: &PayPalCheckoutRequest) -> Result<Json<Value>> {
    let product_key = req
        .product
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("product is required".to_string()))?;
    let product = resolve_product(product_key)?;

    let lead = {
        let conn = state.db.get()?;
        resolve_lead(&conn, &req.lead_id)?
    };

    let amount_cents = catalog::product_amount_cents(product);
    let shipping_preference = if product.requires_shipping {
        "GET_FROM_FILE"
    } else {
        "NO_SHIPPING"
    };

    let body = json!({
        "intent": "CAPTURE",
        "purchase_units": [{
            "reference_id": product.key,
            "custom_id": lead.id,
            "description": product.name,
            "amount": {
                "currency_code": product.currency,
                "value": format_amount(amount_cents),
            },
        }],
        "application_context": {
            "shipping_preference": shipping_preference,
            "user_action": "PAY_NOW",
            "return_url": format!("{}{}", state.site_url, product.success_path),
            "cancel_url": format!("{}{}", state.site_url, product.cancel_path),
        },
    });

    let token = state.paypal.access_token().await?;
    let order = state.paypal.create_order(&token, &body).await?;
    let approve_url = order.approve_url().map(|s| s.to_string());

    if approve_url.is_none() {
        tracing::warn!("PayPal order {} has no approve link", order.id);
    }

    {
        let conn = state.db.get()?;
        tag_lead_best_effort(&conn, &lead.id, &["paypal_checkout"]);
    }

    tracing::info!(
        "PayPal order created: order={}, lead={}, product={}",
        order.id,
        lead.id,
        product.key
    );

    Ok(Json(json!({
        "ok": true,
        "orderId": order.id,
        "approveUrl": approve_url,
    })))
}

async fn paypal_capture(state: &AppState, req: &PayPalCheckoutRequest) -> Result<Json<Value>> {
    let order_id = req
        .order_id
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("orderId is required".to_string()))?;

    let token = state.paypal.access_token().await?;
    let order = state.paypal.get_order(&token, order_id).await?;

    // The lead embedded at creation time must match the caller's claim,
    // otherwise anyone with an order id could mark a foreign lead paid.
    if order.lead_id() != Some(req.lead_id.as_str()) {
        return Err(AppError::LeadMismatch);
    }

    let captured = if order.is_completed() {
        order
    } else {
        state.paypal.capture_order(&token, order_id).await?
    };

    let completed = captured.is_completed();
    if completed {
        let conn = state.db.get()?;
        tag_lead_best_effort(&conn, &req.lead_id, &["paid_paypal"]);
    }

    Ok(Json(json!({
        "ok": true,
        "status": captured.status,
        "completed": completed,
    })))
}

pub async fn stripe_checkout(
    State(state): State<AppState>,
    Json(req): Json<StripeCheckoutRequest>,
) -> Result<Json<Value>> {
    let product = resolve_product(&req.product)?;

    let lead = {
        let conn = state.db.get()?;
        resolve_lead(&conn, &req.lead_id)?
    };

    let amount_cents = catalog::product_amount_cents(product);
    let (session_id, url) = state
        .stripe
        .create_checkout_session(&lead, product, amount_cents, &state.site_url)
        .await?;

    if url.is_none() {
        tracing::warn!("Stripe session {} has no hosted URL", session_id);
    }

    {
        let conn = state.db.get()?;
        tag_lead_best_effort(&conn, &lead.id, &["stripe_checkout"]);
    }

    tracing::info!(
        "Stripe session created: session={}, lead={}, product={}",
        session_id,
        lead.id,
        product.key
    );

    Ok(Json(json!({
        "ok": true,
        "sessionId": session_id,
        "url": url,
    })))
}

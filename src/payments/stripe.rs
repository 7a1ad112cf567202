//! Stripe Checkout Sessions client.
//!
//! Sessions are created with ad-hoc `price_data` so the catalog stays the
//! single source of truth for prices; nothing is pre-configured in the
//! Stripe dashboard.

use reqwest::Client;
use serde::Deserialize;

use crate::catalog::{format_amount, CheckoutMode, Product};
use crate::error::{AppError, Result};
use crate::models::Lead;

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    /// Absent when Stripe cannot produce a hosted page for this session.
    /// Surfaced as a null URL so the caller can fall back to PayPal.
    url: Option<String>,
}

impl StripeClient {
    pub fn new(client: Client, base_url: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Create a checkout session for a lead and catalog product.
    ///
    /// Returns the session id and the hosted checkout URL (nullable).
    pub async fn create_checkout_session(
        &self,
        lead: &Lead,
        product: &Product,
        amount_cents: i64,
        site_url: &str,
    ) -> Result<(String, Option<String>)> {
        let success_url = format!("{}{}?session_id={{CHECKOUT_SESSION_ID}}", site_url, product.success_path);
        let cancel_url = format!("{}{}", site_url, product.cancel_path);

        let mode = match product.mode {
            CheckoutMode::Payment => "payment",
            CheckoutMode::Subscription => "subscription",
        };

        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), mode.into()),
            ("success_url".into(), success_url),
            ("cancel_url".into(), cancel_url),
            ("client_reference_id".into(), lead.id.clone()),
            ("customer_email".into(), lead.email.clone()),
            ("metadata[lead_id]".into(), lead.id.clone()),
            ("metadata[product]".into(), product.key.into()),
            ("line_items[0][quantity]".into(), "1".into()),
            (
                "line_items[0][price_data][currency]".into(),
                product.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                product.name.into(),
            ),
        ];

        if let Some(interval) = product.recurring_interval {
            form.push((
                "line_items[0][price_data][recurring][interval]".into(),
                interval.into(),
            ));
        }

        if product.requires_shipping {
            for (i, country) in product.allowed_countries.iter().enumerate() {
                form.push((
                    format!("shipping_address_collection[allowed_countries][{}]", i),
                    (*country).into(),
                ));
            }
            // Free shipping option so the total matches the catalog price
            form.push((
                "shipping_options[0][shipping_rate_data][type]".into(),
                "fixed_amount".into(),
            ));
            form.push((
                "shipping_options[0][shipping_rate_data][fixed_amount][amount]".into(),
                "0".into(),
            ));
            form.push((
                "shipping_options[0][shipping_rate_data][fixed_amount][currency]".into(),
                product.currency.to_lowercase(),
            ));
            form.push((
                "shipping_options[0][shipping_rate_data][display_name]".into(),
                "Free shipping".into(),
            ));
        }

        tracing::debug!(
            "Creating Stripe session: lead={}, product={}, amount={}",
            lead.id,
            product.key,
            format_amount(amount_cents)
        );

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.base_url))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!("Stripe API error: {}", error_text)));
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Stripe response: {}", e)))?;

        Ok((session.id, session.url))
    }
}

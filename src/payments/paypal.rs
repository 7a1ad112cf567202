//! PayPal Orders API client and webhook signature verification.
//!
//! Signature verification is delegated to PayPal's
//! `/v1/notifications/verify-webhook-signature` endpoint. The five
//! `paypal-*` transmission headers are required; any missing header
//! fails closed before the verify call is made.

use axum::http::HeaderMap;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone)]
pub struct PayPalClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
    webhook_id: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct VerifySignatureResponse {
    verification_status: String,
}

/// A PayPal order as returned by create/get/capture calls.
///
/// `reference_id` carries the product key and `custom_id` the lead id;
/// both are set at order creation and read back at webhook time.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalOrder {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnit>,
    #[serde(default)]
    pub links: Vec<OrderLink>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseUnit {
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub shipping: Option<OrderShipping>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderShipping {
    #[serde(default)]
    pub name: Option<ShippingName>,
    #[serde(default)]
    pub address: Option<PostalAddress>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippingName {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostalAddress {
    #[serde(default)]
    pub address_line_1: Option<String>,
    #[serde(default)]
    pub address_line_2: Option<String>,
    /// City.
    #[serde(default)]
    pub admin_area_2: Option<String>,
    /// State/province.
    #[serde(default)]
    pub admin_area_1: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderLink {
    pub rel: String,
    pub href: String,
}

impl PayPalOrder {
    pub fn is_completed(&self) -> bool {
        self.status.as_deref() == Some("COMPLETED")
    }

    /// Product key stashed in `reference_id` at order creation.
    pub fn product_key(&self) -> Option<&str> {
        self.purchase_units
            .first()
            .and_then(|u| u.reference_id.as_deref())
    }

    /// Lead id stashed in `custom_id` at order creation.
    /// Malformed values are treated as absent - an order without a valid
    /// lead reference is unattributable, not an error.
    pub fn lead_id(&self) -> Option<&str> {
        self.purchase_units
            .first()
            .and_then(|u| u.custom_id.as_deref())
            .filter(|id| Uuid::parse_str(id).is_ok())
    }

    pub fn shipping(&self) -> Option<&OrderShipping> {
        self.purchase_units.first().and_then(|u| u.shipping.as_ref())
    }

    /// Destination country code, trimmed and uppercased so it compares
    /// cleanly against catalog country lists.
    pub fn shipping_country(&self) -> Option<String> {
        self.shipping()
            .and_then(|s| s.address.as_ref())
            .and_then(|a| a.country_code.as_deref())
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
    }

    /// The buyer-approval URL from the HATEOAS links.
    pub fn approve_url(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.as_str())
    }
}

/// The five transmission headers PayPal signs every webhook delivery with.
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    pub transmission_id: String,
    pub transmission_time: String,
    pub transmission_sig: String,
    pub cert_url: String,
    pub auth_algo: String,
}

impl SignatureHeaders {
    /// Extract all five headers, or `None` if any is absent.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        Some(Self {
            transmission_id: get("paypal-transmission-id")?,
            transmission_time: get("paypal-transmission-time")?,
            transmission_sig: get("paypal-transmission-sig")?,
            cert_url: get("paypal-cert-url")?,
            auth_algo: get("paypal-auth-algo")?,
        })
    }
}

/// Extract the PayPal order id from a webhook event's resource.
///
/// `CHECKOUT.ORDER.*` events carry it as the resource id; capture events
/// reference it through `supplementary_data.related_ids.order_id`.
pub fn extract_order_id(event_type: &str, resource: &Value) -> Option<String> {
    if event_type.starts_with("CHECKOUT.ORDER.") {
        return resource
            .get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
    }
    resource
        .pointer("/supplementary_data/related_ids/order_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

impl PayPalClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        webhook_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            webhook_id: webhook_id.into(),
        }
    }

    /// Fetch a client-credentials access token.
    pub async fn access_token(&self) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("PayPal token request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "PayPal token request failed: {}",
                error_text
            )));
        }

        let token: AccessTokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse PayPal token: {}", e)))?;
        Ok(token.access_token)
    }

    pub async fn create_order(&self, token: &str, body: &Value) -> Result<PayPalOrder> {
        self.order_request(
            token,
            self.client
                .post(format!("{}/v2/checkout/orders", self.base_url))
                .json(body),
            "create order",
        )
        .await
    }

    pub async fn get_order(&self, token: &str, order_id: &str) -> Result<PayPalOrder> {
        self.order_request(
            token,
            self.client
                .get(format!("{}/v2/checkout/orders/{}", self.base_url, order_id)),
            "get order",
        )
        .await
    }

    pub async fn capture_order(&self, token: &str, order_id: &str) -> Result<PayPalOrder> {
        self.order_request(
            token,
            self.client
                .post(format!(
                    "{}/v2/checkout/orders/{}/capture",
                    self.base_url, order_id
                ))
                .json(&json!({})),
            "capture order",
        )
        .await
    }

    async fn order_request(
        &self,
        token: &str,
        request: reqwest::RequestBuilder,
        action: &str,
    ) -> Result<PayPalOrder> {
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("PayPal {} failed: {}", action, e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "PayPal {} failed: {}",
                action, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse PayPal order: {}", e)))
    }

    /// Verify a webhook delivery against the configured webhook id.
    ///
    /// Only an explicit `verification_status` of "SUCCESS" passes;
    /// everything else, including transport errors, fails closed.
    pub async fn verify_webhook_signature(
        &self,
        token: &str,
        sig: &SignatureHeaders,
        webhook_event: &Value,
    ) -> Result<bool> {
        let body = json!({
            "auth_algo": sig.auth_algo,
            "cert_url": sig.cert_url,
            "transmission_id": sig.transmission_id,
            "transmission_sig": sig.transmission_sig,
            "transmission_time": sig.transmission_time,
            "webhook_id": self.webhook_id,
            "webhook_event": webhook_event,
        });

        let response = self
            .client
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.base_url
            ))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("PayPal verify call failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!("PayPal verify call returned error: {}", error_text);
            return Ok(false);
        }

        let verify: VerifySignatureResponse = response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse verify response: {}", e)))?;

        Ok(verify.verification_status == "SUCCESS")
    }
}

//! Shippo label purchase client.
//!
//! Label creation is a two-step flow: create a shipment (synchronously, so
//! rates come back in the response), pick the cheapest rate, then purchase
//! a transaction for that rate.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{AppError, Result};

/// Parcel used when `SHIPPO_PARCEL_JSON` is not configured.
/// Matches the USB mailer we actually ship.
fn default_parcel() -> Value {
    json!({
        "length": "6",
        "width": "4",
        "height": "2",
        "distance_unit": "in",
        "weight": "0.4",
        "mass_unit": "lb"
    })
}

#[derive(Debug, Clone)]
pub struct ShippoClient {
    client: Client,
    base_url: String,
    token: String,
    from_address: Option<Value>,
    parcel: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShippoRate {
    pub object_id: String,
    /// Decimal amount as a string, e.g. "7.45".
    pub amount: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub servicelevel: Option<Servicelevel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Servicelevel {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShipmentResponse {
    #[serde(default)]
    rates: Vec<ShippoRate>,
}

#[derive(Debug, Deserialize)]
struct TransactionResponse {
    status: String,
    #[serde(default)]
    label_url: Option<String>,
    #[serde(default)]
    tracking_number: Option<String>,
    #[serde(default)]
    messages: Option<Vec<Value>>,
}

/// A purchased label, ready to persist on the lead.
#[derive(Debug, Clone)]
pub struct PurchasedLabel {
    pub label_url: Option<String>,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub servicelevel: Option<String>,
}

/// Pick the lowest-cost rate. Unparseable amounts are skipped.
/// Ties keep the first rate at the minimum, so repeated runs on the same
/// rate list pick the same rate.
pub fn select_cheapest_rate(rates: &[ShippoRate]) -> Option<&ShippoRate> {
    rates
        .iter()
        .filter_map(|r| r.amount.trim().parse::<f64>().ok().map(|a| (a, r)))
        .fold(None::<(f64, &ShippoRate)>, |best, (amount, rate)| match best {
            Some((best_amount, _)) if best_amount <= amount => best,
            _ => Some((amount, rate)),
        })
        .map(|(_, rate)| rate)
}

impl ShippoClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        token: impl Into<String>,
        from_address_json: Option<&str>,
        parcel_json: Option<&str>,
    ) -> Self {
        let from_address = from_address_json.and_then(|s| serde_json::from_str(s).ok());
        let parcel = parcel_json
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_else(default_parcel);
        Self {
            client,
            base_url: base_url.into(),
            token: token.into(),
            from_address,
            parcel,
        }
    }

    /// Create a shipment to `to_address` and purchase the cheapest rate.
    pub async fn create_label(&self, to_address: &Value) -> Result<PurchasedLabel> {
        let from_address = self
            .from_address
            .as_ref()
            .ok_or_else(|| AppError::Internal("Shippo from-address not configured".to_string()))?;

        let shipment_body = json!({
            "address_from": from_address,
            "address_to": to_address,
            "parcels": [self.parcel],
            "async": false,
        });

        let shipment: ShipmentResponse = self
            .post_json("shipments", &shipment_body, "create shipment")
            .await?;

        let rate = select_cheapest_rate(&shipment.rates)
            .ok_or_else(|| AppError::Upstream("Shippo returned no usable rates".to_string()))?;

        tracing::debug!(
            "Purchasing Shippo rate {} ({} {})",
            rate.object_id,
            rate.amount,
            rate.currency.as_deref().unwrap_or("USD")
        );

        let transaction_body = json!({
            "rate": rate.object_id,
            "label_file_type": "PDF",
            "async": false,
        });

        let transaction: TransactionResponse = self
            .post_json("transactions", &transaction_body, "purchase label")
            .await?;

        if transaction.status != "SUCCESS" {
            let messages = transaction
                .messages
                .map(|m| serde_json::to_string(&m).unwrap_or_default())
                .unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Shippo transaction status {}: {}",
                transaction.status, messages
            )));
        }

        Ok(PurchasedLabel {
            label_url: transaction.label_url,
            tracking_number: transaction.tracking_number,
            carrier: rate.provider.clone(),
            servicelevel: rate.servicelevel.as_ref().and_then(|s| s.name.clone()),
        })
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
        action: &str,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .header("Authorization", format!("ShippoToken {}", self.token))
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Shippo {} failed: {}", action, e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Shippo {} failed: {}",
                action, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse Shippo response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(id: &str, amount: &str) -> ShippoRate {
        ShippoRate {
            object_id: id.to_string(),
            amount: amount.to_string(),
            currency: Some("USD".to_string()),
            provider: Some("usps".to_string()),
            servicelevel: None,
        }
    }

    #[test]
    fn test_select_cheapest_rate() {
        let rates = vec![rate("a", "12.50"), rate("b", "7.45"), rate("c", "9.99")];
        assert_eq!(select_cheapest_rate(&rates).unwrap().object_id, "b");
    }

    #[test]
    fn test_select_cheapest_rate_tie_keeps_first() {
        let rates = vec![rate("a", "7.45"), rate("b", "7.45"), rate("c", "8.00")];
        assert_eq!(select_cheapest_rate(&rates).unwrap().object_id, "a");
    }

    #[test]
    fn test_select_cheapest_rate_skips_garbage_amounts() {
        let rates = vec![rate("a", "n/a"), rate("b", "9.00")];
        assert_eq!(select_cheapest_rate(&rates).unwrap().object_id, "b");

        let all_garbage = vec![rate("a", ""), rate("b", "free")];
        assert!(select_cheapest_rate(&all_garbage).is_none());
    }

    #[test]
    fn test_select_cheapest_rate_empty() {
        assert!(select_cheapest_rate(&[]).is_none());
    }
}

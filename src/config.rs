use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    /// Public site origin used to build checkout return/cancel URLs.
    pub site_url: String,
    pub paypal_base_url: String,
    pub paypal_client_id: String,
    pub paypal_client_secret: String,
    pub paypal_webhook_id: String,
    pub stripe_base_url: String,
    pub stripe_secret_key: String,
    pub shippo_base_url: String,
    pub shippo_token: String,
    /// Warehouse origin address as raw JSON (required for label purchase).
    pub shippo_from_address_json: Option<String>,
    /// Parcel dimensions as raw JSON (falls back to the default parcel).
    pub shippo_parcel_json: Option<String>,
    /// CRM sync endpoint. Not configured = sync is a no-op.
    pub sync_webhook_url: Option<String>,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("LEADPAY_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let paypal_base_url = env::var("PAYPAL_API_BASE").unwrap_or_else(|_| {
            let live = env::var("PAYPAL_ENV")
                .map(|v| v == "live" || v == "production")
                .unwrap_or(false);
            if live {
                "https://api-m.paypal.com".to_string()
            } else {
                "https://api-m.sandbox.paypal.com".to_string()
            }
        });

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "leadpay.db".to_string()),
            site_url: env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:5173".to_string()),
            paypal_base_url,
            paypal_client_id: env::var("PAYPAL_CLIENT_ID").unwrap_or_default(),
            paypal_client_secret: env::var("PAYPAL_CLIENT_SECRET").unwrap_or_default(),
            paypal_webhook_id: env::var("PAYPAL_WEBHOOK_ID").unwrap_or_default(),
            stripe_base_url: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            shippo_base_url: env::var("SHIPPO_API_BASE")
                .unwrap_or_else(|_| "https://api.goshippo.com".to_string()),
            shippo_token: env::var("SHIPPO_TOKEN").unwrap_or_default(),
            shippo_from_address_json: env::var("SHIPPO_FROM_ADDRESS_JSON").ok(),
            shippo_parcel_json: env::var("SHIPPO_PARCEL_JSON").ok(),
            sync_webhook_url: env::var("LEAD_SYNC_WEBHOOK_URL").ok(),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

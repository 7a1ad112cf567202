pub mod from_row;
pub mod queries;
mod schema;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::payments::{PayPalClient, StripeClient};
use crate::shipping::ShippoClient;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state holding the database pool, provider clients and configuration.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Shared outbound HTTP client (also used by the CRM sync task).
    pub http_client: reqwest::Client,
    pub paypal: PayPalClient,
    pub stripe: StripeClient,
    pub shippo: ShippoClient,
    /// Public site origin used to build checkout return/cancel URLs.
    pub site_url: String,
    /// CRM sync endpoint. Not configured = sync is a no-op.
    pub sync_webhook_url: Option<String>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}

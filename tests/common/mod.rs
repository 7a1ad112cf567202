//! Test utilities and fixtures for leadpay integration tests

#![allow(dead_code)]

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use leadpay::db::{init_db, queries, AppState, DbPool};
pub use leadpay::models::*;

use leadpay::payments::{PayPalClient, StripeClient};
use leadpay::shipping::ShippoClient;

/// Warehouse origin address used by the test Shippo client.
pub const TEST_FROM_ADDRESS: &str = r#"{"name":"Warehouse","street1":"1 Dock St","city":"Miami","state":"FL","zip":"33101","country":"US"}"#;

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create an in-memory pool for handler tests.
///
/// max_size 1: each pooled connection would otherwise open its own
/// private in-memory database.
pub fn test_pool() -> DbPool {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .expect("Failed to create test pool");
    {
        let conn = pool.get().expect("Failed to get test connection");
        init_db(&conn).expect("Failed to initialize schema");
    }
    pool
}

/// Build an `AppState` whose provider clients point at mock servers.
pub fn test_state(paypal_url: &str, stripe_url: &str, shippo_url: &str) -> AppState {
    let client = reqwest::Client::new();
    AppState {
        db: test_pool(),
        http_client: client.clone(),
        paypal: PayPalClient::new(
            client.clone(),
            paypal_url,
            "test-client-id",
            "test-client-secret",
            "WH-TEST",
        ),
        stripe: StripeClient::new(client.clone(), stripe_url, "sk_test_123"),
        shippo: ShippoClient::new(
            client.clone(),
            shippo_url,
            "shippo_test_token",
            Some(TEST_FROM_ADDRESS),
            None,
        ),
        site_url: "https://example.test".to_string(),
        sync_webhook_url: None,
    }
}

/// Create a test lead with default contact details
pub fn create_test_lead(conn: &Connection, name: &str, email: &str) -> Lead {
    let input = CreateLead {
        name: name.to_string(),
        email: email.to_string(),
        phone: Some("+13055550100".to_string()),
        country_code: Some("US".to_string()),
        country_name: Some("United States".to_string()),
    };
    queries::create_lead(conn, &input).expect("Failed to create test lead")
}

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use leadpay::config::Config;
use leadpay::db::{create_pool, init_db, queries, AppState};
use leadpay::handlers;
use leadpay::models::CreateLead;
use leadpay::payments::{PayPalClient, StripeClient};
use leadpay::shipping::ShippoClient;

#[derive(Parser, Debug)]
#[command(name = "leadpay")]
#[command(about = "Checkout and payment-webhook fulfillment service")]
struct Cli {
    /// Seed the database with a dev lead
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the database with a dev lead for local checkout testing.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let lead = queries::create_lead(
        &conn,
        &CreateLead {
            name: "Dev Lead".to_string(),
            email: "dev@leadpay.local".to_string(),
            phone: Some("+13055550100".to_string()),
            country_code: Some("US".to_string()),
            country_name: Some("United States".to_string()),
        },
    )
    .expect("Failed to create dev lead");

    tracing::info!("============================================");
    tracing::info!("DEV LEAD SEEDED");
    tracing::info!("Lead ID: {}", lead.id);
    tracing::info!("============================================");

    println!();
    println!("--- COPY FROM HERE ---");
    println!("  lead_id: {}", lead.id);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leadpay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let http_client = reqwest::Client::new();
    let state = AppState {
        db: db_pool,
        http_client: http_client.clone(),
        paypal: PayPalClient::new(
            http_client.clone(),
            config.paypal_base_url.clone(),
            config.paypal_client_id.clone(),
            config.paypal_client_secret.clone(),
            config.paypal_webhook_id.clone(),
        ),
        stripe: StripeClient::new(
            http_client.clone(),
            config.stripe_base_url.clone(),
            config.stripe_secret_key.clone(),
        ),
        shippo: ShippoClient::new(
            http_client.clone(),
            config.shippo_base_url.clone(),
            config.shippo_token.clone(),
            config.shippo_from_address_json.as_deref(),
            config.shippo_parcel_json.as_deref(),
        ),
        site_url: config.site_url.clone(),
        sync_webhook_url: config.sync_webhook_url.clone(),
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set LEADPAY_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    // The checkout endpoints are called from the browser; the PayPal
    // webhook is server-to-server and unaffected by CORS.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(handlers::leads::router())
        .merge(handlers::checkout::router())
        .merge(handlers::webhooks::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Leadpay server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}

pub mod paypal;

use axum::routing::post;
use axum::Router;

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/paypal", post(paypal::paypal_webhook))
}

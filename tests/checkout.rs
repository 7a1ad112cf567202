//! Checkout handler tests: session creation and client-driven capture.

mod common;

use axum::extract::State;
use mockito::Server;
use serde_json::json;

use common::*;
use leadpay::error::AppError;
use leadpay::extractors::Json;
use leadpay::handlers::checkout::{
    paypal_checkout, stripe_checkout, PayPalCheckoutRequest, StripeCheckoutRequest,
};

async fn token_mock(server: &mut Server) -> mockito::Mock {
    server
        .mock("POST", "/v1/oauth2/token")
        .with_status(200)
        .with_body(r#"{"access_token":"tok_123","token_type":"Bearer"}"#)
        .create_async()
        .await
}

#[tokio::test]
async fn test_paypal_create_returns_order_and_approve_url() {
    let mut server = Server::new_async().await;
    token_mock(&mut server).await;
    server
        .mock("POST", "/v2/checkout/orders")
        .with_status(201)
        .with_body(
            json!({
                "id": "ORDER1",
                "status": "CREATED",
                "links": [
                    {"href": "https://paypal.test/self", "rel": "self"},
                    {"href": "https://paypal.test/approve", "rel": "approve"}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let state = test_state(&server.url(), &server.url(), &server.url());
    let lead = {
        let conn = state.db.get().unwrap();
        create_test_lead(&conn, "Maria", "maria@example.com")
    };

    let response = paypal_checkout(
        State(state.clone()),
        Json(PayPalCheckoutRequest {
            action: "create".to_string(),
            lead_id: lead.id.clone(),
            product: Some("usb128".to_string()),
            order_id: None,
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.0["ok"], json!(true));
    assert_eq!(response.0["orderId"], json!("ORDER1"));
    assert_eq!(response.0["approveUrl"], json!("https://paypal.test/approve"));

    let conn = state.db.get().unwrap();
    let tagged = queries::get_lead_by_id(&conn, &lead.id).unwrap().unwrap();
    assert!(tagged.tags.contains(&"paypal_checkout".to_string()));
}

#[tokio::test]
async fn test_paypal_create_unknown_product() {
    let server = Server::new_async().await;
    let state = test_state(&server.url(), &server.url(), &server.url());
    let lead = {
        let conn = state.db.get().unwrap();
        create_test_lead(&conn, "Maria", "maria@example.com")
    };

    let err = paypal_checkout(
        State(state),
        Json(PayPalCheckoutRequest {
            action: "create".to_string(),
            lead_id: lead.id,
            product: Some("usb1024".to_string()),
            order_id: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidProduct(_)));
}

#[tokio::test]
async fn test_paypal_create_rejects_malformed_lead_id() {
    let server = Server::new_async().await;
    let state = test_state(&server.url(), &server.url(), &server.url());

    let err = paypal_checkout(
        State(state),
        Json(PayPalCheckoutRequest {
            action: "create".to_string(),
            lead_id: "not-a-uuid".to_string(),
            product: Some("usb128".to_string()),
            order_id: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_paypal_create_unknown_lead() {
    let server = Server::new_async().await;
    let state = test_state(&server.url(), &server.url(), &server.url());

    let err = paypal_checkout(
        State(state),
        Json(PayPalCheckoutRequest {
            action: "create".to_string(),
            lead_id: "00000000-0000-4000-8000-000000000000".to_string(),
            product: Some("usb128".to_string()),
            order_id: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::LeadNotFound(_)));
}

#[tokio::test]
async fn test_paypal_create_unknown_action() {
    let server = Server::new_async().await;
    let state = test_state(&server.url(), &server.url(), &server.url());

    let err = paypal_checkout(
        State(state),
        Json(PayPalCheckoutRequest {
            action: "refund".to_string(),
            lead_id: "00000000-0000-4000-8000-000000000000".to_string(),
            product: None,
            order_id: None,
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn test_paypal_capture_completes_and_tags() {
    let mut server = Server::new_async().await;
    token_mock(&mut server).await;

    let state = test_state(&server.url(), &server.url(), &server.url());
    let lead = {
        let conn = state.db.get().unwrap();
        create_test_lead(&conn, "Maria", "maria@example.com")
    };

    server
        .mock("GET", "/v2/checkout/orders/ORDER1")
        .with_status(200)
        .with_body(
            json!({
                "id": "ORDER1",
                "status": "APPROVED",
                "purchase_units": [{"reference_id": "usb128", "custom_id": lead.id}]
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("POST", "/v2/checkout/orders/ORDER1/capture")
        .with_status(201)
        .with_body(r#"{"id":"ORDER1","status":"COMPLETED"}"#)
        .create_async()
        .await;

    let response = paypal_checkout(
        State(state.clone()),
        Json(PayPalCheckoutRequest {
            action: "capture".to_string(),
            lead_id: lead.id.clone(),
            product: None,
            order_id: Some("ORDER1".to_string()),
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.0["completed"], json!(true));
    assert_eq!(response.0["status"], json!("COMPLETED"));

    let conn = state.db.get().unwrap();
    let tagged = queries::get_lead_by_id(&conn, &lead.id).unwrap().unwrap();
    assert!(tagged.tags.contains(&"paid_paypal".to_string()));
}

#[tokio::test]
async fn test_paypal_capture_rejects_foreign_order() {
    let mut server = Server::new_async().await;
    token_mock(&mut server).await;
    server
        .mock("GET", "/v2/checkout/orders/ORDER1")
        .with_status(200)
        .with_body(
            json!({
                "id": "ORDER1",
                "status": "APPROVED",
                "purchase_units": [{
                    "reference_id": "usb128",
                    "custom_id": "11111111-1111-4111-8111-111111111111"
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let state = test_state(&server.url(), &server.url(), &server.url());
    let lead = {
        let conn = state.db.get().unwrap();
        create_test_lead(&conn, "Maria", "maria@example.com")
    };

    let err = paypal_checkout(
        State(state.clone()),
        Json(PayPalCheckoutRequest {
            action: "capture".to_string(),
            lead_id: lead.id.clone(),
            product: None,
            order_id: Some("ORDER1".to_string()),
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::LeadMismatch));

    // Nothing was mutated for the caller's lead
    let conn = state.db.get().unwrap();
    let unchanged = queries::get_lead_by_id(&conn, &lead.id).unwrap().unwrap();
    assert!(unchanged.tags.is_empty());
    assert!(unchanged.paid_at.is_none());
}

#[tokio::test]
async fn test_stripe_checkout_creates_session_and_tags() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/checkout/sessions")
        .with_status(200)
        .with_body(r#"{"id":"cs_test_1","url":"https://checkout.stripe.test/c/pay/cs_test_1"}"#)
        .create_async()
        .await;

    let state = test_state(&server.url(), &server.url(), &server.url());
    let lead = {
        let conn = state.db.get().unwrap();
        create_test_lead(&conn, "Maria", "maria@example.com")
    };

    let response = stripe_checkout(
        State(state.clone()),
        Json(StripeCheckoutRequest {
            lead_id: lead.id.clone(),
            product: "plan_1tb_mensual".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.0["ok"], json!(true));
    assert_eq!(response.0["sessionId"], json!("cs_test_1"));
    assert_eq!(
        response.0["url"],
        json!("https://checkout.stripe.test/c/pay/cs_test_1")
    );

    let conn = state.db.get().unwrap();
    let tagged = queries::get_lead_by_id(&conn, &lead.id).unwrap().unwrap();
    assert!(tagged.tags.contains(&"stripe_checkout".to_string()));
}

#[tokio::test]
async fn test_stripe_checkout_passes_null_url_through() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/checkout/sessions")
        .with_status(200)
        .with_body(r#"{"id":"cs_test_2","url":null}"#)
        .create_async()
        .await;

    let state = test_state(&server.url(), &server.url(), &server.url());
    let lead = {
        let conn = state.db.get().unwrap();
        create_test_lead(&conn, "Maria", "maria@example.com")
    };

    let response = stripe_checkout(
        State(state),
        Json(StripeCheckoutRequest {
            lead_id: lead.id,
            product: "anual".to_string(),
        }),
    )
    .await
    .unwrap();

    assert_eq!(response.0["sessionId"], json!("cs_test_2"));
    assert_eq!(response.0["url"], json!(null));
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid product: {0}")]
    InvalidProduct(String),

    #[error("Lead not found: {0}")]
    LeadNotFound(String),

    #[error("Order does not match lead")]
    LeadMismatch,

    #[error("Missing PayPal signature headers")]
    MissingSignatureHeaders,

    #[error("Webhook signature verification failed")]
    SignatureRejected,

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error body matching the `{ok: false, error: ...}` response contract.
#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AppError {
    fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone())),
            AppError::InvalidProduct(key) => {
                (StatusCode::BAD_REQUEST, "Invalid product", Some(key.clone()))
            }
            AppError::LeadNotFound(id) => (StatusCode::NOT_FOUND, "Lead not found", Some(id.clone())),
            AppError::LeadMismatch => (StatusCode::BAD_REQUEST, "Order does not match lead", None),
            AppError::MissingSignatureHeaders => {
                (StatusCode::UNAUTHORIZED, "Missing signature headers", None)
            }
            AppError::SignatureRejected => {
                (StatusCode::UNAUTHORIZED, "Signature verification failed", None)
            }
            AppError::Upstream(msg) => {
                tracing::error!("Upstream provider error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Upstream provider error", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            ok: false,
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

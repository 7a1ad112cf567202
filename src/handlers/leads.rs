//! Lead capture endpoints.

use axum::routing::{get, post};
use axum::{extract::State, Router};
use serde_json::{json, Value};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::models::CreateLead;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/leads", post(create_lead))
        .route("/leads/{id}", get(get_lead))
}

pub async fn create_lead(
    State(state): State<AppState>,
    Json(input): Json<CreateLead>,
) -> Result<Json<Value>> {
    if input.name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    if input.email.trim().is_empty() || !input.email.contains('@') {
        return Err(AppError::BadRequest("valid email is required".to_string()));
    }

    let conn = state.db.get()?;
    let lead = queries::create_lead(&conn, &input)?;

    tracing::info!("Lead created: {} ({})", lead.id, lead.email);

    Ok(Json(json!({ "ok": true, "leadId": lead.id })))
}

pub async fn get_lead(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let conn = state.db.get()?;
    let lead = queries::get_lead_by_id(&conn, &id)?
        .ok_or_else(|| AppError::LeadNotFound(id.clone()))?;

    Ok(Json(json!({ "ok": true, "lead": lead })))
}

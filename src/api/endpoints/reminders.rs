//! Reminder lifecycle and local prompt endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{owner_from_path, ApiContext};
use crate::models::OwnerId;
use crate::notifier::Prompt;
use crate::reminders::{DeliveryStatus, MedicineStatus};

#[derive(Debug, Serialize)]
pub struct ActivationResponse {
    pub owner: OwnerId,
    pub active: bool,
    /// False when the call found the owner already in the requested state.
    pub changed: bool,
}

/// `POST /api/owners/:owner/activate`
pub async fn activate(
    State(ctx): State<ApiContext>,
    Path(owner): Path<String>,
) -> Result<Json<ActivationResponse>, ApiError> {
    let owner = owner_from_path(&owner)?;
    let changed = ctx.core.activate(&owner);
    Ok(Json(ActivationResponse {
        owner,
        active: true,
        changed,
    }))
}

/// `POST /api/owners/:owner/deactivate`
pub async fn deactivate(
    State(ctx): State<ApiContext>,
    Path(owner): Path<String>,
) -> Result<Json<ActivationResponse>, ApiError> {
    let owner = owner_from_path(&owner)?;
    let changed = ctx.core.deactivate(&owner).await;
    Ok(Json(ActivationResponse {
        owner,
        active: false,
        changed,
    }))
}

#[derive(Debug, Serialize)]
pub struct RemindersResponse {
    pub active: bool,
    /// Transport, blocking setting and last delivery error.
    #[serde(flatten)]
    pub delivery: DeliveryStatus,
    pub medicines: Vec<MedicineStatus>,
}

/// `GET /api/owners/:owner/reminders`
pub async fn statuses(
    State(ctx): State<ApiContext>,
    Path(owner): Path<String>,
) -> Result<Json<RemindersResponse>, ApiError> {
    let owner = owner_from_path(&owner)?;
    let engine = ctx.core.engine_for(&owner);
    let delivery = engine
        .delivery_status()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(RemindersResponse {
        active: ctx.core.is_active(&owner),
        delivery,
        medicines: engine.statuses(),
    }))
}

/// `GET /api/owners/:owner/prompts`
pub async fn prompts(
    State(ctx): State<ApiContext>,
    Path(owner): Path<String>,
) -> Result<Json<Vec<Prompt>>, ApiError> {
    let owner = owner_from_path(&owner)?;
    Ok(Json(ctx.core.prompts().list(&owner)))
}

#[derive(Debug, Deserialize)]
pub struct PromptAnswer {
    pub confirmed: bool,
}

/// `POST /api/prompts/:id/answer`
pub async fn answer_prompt(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    body: Result<Json<PromptAnswer>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(answer) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    if ctx.core.prompts().answer(&id, answer.confirmed) {
        tracing::info!(prompt_id = %id, confirmed = answer.confirmed, "Prompt answered");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("Prompt not open: {id}")))
    }
}

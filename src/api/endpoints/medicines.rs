//! Medicine list endpoints.
//!
//! - `GET    /api/owners/:owner/medicines`: list (both roles)
//! - `POST   /api/owners/:owner/medicines`: caregiver create
//! - `PATCH  /api/owners/:owner/medicines/:id`: caregiver edit
//! - `DELETE /api/owners/:owner/medicines/:id`: caregiver delete
//! - `POST   /api/owners/:owner/medicines/:id/reset`: caregiver reset
//! - `POST   /api/owners/:owner/medicines/:id/taken`: patient confirm
//! - `GET    /api/owners/:owner/summary`: adherence summary

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::{owner_from_path, ApiContext};
use crate::models::{Medicine, MedicineEdit, NewMedicine};
use crate::roles::AdherenceSummary;

fn not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("Medicine not found: {id}"))
}

/// Shown when the list could not be read from storage.
pub const LOAD_FAILED_MESSAGE: &str = "Could not load your medicines. Showing an empty list.";

#[derive(Debug, Serialize)]
pub struct MedicineList {
    pub medicines: Vec<Medicine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
}

/// `GET /api/owners/:owner/medicines`
///
/// A storage failure still answers 200 with an empty list and a warning.
pub async fn list(
    State(ctx): State<ApiContext>,
    Path(owner): Path<String>,
) -> Result<Json<MedicineList>, ApiError> {
    let owner = owner_from_path(&owner)?;
    let body = match ctx.core.patient(&owner).try_medicines() {
        Ok(medicines) => MedicineList {
            medicines,
            warning: None,
        },
        Err(e) => {
            tracing::error!(owner = %owner, error = %e, "Cannot read medicine list");
            MedicineList {
                medicines: Vec::new(),
                warning: Some(LOAD_FAILED_MESSAGE),
            }
        }
    };
    Ok(Json(body))
}

/// `POST /api/owners/:owner/medicines`
pub async fn create(
    State(ctx): State<ApiContext>,
    Path(owner): Path<String>,
    body: Result<Json<NewMedicine>, JsonRejection>,
) -> Result<(StatusCode, Json<Medicine>), ApiError> {
    let owner = owner_from_path(&owner)?;
    let Json(input) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let med = ctx.core.caregiver(&owner).add(input)?;
    Ok((StatusCode::CREATED, Json(med)))
}

/// `PATCH /api/owners/:owner/medicines/:id`
pub async fn edit(
    State(ctx): State<ApiContext>,
    Path((owner, id)): Path<(String, String)>,
    body: Result<Json<MedicineEdit>, JsonRejection>,
) -> Result<Json<Medicine>, ApiError> {
    let owner = owner_from_path(&owner)?;
    let Json(input) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    ctx.core
        .caregiver(&owner)
        .edit(&id, input)?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// `DELETE /api/owners/:owner/medicines/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Path((owner, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let owner = owner_from_path(&owner)?;
    if ctx.core.caregiver(&owner).delete(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(&id))
    }
}

/// `POST /api/owners/:owner/medicines/:id/reset`
pub async fn reset(
    State(ctx): State<ApiContext>,
    Path((owner, id)): Path<(String, String)>,
) -> Result<Json<Medicine>, ApiError> {
    let owner = owner_from_path(&owner)?;
    ctx.core
        .caregiver(&owner)
        .reset(&id)?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// `POST /api/owners/:owner/medicines/:id/taken`
pub async fn mark_taken(
    State(ctx): State<ApiContext>,
    Path((owner, id)): Path<(String, String)>,
) -> Result<Json<Medicine>, ApiError> {
    let owner = owner_from_path(&owner)?;
    ctx.core
        .patient(&owner)
        .confirm_taken(&id)?
        .map(Json)
        .ok_or_else(|| not_found(&id))
}

/// `GET /api/owners/:owner/summary`
pub async fn summary(
    State(ctx): State<ApiContext>,
    Path(owner): Path<String>,
) -> Result<Json<AdherenceSummary>, ApiError> {
    let owner = owner_from_path(&owner)?;
    Ok(Json(ctx.core.patient(&owner).summary()))
}

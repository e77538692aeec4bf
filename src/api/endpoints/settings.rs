//! Caregiver settings endpoints.
//!
//! The auth token is write-only: reads report `has_calling_credentials`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{owner_from_path, ApiContext};
use crate::models::OwnerSettings;

#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub contact_phone: Option<String>,
    pub reminders_enabled: bool,
    pub account_sid: Option<String>,
    pub phone_number: Option<String>,
    pub has_calling_credentials: bool,
}

impl From<&OwnerSettings> for SettingsView {
    fn from(settings: &OwnerSettings) -> Self {
        Self {
            contact_phone: settings.contact_phone.clone(),
            reminders_enabled: settings.reminders_enabled,
            account_sid: settings.credentials.account_sid.clone(),
            phone_number: settings.credentials.phone_number.clone(),
            has_calling_credentials: settings.credentials.is_complete(),
        }
    }
}

/// Fields left out of the request keep their stored value.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub contact_phone: Option<String>,
    pub reminders_enabled: Option<bool>,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub phone_number: Option<String>,
}

impl SettingsUpdate {
    fn apply(self, settings: &mut OwnerSettings) {
        if let Some(phone) = self.contact_phone {
            settings.contact_phone = Some(phone.trim().to_string());
        }
        if let Some(enabled) = self.reminders_enabled {
            settings.reminders_enabled = enabled;
        }
        if let Some(sid) = self.account_sid {
            settings.credentials.account_sid = Some(sid.trim().to_string());
        }
        if let Some(token) = self.auth_token {
            settings.credentials.auth_token = Some(token.trim().to_string());
        }
        if let Some(number) = self.phone_number {
            settings.credentials.phone_number = Some(number.trim().to_string());
        }
    }
}

/// `GET /api/owners/:owner/settings`
pub async fn get(
    State(ctx): State<ApiContext>,
    Path(owner): Path<String>,
) -> Result<Json<SettingsView>, ApiError> {
    let owner = owner_from_path(&owner)?;
    let settings = ctx
        .core
        .caregiver(&owner)
        .settings()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(SettingsView::from(&settings)))
}

/// `PUT /api/owners/:owner/settings`
pub async fn update(
    State(ctx): State<ApiContext>,
    Path(owner): Path<String>,
    body: Result<Json<SettingsUpdate>, JsonRejection>,
) -> Result<Json<SettingsView>, ApiError> {
    let owner = owner_from_path(&owner)?;
    let Json(update) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let caregiver = ctx.core.caregiver(&owner);
    let mut settings = caregiver
        .settings()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    update.apply(&mut settings);
    caregiver.save_settings(&settings)?;
    Ok(Json(SettingsView::from(&settings)))
}

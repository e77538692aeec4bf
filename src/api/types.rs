//! Shared types for the API layer.

use std::sync::Arc;

use crate::core_state::CoreState;
use crate::models::OwnerId;

use super::error::ApiError;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// Parse the `:owner` path segment.
pub fn owner_from_path(raw: &str) -> Result<OwnerId, ApiError> {
    Ok(OwnerId::parse(raw)?)
}

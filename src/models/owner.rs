use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Longest accepted owner identity (an email address at most).
const OWNER_ID_MAX_LEN: usize = 254;

/// User identity that namespaces one medicine list and its settings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId(String);

impl OwnerId {
    /// Accepts any email-like identity: non-empty, no whitespace or control characters.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > OWNER_ID_MAX_LEN
            || trimmed.chars().any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(ValidationError::InvalidOwner(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage key for this owner's medicine list.
    pub fn medicines_key(&self) -> String {
        format!("medicines_{}", self.0)
    }
}

impl std::fmt::Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OwnerId> for String {
    fn from(value: OwnerId) -> Self {
        value.0
    }
}

/// Credentials for placing calls through a hosted voice provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallingCredentials {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub phone_number: Option<String>,
}

impl CallingCredentials {
    /// True when all three values are filled in.
    pub fn is_complete(&self) -> bool {
        [&self.account_sid, &self.auth_token, &self.phone_number]
            .iter()
            .all(|v| v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false))
    }
}

/// Caregiver settings stored next to an owner's medicine list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerSettings {
    /// Patient phone number reminders are sent to.
    pub contact_phone: Option<String>,
    /// Automatic reminders on/off.
    pub reminders_enabled: bool,
    pub credentials: CallingCredentials,
}

impl Default for OwnerSettings {
    fn default() -> Self {
        Self {
            contact_phone: None,
            reminders_enabled: true,
            credentials: CallingCredentials::default(),
        }
    }
}

impl OwnerSettings {
    /// Contact number, if one is set and non-blank.
    pub fn contact_phone(&self) -> Option<&str> {
        self.contact_phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

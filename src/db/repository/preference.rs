use rusqlite::Connection;

use super::storage::{get_item, remove_item, set_item};
use crate::db::DatabaseError;
use crate::models::{CallingCredentials, OwnerId, OwnerSettings};

// ──────────────────────────────────────────────
// Owner settings, one scalar record per setting
// ──────────────────────────────────────────────

/// A single owner-scoped setting and its storage key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    ContactPhone,
    RemindersEnabled,
    AccountSid,
    AuthToken,
    CallerNumber,
}

impl SettingKey {
    pub const ALL: [SettingKey; 5] = [
        Self::ContactPhone,
        Self::RemindersEnabled,
        Self::AccountSid,
        Self::AuthToken,
        Self::CallerNumber,
    ];

    fn prefix(&self) -> &'static str {
        match self {
            Self::ContactPhone => "phone_",
            Self::RemindersEnabled => "autoCall_",
            Self::AccountSid => "twilio_sid_",
            Self::AuthToken => "twilio_token_",
            Self::CallerNumber => "twilio_phone_",
        }
    }

    /// Full storage key for `owner`.
    pub fn key_for(&self, owner: &OwnerId) -> String {
        format!("{}{}", self.prefix(), owner)
    }
}

/// One stored setting whose value changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingChange {
    pub key: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// Read a text setting, treating blank and the literal "undefined" as unset.
fn get_text(
    conn: &Connection,
    key: SettingKey,
    owner: &OwnerId,
) -> Result<Option<String>, DatabaseError> {
    Ok(get_item(conn, &key.key_for(owner))?
        .filter(|v| !v.trim().is_empty() && v != "undefined" && v != "null"))
}

/// Load every setting for an owner. Absent or unparsable values take defaults.
pub fn get_owner_settings(
    conn: &Connection,
    owner: &OwnerId,
) -> Result<OwnerSettings, DatabaseError> {
    let reminders_enabled = match get_text(conn, SettingKey::RemindersEnabled, owner)? {
        Some(raw) => serde_json::from_str::<bool>(&raw).unwrap_or_else(|_| {
            tracing::warn!(owner = %owner, value = %raw, "Unparsable reminder flag, using default");
            true
        }),
        None => true,
    };

    Ok(OwnerSettings {
        contact_phone: get_text(conn, SettingKey::ContactPhone, owner)?,
        reminders_enabled,
        credentials: CallingCredentials {
            account_sid: get_text(conn, SettingKey::AccountSid, owner)?,
            auth_token: get_text(conn, SettingKey::AuthToken, owner)?,
            phone_number: get_text(conn, SettingKey::CallerNumber, owner)?,
        },
    })
}

/// Persist all settings for an owner. Unset text values remove their record.
///
/// Returns the keys whose stored value actually changed.
pub fn set_owner_settings(
    conn: &Connection,
    owner: &OwnerId,
    settings: &OwnerSettings,
) -> Result<Vec<SettingChange>, DatabaseError> {
    let values: [(SettingKey, Option<String>); 5] = [
        (SettingKey::ContactPhone, trimmed(&settings.contact_phone)),
        (
            SettingKey::RemindersEnabled,
            Some(settings.reminders_enabled.to_string()),
        ),
        (SettingKey::AccountSid, trimmed(&settings.credentials.account_sid)),
        (SettingKey::AuthToken, trimmed(&settings.credentials.auth_token)),
        (SettingKey::CallerNumber, trimmed(&settings.credentials.phone_number)),
    ];

    let tx = conn.unchecked_transaction()?;
    let mut changed = Vec::new();
    for (setting, value) in values {
        let key = setting.key_for(owner);
        let previous = get_item(&tx, &key)?;
        if previous == value {
            continue;
        }
        match &value {
            Some(v) => set_item(&tx, &key, v)?,
            None => remove_item(&tx, &key)?,
        }
        changed.push(SettingChange {
            key,
            old_value: previous,
            new_value: value,
        });
    }
    tx.commit()?;
    Ok(changed)
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

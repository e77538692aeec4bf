//! Medicine store: the single source of truth for every owner's list.
//!
//! One serialized record per owner (`medicines_<owner>`) plus one scalar
//! record per setting. Every successful save publishes on the `ChangeBus`
//! with both the new and the previous serialized state.

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::db::{self, Database, DatabaseError};
use crate::events::{ChangeBus, ChangeEvent, ChangeOrigin};
use crate::models::{Medicine, MedicinePatch, NewMedicine, OwnerId, OwnerSettings, ValidationError};

/// Serialize/deserialize or storage failure.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Storage failure: {0}")]
    Database(#[from] DatabaseError),

    #[error("Serialization failure: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl From<DatabaseError> for StoreError {
    fn from(err: DatabaseError) -> Self {
        Self::Persistence(PersistenceError::Database(err))
    }
}

pub struct MedicineStore {
    db: Arc<Database>,
    bus: Arc<ChangeBus>,
    /// Serializes read-modify-write cycles inside this process.
    write_lock: Mutex<()>,
}

impl MedicineStore {
    pub fn new(db: Arc<Database>, bus: Arc<ChangeBus>) -> Self {
        Self {
            db,
            bus,
            write_lock: Mutex::new(()),
        }
    }

    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    // ── Medicine list ───────────────────────────────────────

    /// Owner's medicines in stored order.
    ///
    /// Absent, corrupt or unreadable payloads degrade to an empty list.
    pub fn load(&self, owner: &OwnerId) -> Vec<Medicine> {
        match self.try_load(owner) {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(owner = %owner, error = %e, "Cannot read medicine list");
                Vec::new()
            }
        }
    }

    /// Like `load`, but storage failures are reported instead of hidden.
    /// A corrupt payload still yields an empty list.
    pub fn try_load(&self, owner: &OwnerId) -> Result<Vec<Medicine>, PersistenceError> {
        let raw = self.read_raw(&owner.medicines_key())?;
        Ok(parse_list(owner, raw.as_deref()))
    }

    /// Raw stored value for any key.
    pub fn read_raw(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        Ok(self.db.with_conn(|conn| db::get_item(conn, key))?)
    }

    /// Replace the owner's list and notify subscribers.
    pub fn save(&self, owner: &OwnerId, medicines: &[Medicine]) -> Result<(), PersistenceError> {
        let key = owner.medicines_key();
        let serialized = serde_json::to_string(medicines)?;
        let previous = self
            .db
            .with_conn(|conn| db::swap_item(conn, &key, &serialized))
            .map_err(|e| {
                tracing::error!(owner = %owner, error = %e, "Cannot save medicine list");
                e
            })?;

        self.bus.publish(ChangeEvent {
            owner: owner.clone(),
            key,
            new_value: Some(serialized),
            old_value: previous,
            origin: ChangeOrigin::Local,
        });
        Ok(())
    }

    /// Atomic read-modify-write of the owner's list.
    ///
    /// The list is saved only when `f` succeeds and actually changed it.
    pub fn modify<T, F>(&self, owner: &OwnerId, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Vec<Medicine>) -> Result<T, ValidationError>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let before = self.try_load(owner)?;
        let mut list = before.clone();
        let value = f(&mut list)?;
        if list != before {
            self.save(owner, &list)?;
        }
        Ok(value)
    }

    /// Apply `patch` to the record with `id`. Absent ids are a no-op (`None`).
    pub fn update(
        &self,
        owner: &OwnerId,
        id: &str,
        patch: &MedicinePatch,
    ) -> Result<Option<Medicine>, StoreError> {
        self.modify(owner, |list| {
            let Some(med) = list.iter_mut().find(|m| m.id == id) else {
                return Ok(None);
            };
            patch.apply(med)?;
            Ok(Some(med.clone()))
        })
    }

    /// Validate caregiver input and append the new record.
    pub fn add(&self, owner: &OwnerId, input: NewMedicine) -> Result<Medicine, StoreError> {
        let medicine = input.validate()?;
        self.modify(owner, |list| {
            list.push(medicine.clone());
            Ok(())
        })?;
        tracing::info!(owner = %owner, medicine_id = %medicine.id, name = %medicine.name, "Medicine added");
        Ok(medicine)
    }

    /// Remove a record permanently. Returns false if it was not there.
    pub fn delete(&self, owner: &OwnerId, id: &str) -> Result<bool, StoreError> {
        let removed = self.modify(owner, |list| {
            let len = list.len();
            list.retain(|m| m.id != id);
            Ok(list.len() != len)
        })?;
        if removed {
            tracing::info!(owner = %owner, medicine_id = %id, "Medicine deleted");
        }
        Ok(removed)
    }

    /// Clear taken, takenAt and inFlight. Idempotent.
    pub fn reset(&self, owner: &OwnerId, id: &str) -> Result<Option<Medicine>, StoreError> {
        self.modify(owner, |list| {
            Ok(list.iter_mut().find(|m| m.id == id).map(|med| {
                med.reset();
                med.clone()
            }))
        })
    }

    // ── Settings ────────────────────────────────────────────

    pub fn load_settings(&self, owner: &OwnerId) -> Result<OwnerSettings, PersistenceError> {
        Ok(self
            .db
            .with_conn(|conn| db::get_owner_settings(conn, owner))?)
    }

    /// Persist settings and publish one event per changed key.
    pub fn save_settings(
        &self,
        owner: &OwnerId,
        settings: &OwnerSettings,
    ) -> Result<(), PersistenceError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let changes = self
            .db
            .with_conn(|conn| db::set_owner_settings(conn, owner, settings))?;
        for change in changes {
            self.bus.publish(ChangeEvent {
                owner: owner.clone(),
                key: change.key,
                new_value: change.new_value,
                old_value: change.old_value,
                origin: ChangeOrigin::Local,
            });
        }
        Ok(())
    }

    // ── External writes ─────────────────────────────────────

    /// Re-read `keys` and publish any value that differs from the last one
    /// seen, tagged as an external change. Returns how many were published.
    ///
    /// Runs under the write lock so a local save cannot interleave.
    pub fn observe_external(
        &self,
        owner: &OwnerId,
        keys: &[String],
    ) -> Result<usize, PersistenceError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut published = 0;
        for key in keys {
            let current = self.read_raw(key)?;
            let changed = self.bus.publish_if_changed(ChangeEvent {
                owner: owner.clone(),
                key: key.clone(),
                new_value: current,
                old_value: None,
                origin: ChangeOrigin::External,
            });
            if changed {
                published += 1;
            }
        }
        Ok(published)
    }
}

/// Decode a stored list. Anything unreadable becomes an empty list.
pub fn parse_list(owner: &OwnerId, raw: Option<&str>) -> Vec<Medicine> {
    let Some(raw) = raw.map(str::trim) else {
        return Vec::new();
    };
    if raw.is_empty() || raw == "undefined" || raw == "null" {
        return Vec::new();
    }
    match serde_json::from_str::<Vec<Medicine>>(raw) {
        Ok(mut list) => {
            for med in &mut list {
                if med.normalize() {
                    tracing::warn!(owner = %owner, medicine_id = %med.id, "Repaired taken/takenAt pair");
                }
            }
            list
        }
        Err(e) => {
            tracing::warn!(owner = %owner, error = %e, "Corrupt medicine list, treating as empty");
            Vec::new()
        }
    }
}

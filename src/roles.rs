//! Role facades over the store and the response handler.
//!
//! The caregiver manages the list and the settings; the patient reads
//! the list and confirms doses. Both see the same adherence summary.

use std::sync::Arc;

use serde::Serialize;

use crate::models::{Medicine, MedicineEdit, NewMedicine, OwnerId, OwnerSettings, Outcome};
use crate::reminders::ResponseHandler;
use crate::store::{MedicineStore, PersistenceError, StoreError};

// ═══════════════════════════════════════════════════════════
// Adherence summary
// ═══════════════════════════════════════════════════════════

/// Progress over the current list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdherenceSummary {
    pub taken: usize,
    pub total: usize,
    /// Whole percent, rounded down. 0 for an empty list.
    pub progress_percent: u8,
    pub upcoming: Vec<Medicine>,
    pub completed: Vec<Medicine>,
    pub message: &'static str,
}

impl AdherenceSummary {
    pub fn from_list(list: &[Medicine]) -> Self {
        let (completed, upcoming): (Vec<Medicine>, Vec<Medicine>) =
            list.iter().cloned().partition(|m| m.taken);
        let taken = completed.len();
        let total = list.len();
        let progress_percent = if total == 0 {
            0
        } else {
            (taken * 100 / total) as u8
        };

        Self {
            taken,
            total,
            progress_percent,
            upcoming,
            completed,
            message: encouragement(progress_percent),
        }
    }
}

fn encouragement(progress_percent: u8) -> &'static str {
    match progress_percent {
        100 => "Perfect! You've taken all your medicines today!",
        75..=99 => "You're doing great! Almost finished for today!",
        50..=74 => "Keep going! You're more than halfway done!",
        25..=49 => "Good start! Remember to take the rest of your medicines!",
        _ => "Time to start taking your medicines for today!",
    }
}

// ═══════════════════════════════════════════════════════════
// Caregiver
// ═══════════════════════════════════════════════════════════

pub struct CaregiverActions {
    owner: OwnerId,
    store: Arc<MedicineStore>,
    responses: Arc<ResponseHandler>,
}

impl CaregiverActions {
    pub fn new(store: Arc<MedicineStore>, responses: Arc<ResponseHandler>) -> Self {
        Self {
            owner: responses.owner().clone(),
            store,
            responses,
        }
    }

    pub fn medicines(&self) -> Vec<Medicine> {
        self.store.load(&self.owner)
    }

    /// Validate and append. Nothing is written when validation fails.
    pub fn add(&self, input: NewMedicine) -> Result<Medicine, StoreError> {
        self.store.add(&self.owner, input)
    }

    /// Change name, dosage, time, frequency or instructions. `None` when
    /// the id is unknown. Reminder state is left as it is.
    pub fn edit(&self, id: &str, edit: MedicineEdit) -> Result<Option<Medicine>, StoreError> {
        let patch = edit.into_patch()?;
        let med = self.store.update(&self.owner, id, &patch)?;
        if let Some(med) = &med {
            tracing::info!(owner = %self.owner, medicine_id = %id, name = %med.name, "Medicine updated");
        }
        Ok(med)
    }

    /// Remove a medicine and cancel whatever reminder work it had.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        self.responses.delete(id)
    }

    pub fn reset(&self, id: &str) -> Result<Option<Medicine>, StoreError> {
        self.responses.reset(id)
    }

    pub fn settings(&self) -> Result<OwnerSettings, PersistenceError> {
        self.store.load_settings(&self.owner)
    }

    pub fn save_settings(&self, settings: &OwnerSettings) -> Result<(), PersistenceError> {
        self.store.save_settings(&self.owner, settings)?;
        tracing::info!(owner = %self.owner, reminders_enabled = settings.reminders_enabled, "Settings saved");
        Ok(())
    }

    pub fn summary(&self) -> AdherenceSummary {
        AdherenceSummary::from_list(&self.medicines())
    }
}

// ═══════════════════════════════════════════════════════════
// Patient
// ═══════════════════════════════════════════════════════════

pub struct PatientActions {
    owner: OwnerId,
    store: Arc<MedicineStore>,
    responses: Arc<ResponseHandler>,
}

impl PatientActions {
    pub fn new(store: Arc<MedicineStore>, responses: Arc<ResponseHandler>) -> Self {
        Self {
            owner: responses.owner().clone(),
            store,
            responses,
        }
    }

    pub fn medicines(&self) -> Vec<Medicine> {
        self.store.load(&self.owner)
    }

    /// Like `medicines`, but a storage failure is returned to the caller.
    pub fn try_medicines(&self) -> Result<Vec<Medicine>, PersistenceError> {
        self.store.try_load(&self.owner)
    }

    /// "I took it." Marks the dose taken and cancels any pending retry.
    pub fn confirm_taken(&self, id: &str) -> Result<Option<Medicine>, StoreError> {
        self.responses.record_response(id, Outcome::Confirmed)
    }

    pub fn summary(&self) -> AdherenceSummary {
        AdherenceSummary::from_list(&self.medicines())
    }
}

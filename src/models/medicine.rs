use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Frequency;
use super::ValidationError;
use crate::config::INSTRUCTIONS_MAX_LEN;

/// Format of `takenAt` timestamps (local wall-clock time).
pub const TAKEN_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Time of day a medicine is due, minute granularity, 24h clock.
///
/// Serialized as `"HH:MM"`, the format the caregiver form produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScheduledTime {
    hour: u8,
    minute: u8,
}

impl ScheduledTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidTime(format!("{hour}:{minute}")));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// The moment this time falls on the given day.
    pub fn on(&self, date: NaiveDate) -> NaiveDateTime {
        let time = NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN);
        date.and_time(time)
    }

    /// Whether `now` falls inside this hour:minute.
    pub fn matches_minute(&self, now: &NaiveDateTime) -> bool {
        now.hour() == u32::from(self.hour) && now.minute() == u32::from(self.minute)
    }
}

impl std::fmt::Display for ScheduledTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl std::str::FromStr for ScheduledTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour = h.parse::<u8>().map_err(|_| invalid())?;
        let minute = m.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ScheduledTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduledTime> for String {
    fn from(value: ScheduledTime) -> Self {
        value.to_string()
    }
}

// ═══════════════════════════════════════════════════════════
// Medicine record
// ═══════════════════════════════════════════════════════════

/// One medicine on an owner's list.
///
/// Field names follow the persisted JSON shape. The in-flight flag is
/// written as `inFlight`; older payloads called it `callScheduled`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medicine {
    pub id: String,
    pub name: String,
    pub dosage: String,
    pub time: ScheduledTime,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default)]
    pub taken: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<String>,
    #[serde(default, rename = "inFlight", alias = "callScheduled")]
    pub in_flight: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_on: Option<NaiveDate>,
}

impl Medicine {
    /// Record the dose as taken at `at`. Always sets both fields together.
    pub fn mark_taken(&mut self, at: NaiveDateTime) {
        self.taken = true;
        self.taken_at = Some(at.format(TAKEN_AT_FORMAT).to_string());
        self.in_flight = false;
    }

    /// Back to untaken with no attempt outstanding.
    pub fn reset(&mut self) {
        self.taken = false;
        self.taken_at = None;
        self.in_flight = false;
    }

    /// Day the dose was taken, when `takenAt` carries a full timestamp.
    pub fn taken_on(&self) -> Option<NaiveDate> {
        self.taken_at
            .as_deref()
            .and_then(|raw| NaiveDateTime::parse_from_str(raw, TAKEN_AT_FORMAT).ok())
            .map(|dt| dt.date())
    }

    /// Restore the taken/takenAt pairing on records written by older clients.
    ///
    /// A `takenAt` without `taken` is dropped; `taken` without a timestamp
    /// is cleared so the dose is reminded again. Returns true if anything changed.
    pub fn normalize(&mut self) -> bool {
        let has_time = self
            .taken_at
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false);
        if self.taken && !has_time {
            self.taken = false;
            self.taken_at = None;
            return true;
        }
        if !self.taken && self.taken_at.is_some() {
            self.taken_at = None;
            return true;
        }
        false
    }
}

// ═══════════════════════════════════════════════════════════
// Creation input
// ═══════════════════════════════════════════════════════════

/// Caregiver form input for a new medicine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewMedicine {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl NewMedicine {
    /// Validate the form and build a fresh record with a new id.
    ///
    /// Nothing is produced unless every required field is present.
    pub fn validate(self) -> Result<Medicine, ValidationError> {
        let name = required("name", &self.name)?;
        let dosage = required("dosage", &self.dosage)?;
        if self.time.trim().is_empty() {
            return Err(ValidationError::MissingField("time"));
        }
        let time: ScheduledTime = self.time.parse()?;
        let instructions = normalize_instructions(self.instructions)?;

        Ok(Medicine {
            id: Uuid::new_v4().to_string(),
            name,
            dosage,
            time,
            frequency: self.frequency.unwrap_or_default(),
            instructions,
            taken: false,
            taken_at: None,
            in_flight: false,
            last_attempt_on: None,
        })
    }
}

fn required(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

fn normalize_instructions(raw: Option<String>) -> Result<Option<String>, ValidationError> {
    let Some(text) = raw.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.chars().count() > INSTRUCTIONS_MAX_LEN {
        return Err(ValidationError::InstructionsTooLong {
            max: INSTRUCTIONS_MAX_LEN,
        });
    }
    Ok(Some(text))
}

// ═══════════════════════════════════════════════════════════
// Partial update
// ═══════════════════════════════════════════════════════════

/// Caregiver edit form. Absent fields are left as they are; blank
/// instructions clear them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MedicineEdit {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub instructions: Option<String>,
}

impl MedicineEdit {
    /// Parse the form into a patch. An edit that changes nothing is rejected.
    pub fn into_patch(self) -> Result<MedicinePatch, ValidationError> {
        let mut patch = MedicinePatch::new();
        if let Some(name) = self.name {
            patch = patch.name(name);
        }
        if let Some(dosage) = self.dosage {
            patch = patch.dosage(dosage);
        }
        if let Some(time) = self.time {
            patch = patch.time(time.parse()?);
        }
        if let Some(frequency) = self.frequency {
            patch = patch.frequency(frequency);
        }
        if let Some(instructions) = self.instructions {
            patch = patch.instructions(Some(instructions));
        }
        if patch.is_empty() {
            return Err(ValidationError::EmptyUpdate);
        }
        Ok(patch)
    }
}

/// Caregiver-editable fields applied by `MedicineStore::update`.
/// Reminder state (taken, in flight, last attempt) is never patched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MedicinePatch {
    name: Option<String>,
    dosage: Option<String>,
    time: Option<ScheduledTime>,
    frequency: Option<Frequency>,
    instructions: Option<Option<String>>,
}

impl MedicinePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn dosage(mut self, dosage: impl Into<String>) -> Self {
        self.dosage = Some(dosage.into());
        self
    }

    pub fn time(mut self, time: ScheduledTime) -> Self {
        self.time = Some(time);
        self
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = Some(instructions);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to a record. Text fields are validated like creation input.
    pub fn apply(&self, medicine: &mut Medicine) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            medicine.name = required("name", name)?;
        }
        if let Some(dosage) = &self.dosage {
            medicine.dosage = required("dosage", dosage)?;
        }
        if let Some(time) = self.time {
            medicine.time = time;
        }
        if let Some(frequency) = self.frequency {
            medicine.frequency = frequency;
        }
        if let Some(instructions) = &self.instructions {
            medicine.instructions = normalize_instructions(instructions.clone())?;
        }
        Ok(())
    }
}

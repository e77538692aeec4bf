//! Per-owner bookkeeping that never touches the database: retry deadlines
//! and the token of each outstanding dispatch.
//!
//! A dispatch token is handed to the task that awaits the notifier. When
//! the medicine is reset or deleted the token is withdrawn, so the late
//! response finds no match and is dropped.
//!
//! The ledger also remembers the last delivery failure so the dashboards
//! can tell the caregiver what needs fixing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDateTime;
use serde::Serialize;
use uuid::Uuid;

use crate::models::OwnerId;

/// A reminder the notifier could not deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    pub medicine_id: String,
    pub message: String,
    /// The transport could not start at all; settings need attention.
    pub setup_required: bool,
    pub at: NaiveDateTime,
}

#[derive(Debug, Default)]
pub struct DispatchLedger {
    retries: HashMap<String, NaiveDateTime>,
    dispatches: HashMap<String, Uuid>,
    last_failure: Option<DeliveryFailure>,
}

impl DispatchLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Retries ─────────────────────────────────────────────

    pub fn schedule_retry(&mut self, id: &str, at: NaiveDateTime) {
        self.retries.insert(id.to_string(), at);
    }

    pub fn retry_deadline(&self, id: &str) -> Option<NaiveDateTime> {
        self.retries.get(id).copied()
    }

    /// Returns true if a retry was pending.
    pub fn clear_retry(&mut self, id: &str) -> bool {
        self.retries.remove(id).is_some()
    }

    pub fn retries(&self) -> &HashMap<String, NaiveDateTime> {
        &self.retries
    }

    // ── Dispatches ──────────────────────────────────────────

    /// Start a dispatch for `id`, superseding any earlier one.
    pub fn begin_dispatch(&mut self, id: &str) -> Uuid {
        let token = Uuid::new_v4();
        self.dispatches.insert(id.to_string(), token);
        token
    }

    pub fn has_dispatch(&self, id: &str) -> bool {
        self.dispatches.contains_key(id)
    }

    /// Close the dispatch if `token` is still the current one.
    pub fn finish_dispatch(&mut self, id: &str, token: Uuid) -> bool {
        match self.dispatches.get(id) {
            Some(current) if *current == token => {
                self.dispatches.remove(id);
                true
            }
            _ => false,
        }
    }

    /// Forget whatever dispatch is outstanding for `id`.
    pub fn abandon_dispatch(&mut self, id: &str) -> bool {
        self.dispatches.remove(id).is_some()
    }

    // ── Delivery failures ───────────────────────────────────

    pub fn record_failure(&mut self, failure: DeliveryFailure) {
        self.last_failure = Some(failure);
    }

    /// Forget the last failure once a reminder got through.
    pub fn clear_failure(&mut self) {
        self.last_failure = None;
    }

    pub fn last_failure(&self) -> Option<&DeliveryFailure> {
        self.last_failure.as_ref()
    }

    // ── Cancellation ────────────────────────────────────────

    /// Drop the retry and the outstanding dispatch for `id`.
    pub fn cancel(&mut self, id: &str) {
        self.retries.remove(id);
        self.dispatches.remove(id);
    }

    /// Keep only entries whose id satisfies `keep`.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: Fn(&str) -> bool,
    {
        self.retries.retain(|id, _| keep(id.as_str()));
        self.dispatches.retain(|id, _| keep(id.as_str()));
    }
}

pub type SharedLedger = Arc<Mutex<DispatchLedger>>;

/// Lock a shared ledger. A poisoned lock still yields the data.
pub fn lock_ledger(ledger: &SharedLedger) -> MutexGuard<'_, DispatchLedger> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One ledger per owner, created on first use.
#[derive(Default)]
pub struct LedgerBook {
    ledgers: Mutex<HashMap<OwnerId, SharedLedger>>,
}

impl LedgerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_owner(&self, owner: &OwnerId) -> SharedLedger {
        self.ledgers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(owner.clone())
            .or_default()
            .clone()
    }
}

//! Writes reminder outcomes back onto the store.
//!
//! Lock order everywhere in this module and the engine: ledger first,
//! then the store's write lock.

use std::sync::Arc;

use chrono::Duration;
use uuid::Uuid;

use super::evaluator;
use super::ledger::{lock_ledger, DispatchLedger, SharedLedger};
use crate::clock::Clock;
use crate::models::{Medicine, OwnerId, Outcome};
use crate::store::{MedicineStore, StoreError};

pub struct ResponseHandler {
    owner: OwnerId,
    store: Arc<MedicineStore>,
    ledger: SharedLedger,
    clock: Arc<dyn Clock>,
    retry_delay: Duration,
}

impl ResponseHandler {
    pub fn new(
        owner: OwnerId,
        store: Arc<MedicineStore>,
        ledger: SharedLedger,
        clock: Arc<dyn Clock>,
        retry_delay: std::time::Duration,
    ) -> Self {
        Self {
            owner,
            store,
            ledger,
            clock,
            retry_delay: Duration::from_std(retry_delay).unwrap_or(Duration::minutes(5)),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    /// Apply an outcome to medicine `id`.
    ///
    /// Always clears a pending retry. `Confirmed` marks the dose taken
    /// even when nothing was in flight (the patient's own "I took it").
    /// `Declined` and `TimedOut` only act on an in-flight dose: they clear
    /// the flag and schedule a retry after the retry delay.
    pub fn record_response(&self, id: &str, outcome: Outcome) -> Result<Option<Medicine>, StoreError> {
        let mut ledger = lock_ledger(&self.ledger);
        self.apply(&mut ledger, id, outcome, false)
    }

    /// Outcome of a dispatch started by the engine. Dropped when the
    /// dispatch was withdrawn in the meantime (reset, delete, confirm).
    /// An answer that arrives after the attempt's period ended only clears
    /// the in-flight flag: it belongs to the old slot, not the new one.
    pub(crate) fn complete_dispatch(
        &self,
        id: &str,
        token: Uuid,
        outcome: Outcome,
    ) -> Result<Option<Medicine>, StoreError> {
        let mut ledger = lock_ledger(&self.ledger);
        if !ledger.finish_dispatch(id, token) {
            tracing::info!(owner = %self.owner, medicine_id = %id, outcome = %outcome, "Stale reminder response dropped");
            return Ok(None);
        }
        self.apply(&mut ledger, id, outcome, true)
    }

    fn apply(
        &self,
        ledger: &mut DispatchLedger,
        id: &str,
        outcome: Outcome,
        from_dispatch: bool,
    ) -> Result<Option<Medicine>, StoreError> {
        ledger.clear_retry(id);
        let now = self.clock.now();

        let result = self.store.modify(&self.owner, |list| {
            let Some(med) = list.iter_mut().find(|m| m.id == id) else {
                return Ok(None);
            };
            let was_in_flight = med.in_flight;
            if from_dispatch && was_in_flight && !evaluator::attempted_this_period(med, now.date()) {
                med.in_flight = false;
                return Ok(Some((med.clone(), was_in_flight, true)));
            }
            match outcome {
                Outcome::Confirmed => {
                    if med.taken {
                        med.in_flight = false;
                    } else {
                        med.mark_taken(now);
                    }
                }
                Outcome::Declined | Outcome::TimedOut => {
                    med.in_flight = false;
                }
            }
            Ok(Some((med.clone(), was_in_flight, false)))
        })?;

        let Some((med, was_in_flight, period_ended)) = result else {
            ledger.cancel(id);
            return Ok(None);
        };

        if was_in_flight {
            // The attempt is answered; a still-running dispatch must not report again.
            ledger.abandon_dispatch(id);
        }
        if period_ended {
            tracing::info!(owner = %self.owner, medicine_id = %id, outcome = %outcome, "Answer arrived after its period ended, not applied");
        } else if was_in_flight && outcome != Outcome::Confirmed {
            let at = now + self.retry_delay;
            ledger.schedule_retry(id, at);
            tracing::info!(owner = %self.owner, medicine_id = %id, outcome = %outcome, retry_at = %at, "Reminder not confirmed, retry scheduled");
        } else {
            tracing::info!(owner = %self.owner, medicine_id = %id, outcome = %outcome, taken = med.taken, "Reminder response recorded");
        }
        Ok(Some(med))
    }

    /// Caregiver reset: cancel retry and dispatch, then clear the dose.
    pub fn reset(&self, id: &str) -> Result<Option<Medicine>, StoreError> {
        let mut ledger = lock_ledger(&self.ledger);
        ledger.cancel(id);
        let med = self.store.reset(&self.owner, id)?;
        if med.is_some() {
            tracing::info!(owner = %self.owner, medicine_id = %id, "Medicine reset");
        }
        Ok(med)
    }

    /// Caregiver delete: cancel retry and dispatch, then remove the record.
    pub fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut ledger = lock_ledger(&self.ledger);
        ledger.cancel(id);
        self.store.delete(&self.owner, id)
    }
}

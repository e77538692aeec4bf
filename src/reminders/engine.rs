//! Owned reminder scheduler for one owner.
//!
//! Each tick:
//! 1. resets taken doses whose period rolled over and drops retries left
//!    over from an ended period;
//! 2. if reminders are enabled and a contact number is set, flags every
//!    due dose in flight (one save), then hands each to the notifier on
//!    its own task so a ringing phone never blocks the next tick.
//!
//! Ticks are serialized; the in-flight flag plus the ledger's dispatch
//! token keep a dose from being dispatched twice.

use std::sync::Arc;

use chrono::NaiveDateTime;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::evaluator::{self, Trigger};
use super::ledger::{lock_ledger, DeliveryFailure, SharedLedger};
use super::response::ResponseHandler;
use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::models::{Medicine, OwnerId, OwnerSettings, Outcome, ReminderPhase};
use crate::notifier::{Contact, Notifier, NotifierError};
use crate::store::{MedicineStore, PersistenceError, StoreError};

/// Why a tick dispatched nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    RemindersDisabled,
    NoContactPhone,
}

impl SkipReason {
    /// What the caregiver should do about it.
    pub fn message(&self) -> &'static str {
        match self {
            Self::RemindersDisabled => "Automatic reminders are turned off.",
            Self::NoContactPhone => "Add the patient's phone number in settings to send reminders.",
        }
    }
}

/// Who to remind for `owner`, or why nobody can be.
pub fn contact_for(owner: &OwnerId, settings: &OwnerSettings) -> Result<Contact, SkipReason> {
    if !settings.reminders_enabled {
        return Err(SkipReason::RemindersDisabled);
    }
    settings
        .contact_phone()
        .map(|phone| Contact {
            owner: owner.clone(),
            phone: phone.to_string(),
            credentials: settings.credentials.clone(),
        })
        .ok_or(SkipReason::NoContactPhone)
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub now: Option<NaiveDateTime>,
    /// Taken doses returned to untaken by the period reset.
    pub reset: Vec<String>,
    /// Retries dropped because their period ended.
    pub expired: Vec<String>,
    pub dispatched: Vec<(String, Trigger)>,
    pub skipped: Option<SkipReason>,
    handles: Vec<JoinHandle<()>>,
}

impl TickReport {
    pub fn dispatched_ids(&self) -> Vec<&str> {
        self.dispatched.iter().map(|(id, _)| id.as_str()).collect()
    }

    /// Wait for every dispatch started by this tick to record its outcome.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Scheduler status of one medicine, for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MedicineStatus {
    pub id: String,
    pub phase: ReminderPhase,
    pub retry_at: Option<NaiveDateTime>,
}

/// Whether reminders can reach the patient right now.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeliveryStatus {
    /// Transport this owner's reminders go through.
    pub transport: &'static str,
    pub blocked: Option<SkipReason>,
    pub blocked_message: Option<&'static str>,
    pub last_failure: Option<DeliveryFailure>,
}

pub struct ReminderEngine {
    owner: OwnerId,
    store: Arc<MedicineStore>,
    ledger: SharedLedger,
    responses: Arc<ResponseHandler>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    tick_lock: Mutex<()>,
}

impl ReminderEngine {
    pub fn new(
        owner: OwnerId,
        store: Arc<MedicineStore>,
        ledger: SharedLedger,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let responses = Arc::new(ResponseHandler::new(
            owner.clone(),
            store.clone(),
            ledger.clone(),
            clock.clone(),
            config.retry_delay,
        ));
        Self {
            owner,
            store,
            ledger,
            responses,
            notifier,
            clock,
            config,
            tick_lock: Mutex::new(()),
        }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn responses(&self) -> &Arc<ResponseHandler> {
        &self.responses
    }

    /// Run one evaluation pass.
    pub async fn tick(&self) -> Result<TickReport, StoreError> {
        let _serial = self.tick_lock.lock().await;
        let now = self.clock.now();
        let today = now.date();
        let policy = self.config.trigger_policy;

        let settings = self.store.load_settings(&self.owner)?;
        let contact = contact_for(&self.owner, &settings);

        let mut report = TickReport {
            now: Some(now),
            ..Default::default()
        };

        let due: Vec<(Medicine, Trigger, Uuid)> = {
            let mut ledger = lock_ledger(&self.ledger);
            let dispatch_enabled = contact.is_ok();
            let (reset, expired, due) = self.store.modify(&self.owner, |list| {
                ledger.retain(|id| list.iter().any(|m| m.id == id));
                let reset = evaluator::apply_period_reset(list, today);
                let expired = evaluator::expired_retries(list, ledger.retries(), today);
                for id in &expired {
                    ledger.clear_retry(id);
                }
                if !dispatch_enabled {
                    return Ok((reset, expired, Vec::new()));
                }
                let due = evaluator::select_due(list, ledger.retries(), now, policy);
                let mut flagged = Vec::with_capacity(due.len());
                for (id, trigger) in due {
                    if let Some(med) = list.iter_mut().find(|m| m.id == id) {
                        med.in_flight = true;
                        med.last_attempt_on = Some(today);
                        flagged.push((med.clone(), trigger));
                    }
                }
                Ok((reset, expired, flagged))
            })?;
            report.reset = reset;
            report.expired = expired;
            due.into_iter()
                .map(|(med, trigger)| {
                    ledger.clear_retry(&med.id);
                    let token = ledger.begin_dispatch(&med.id);
                    (med, trigger, token)
                })
                .collect()
        };

        for id in &report.reset {
            tracing::info!(owner = %self.owner, medicine_id = %id, "New period, dose reset");
        }
        for id in &report.expired {
            tracing::info!(owner = %self.owner, medicine_id = %id, "Retry dropped, its period has ended");
        }

        let contact = match contact {
            Ok(contact) => contact,
            Err(reason) => {
                tracing::debug!(owner = %self.owner, reason = ?reason, "Tick skipped dispatch");
                report.skipped = Some(reason);
                return Ok(report);
            }
        };

        for (med, trigger, token) in due {
            tracing::info!(
                owner = %self.owner,
                medicine_id = %med.id,
                name = %med.name,
                trigger = trigger.as_str(),
                transport = self.notifier.transport_for(&contact),
                "Reminder due, dispatching"
            );
            report.dispatched.push((med.id.clone(), trigger));
            report.handles.push(self.spawn_dispatch(med, contact.clone(), token));
        }

        Ok(report)
    }

    fn spawn_dispatch(&self, med: Medicine, contact: Contact, token: Uuid) -> JoinHandle<()> {
        let notifier = self.notifier.clone();
        let responses = self.responses.clone();
        let ledger = self.ledger.clone();
        let clock = self.clock.clone();
        let timeout = self.config.in_flight_timeout;

        tokio::spawn(async move {
            let outcome = match tokio::time::timeout(timeout, notifier.attempt_reminder(&med, &contact)).await {
                Ok(Ok(outcome)) => {
                    lock_ledger(&ledger).clear_failure();
                    outcome
                }
                Ok(Err(e)) => {
                    tracing::warn!(owner = %contact.owner, medicine_id = %med.id, error = %e, "Reminder delivery failed, treating as no response");
                    lock_ledger(&ledger).record_failure(DeliveryFailure {
                        medicine_id: med.id.clone(),
                        message: e.to_string(),
                        setup_required: matches!(e, NotifierError::NotConfigured(_)),
                        at: clock.now(),
                    });
                    Outcome::TimedOut
                }
                Err(_) => {
                    tracing::warn!(owner = %contact.owner, medicine_id = %med.id, timeout_secs = timeout.as_secs(), "No answer within in-flight timeout");
                    Outcome::TimedOut
                }
            };
            if let Err(e) = responses.complete_dispatch(&med.id, token, outcome) {
                tracing::error!(owner = %contact.owner, medicine_id = %med.id, error = %e, "Cannot record reminder outcome");
            }
        })
    }

    /// Repair state left behind by a previous run. Called on activation.
    ///
    /// A dose flagged in flight with no live dispatch here is treated as
    /// timed out. A dose attempted this period, still untaken and with no
    /// retry pending gets one, so a restart never loses a retry. Flags
    /// left over from an ended period are cleared without a retry.
    pub fn recover(&self) -> Result<Vec<String>, StoreError> {
        let now = self.clock.now();
        let today = now.date();
        let mut ledger = lock_ledger(&self.ledger);

        let recovered = self.store.modify(&self.owner, |list| {
            let mut ids = Vec::new();
            for med in list.iter_mut() {
                if ledger.has_dispatch(&med.id) || med.taken {
                    continue;
                }
                let current = evaluator::attempted_this_period(med, today);
                let stale_flag = med.in_flight;
                let lost_retry = current && ledger.retry_deadline(&med.id).is_none();
                if stale_flag || lost_retry {
                    med.in_flight = false;
                    if current {
                        ids.push(med.id.clone());
                    }
                }
            }
            Ok(ids)
        })?;

        if let Ok(delay) = chrono::Duration::from_std(self.config.retry_delay) {
            for id in &recovered {
                ledger.schedule_retry(id, now + delay);
                tracing::info!(owner = %self.owner, medicine_id = %id, "Recovered interrupted reminder, retry scheduled");
            }
        }
        Ok(recovered)
    }

    /// Phase of every medicine on the list, in list order.
    pub fn statuses(&self) -> Vec<MedicineStatus> {
        let now = self.clock.now();
        let ledger = lock_ledger(&self.ledger);
        self.store
            .load(&self.owner)
            .iter()
            .map(|med| {
                let retry_at = ledger
                    .retry_deadline(&med.id)
                    .filter(|_| evaluator::attempted_this_period(med, now.date()));
                MedicineStatus {
                    id: med.id.clone(),
                    phase: evaluator::phase(med, retry_at, now, self.config.trigger_policy),
                    retry_at,
                }
            })
            .collect()
    }

    /// Transport, blocking settings and last failure for this owner.
    pub fn delivery_status(&self) -> Result<DeliveryStatus, PersistenceError> {
        let settings = self.store.load_settings(&self.owner)?;
        let blocked = contact_for(&self.owner, &settings).err();
        let contact = Contact {
            owner: self.owner.clone(),
            phone: settings.contact_phone().unwrap_or_default().to_string(),
            credentials: settings.credentials.clone(),
        };
        let last_failure = lock_ledger(&self.ledger).last_failure().cloned();
        Ok(DeliveryStatus {
            transport: self.notifier.transport_for(&contact),
            blocked,
            blocked_message: blocked.map(|reason| reason.message()),
            last_failure,
        })
    }

    /// Start the tick loop. The first tick runs immediately.
    pub fn start(self: &Arc<Self>) -> EngineHandle {
        if let Err(e) = self.recover() {
            tracing::error!(owner = %self.owner, error = %e, "Reminder recovery failed");
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let engine = Arc::clone(self);
        let interval = self.config.tick_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(owner = %engine.owner, tick_secs = interval.as_secs(), "Reminder engine started");

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = engine.tick().await {
                            tracing::error!(owner = %engine.owner, error = %e, "Reminder tick failed");
                        }
                    }
                }
            }

            tracing::info!(owner = %engine.owner, "Reminder engine stopped");
        });

        EngineHandle {
            owner: self.owner.clone(),
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Handle to a running engine loop. Dropping it stops the loop;
/// dispatches already started keep running and record their outcome.
pub struct EngineHandle {
    owner: OwnerId,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl EngineHandle {
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!(owner = %self.owner, "Reminder engine shutdown signal sent");
        }
    }

    /// Stop and wait for the loop to exit.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

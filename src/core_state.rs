//! Transport-agnostic application state.
//!
//! `CoreState` is built once at startup and shared (behind `Arc`) by the
//! HTTP API and the background tasks. It owns the store, the change bus,
//! the notifier, and the set of owners whose reminder engine is running.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::{self, AppConfig};
use crate::db::{self, Database};
use crate::events::ChangeBus;
use crate::models::OwnerId;
use crate::notifier::{build_notifier, CallRegistry, Notifier, PromptBoard};
use crate::reminders::{EngineHandle, LedgerBook, ReminderEngine, ResponseHandler};
use crate::roles::{CaregiverActions, PatientActions};
use crate::store::MedicineStore;
use crate::watcher::{start_watcher, WatcherHandle};

/// An owner whose engine and watcher are running.
struct ActiveOwner {
    engine: Arc<ReminderEngine>,
    engine_handle: EngineHandle,
    watcher: WatcherHandle,
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    config: AppConfig,
    store: Arc<MedicineStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    prompts: Arc<PromptBoard>,
    calls: Arc<CallRegistry>,
    /// Client for the calling backend; shared with the telephony notifier.
    http: reqwest::Client,
    ledgers: LedgerBook,
    active: Mutex<HashMap<OwnerId, ActiveOwner>>,
}

impl CoreState {
    /// Open the database under `config.data_dir` and build the state.
    pub fn open(config: AppConfig) -> Result<Self, CoreError> {
        let path = config::database_path(&config.data_dir);
        tracing::info!(path = %path.display(), "Opening medicine database");
        let db = Database::open(&path)?;
        Self::new(config, db)
    }

    pub fn new(config: AppConfig, db: Database) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config::BACKEND_TIMEOUT_SECS))
            .build()?;
        let prompts = Arc::new(PromptBoard::new());
        let calls = Arc::new(CallRegistry::new());
        let notifier = build_notifier(&config.telephony, http.clone(), prompts.clone(), calls.clone());
        Ok(Self::assemble(config, db, Arc::new(SystemClock), notifier, prompts, calls, http))
    }

    fn assemble(
        config: AppConfig,
        db: Database,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        prompts: Arc<PromptBoard>,
        calls: Arc<CallRegistry>,
        http: reqwest::Client,
    ) -> Self {
        let store = Arc::new(MedicineStore::new(Arc::new(db), Arc::new(ChangeBus::new())));
        Self {
            config,
            store,
            clock,
            notifier,
            prompts,
            calls,
            http,
            ledgers: LedgerBook::new(),
            active: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory state with an injected clock and notifier.
    #[cfg(test)]
    pub(crate) fn for_tests(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Arc<Self> {
        let http = reqwest::Client::new();
        let prompts = Arc::new(PromptBoard::new());
        let calls = Arc::new(CallRegistry::new());
        let notifier = notifier.unwrap_or_else(|| {
            build_notifier(&config.telephony, http.clone(), prompts.clone(), calls.clone())
        });
        let db = Database::open_in_memory().unwrap();
        Arc::new(Self::assemble(config, db, clock, notifier, prompts, calls, http))
    }

    // ── Accessors ───────────────────────────────────────────

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<MedicineStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<ChangeBus> {
        self.store.bus()
    }

    pub fn prompts(&self) -> &Arc<PromptBoard> {
        &self.prompts
    }

    pub fn calls(&self) -> &Arc<CallRegistry> {
        &self.calls
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn notifier_kind(&self) -> &'static str {
        self.notifier.kind()
    }

    // ── Per-owner handles ───────────────────────────────────

    /// Response handler for `owner`. It shares the owner's ledger with the
    /// running engine, if any, so cancellations reach in-flight dispatches.
    pub fn responses_for(&self, owner: &OwnerId) -> Arc<ResponseHandler> {
        Arc::new(ResponseHandler::new(
            owner.clone(),
            self.store.clone(),
            self.ledgers.for_owner(owner),
            self.clock.clone(),
            self.config.scheduler.retry_delay,
        ))
    }

    pub fn caregiver(&self, owner: &OwnerId) -> CaregiverActions {
        CaregiverActions::new(self.store.clone(), self.responses_for(owner))
    }

    pub fn patient(&self, owner: &OwnerId) -> PatientActions {
        PatientActions::new(self.store.clone(), self.responses_for(owner))
    }

    /// The running engine for `owner`, or an idle one over the same state.
    pub fn engine_for(&self, owner: &OwnerId) -> Arc<ReminderEngine> {
        if let Some(active) = self.active().get(owner) {
            return active.engine.clone();
        }
        Arc::new(self.build_engine(owner))
    }

    fn build_engine(&self, owner: &OwnerId) -> ReminderEngine {
        ReminderEngine::new(
            owner.clone(),
            self.store.clone(),
            self.ledgers.for_owner(owner),
            self.notifier.clone(),
            self.clock.clone(),
            self.config.scheduler.clone(),
        )
    }

    // ── Activation ──────────────────────────────────────────

    fn active(&self) -> MutexGuard<'_, HashMap<OwnerId, ActiveOwner>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self, owner: &OwnerId) -> bool {
        self.active().contains_key(owner)
    }

    /// Start the owner's reminder engine and store watcher.
    ///
    /// Returns false if they were already running. Must be called from
    /// inside a tokio runtime.
    pub fn activate(&self, owner: &OwnerId) -> bool {
        let mut active = self.active();
        if active.contains_key(owner) {
            return false;
        }

        let engine = Arc::new(self.build_engine(owner));
        let engine_handle = engine.start();
        let watcher = start_watcher(self.store.clone(), owner.clone(), self.config.watch_interval);
        active.insert(
            owner.clone(),
            ActiveOwner {
                engine,
                engine_handle,
                watcher,
            },
        );
        tracing::info!(owner = %owner, transport = self.notifier.kind(), "Owner activated");
        true
    }

    /// Stop the owner's engine and watcher. Dispatches already started
    /// keep running and still record their outcome.
    pub async fn deactivate(&self, owner: &OwnerId) -> bool {
        let removed = self.active().remove(owner);
        match removed {
            Some(active) => {
                active.engine_handle.stop().await;
                active.watcher.stop().await;
                tracing::info!(owner = %owner, "Owner deactivated");
                true
            }
            None => false,
        }
    }

    /// Stop every running owner. Used on server shutdown.
    pub async fn deactivate_all(&self) {
        let drained: Vec<ActiveOwner> = self.active().drain().map(|(_, a)| a).collect();
        for active in drained {
            active.engine_handle.stop().await;
            active.watcher.stop().await;
        }
    }

    pub fn active_owners(&self) -> Vec<OwnerId> {
        let mut owners: Vec<OwnerId> = self.active().keys().cloned().collect();
        owners.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        owners
    }
}

/// Errors from building the core state.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Cannot build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

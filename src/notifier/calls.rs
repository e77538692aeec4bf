//! Outstanding phone calls, keyed by the provider's call id.
//!
//! The caller's answer arrives on a separate HTTP request. Whichever side
//! shows up first wins: an outcome posted before the call is registered
//! is kept and delivered on registration.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use super::NotifierError;
use crate::models::Outcome;

/// Early outcomes kept for calls nobody has registered yet.
const EARLY_OUTCOME_CAPACITY: usize = 128;

#[derive(Default)]
struct Calls {
    waiting: HashMap<String, oneshot::Sender<Outcome>>,
    early: HashMap<String, Outcome>,
    early_order: VecDeque<String>,
}

#[derive(Default)]
pub struct CallRegistry {
    inner: Mutex<Calls>,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn calls(&self) -> MutexGuard<'_, Calls> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start waiting for `call_id`. Dropping the returned handle unregisters it.
    pub fn register(self: &Arc<Self>, call_id: &str) -> PendingCall {
        let (tx, rx) = oneshot::channel();
        {
            let mut calls = self.calls();
            match calls.early.remove(call_id) {
                Some(outcome) => {
                    calls.early_order.retain(|id| id != call_id);
                    let _ = tx.send(outcome);
                }
                None => {
                    calls.waiting.insert(call_id.to_string(), tx);
                }
            }
        }
        PendingCall {
            call_id: call_id.to_string(),
            registry: Arc::clone(self),
            rx,
        }
    }

    /// Deliver the caller's answer. Returns true if a waiter received it;
    /// otherwise it is kept for a later registration.
    pub fn resolve(&self, call_id: &str, outcome: Outcome) -> bool {
        let mut calls = self.calls();
        if let Some(tx) = calls.waiting.remove(call_id) {
            return tx.send(outcome).is_ok();
        }
        if calls.early_order.len() >= EARLY_OUTCOME_CAPACITY {
            if let Some(oldest) = calls.early_order.pop_front() {
                calls.early.remove(&oldest);
            }
        }
        if calls.early.insert(call_id.to_string(), outcome).is_none() {
            calls.early_order.push_back(call_id.to_string());
        }
        false
    }

    /// Resolve only a call that is already waiting. Status callbacks use
    /// this so a late "completed" never overrides a gathered answer.
    pub fn resolve_if_waiting(&self, call_id: &str, outcome: Outcome) -> bool {
        match self.calls().waiting.remove(call_id) {
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }

    pub fn waiting_count(&self) -> usize {
        self.calls().waiting.len()
    }

    fn unregister(&self, call_id: &str) {
        self.calls().waiting.remove(call_id);
    }
}

/// Handle held by the task awaiting a call's outcome.
pub struct PendingCall {
    call_id: String,
    registry: Arc<CallRegistry>,
    rx: oneshot::Receiver<Outcome>,
}

impl PendingCall {
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub async fn outcome(mut self) -> Result<Outcome, NotifierError> {
        (&mut self.rx).await.map_err(|_| NotifierError::Dismissed)
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.registry.unregister(&self.call_id);
    }
}

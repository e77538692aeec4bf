//! Local prompt transport: the reminder is shown in the patient's view
//! and answered there with a yes/no.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{Contact, Notifier, NotifierError};
use crate::models::{Medicine, OwnerId, Outcome};
use crate::voice::reminder_message;

/// A reminder waiting for the patient's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub id: String,
    pub owner: OwnerId,
    pub medicine_id: String,
    pub medicine_name: String,
    pub dosage: String,
    pub message: String,
    pub posted_at: String,
}

struct Posted {
    prompt: Prompt,
    answer_tx: oneshot::Sender<bool>,
}

/// Prompts currently on screen, across all owners.
#[derive(Default)]
pub struct PromptBoard {
    posted: Mutex<HashMap<String, Posted>>,
}

impl PromptBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn posted(&self) -> MutexGuard<'_, HashMap<String, Posted>> {
        self.posted.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Put a prompt up. It stays until answered, withdrawn, or the
    /// returned handle is dropped.
    pub fn post(self: &Arc<Self>, prompt: Prompt) -> PendingPrompt {
        let (answer_tx, rx) = oneshot::channel();
        let id = prompt.id.clone();
        self.posted().insert(id.clone(), Posted { prompt, answer_tx });
        PendingPrompt {
            id,
            board: Arc::clone(self),
            rx,
        }
    }

    /// Open prompts for `owner`, oldest first.
    pub fn list(&self, owner: &OwnerId) -> Vec<Prompt> {
        let mut prompts: Vec<Prompt> = self
            .posted()
            .values()
            .filter(|p| &p.prompt.owner == owner)
            .map(|p| p.prompt.clone())
            .collect();
        prompts.sort_by(|a, b| a.posted_at.cmp(&b.posted_at));
        prompts
    }

    /// Answer a prompt. Returns false if it is no longer open.
    pub fn answer(&self, prompt_id: &str, confirmed: bool) -> bool {
        match self.posted().remove(prompt_id) {
            Some(posted) => posted.answer_tx.send(confirmed).is_ok(),
            None => false,
        }
    }

    /// Take a prompt down without an answer.
    pub fn withdraw(&self, prompt_id: &str) -> bool {
        self.posted().remove(prompt_id).is_some()
    }
}

pub struct PendingPrompt {
    id: String,
    board: Arc<PromptBoard>,
    rx: oneshot::Receiver<bool>,
}

impl PendingPrompt {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn outcome(mut self) -> Result<Outcome, NotifierError> {
        match (&mut self.rx).await {
            Ok(true) => Ok(Outcome::Confirmed),
            Ok(false) => Ok(Outcome::Declined),
            Err(_) => Err(NotifierError::Dismissed),
        }
    }
}

impl Drop for PendingPrompt {
    fn drop(&mut self) {
        self.board.withdraw(&self.id);
    }
}

pub struct LocalPromptNotifier {
    board: Arc<PromptBoard>,
}

impl LocalPromptNotifier {
    pub fn new(board: Arc<PromptBoard>) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Notifier for LocalPromptNotifier {
    fn kind(&self) -> &'static str {
        "prompt"
    }

    async fn attempt_reminder(
        &self,
        medicine: &Medicine,
        contact: &Contact,
    ) -> Result<Outcome, NotifierError> {
        let pending = self.board.post(Prompt {
            id: Uuid::new_v4().to_string(),
            owner: contact.owner.clone(),
            medicine_id: medicine.id.clone(),
            medicine_name: medicine.name.clone(),
            dosage: medicine.dosage.clone(),
            message: reminder_message(&medicine.name),
            posted_at: chrono::Utc::now().to_rfc3339(),
        });
        tracing::info!(owner = %contact.owner, medicine_id = %medicine.id, prompt_id = %pending.id(), "Reminder prompt posted");
        pending.outcome().await
    }
}

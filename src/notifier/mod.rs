//! Reminder delivery.
//!
//! The scheduler only knows `Notifier::attempt_reminder`. `build_notifier`
//! returns an `OwnerRoutedNotifier` that picks the transport per contact:
//! - `telephony`: a hosted calling backend rings the patient and the
//!   answer comes back through the call-flow callbacks. Used when a
//!   backend is configured and the owner saved complete credentials.
//! - `prompt`: a local on-screen prompt the patient answers in a view.

pub mod calls;
pub mod prompt;
pub mod routing;
pub mod telephony;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::TelephonyConfig;
use crate::models::{CallingCredentials, Medicine, OwnerId, Outcome};

pub use calls::{CallRegistry, PendingCall};
pub use prompt::{LocalPromptNotifier, PendingPrompt, Prompt, PromptBoard};
pub use routing::OwnerRoutedNotifier;
pub use telephony::TelephonyNotifier;

/// Who a reminder is delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub owner: OwnerId,
    pub phone: String,
    #[serde(skip)]
    pub credentials: CallingCredentials,
}

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Reminder delivery not configured: {0}")]
    NotConfigured(String),

    #[error("Calling backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Calling backend rejected the call ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Calling backend reply missing call id")]
    MalformedReply,

    #[error("Reminder withdrawn before an answer arrived")]
    Dismissed,
}

/// One reminder attempt: deliver, wait for the patient, report the outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short transport name for logs and health output.
    fn kind(&self) -> &'static str;

    /// Transport a reminder to `contact` would go through.
    fn transport_for(&self, _contact: &Contact) -> &'static str {
        self.kind()
    }

    async fn attempt_reminder(
        &self,
        medicine: &Medicine,
        contact: &Contact,
    ) -> Result<Outcome, NotifierError>;
}

/// Build the notifier for this process. The local prompt is always
/// available; phone calls only when a backend is configured.
pub fn build_notifier(
    config: &TelephonyConfig,
    client: reqwest::Client,
    prompts: Arc<PromptBoard>,
    calls: Arc<CallRegistry>,
) -> Arc<dyn Notifier> {
    let prompt: Arc<dyn Notifier> = Arc::new(LocalPromptNotifier::new(prompts));
    let telephony: Option<Arc<dyn Notifier>> = match &config.backend_url {
        Some(url) => {
            tracing::info!(backend = %url, "Owners with calling credentials are reminded by phone call");
            let telephony: Arc<dyn Notifier> = Arc::new(TelephonyNotifier::new(client, url.clone(), calls));
            Some(telephony)
        }
        None => {
            tracing::info!("No calling backend configured, reminders delivered as local prompts");
            None
        }
    };
    Arc::new(OwnerRoutedNotifier::new(prompt, telephony))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted notifier for scheduler tests.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, Copy)]
    pub enum Step {
        Reply(Outcome),
        Fail,
        /// Never answers.
        Hang,
    }

    /// Plays back scripted steps in order, then declines.
    #[derive(Default)]
    pub struct ScriptedNotifier {
        kind: &'static str,
        steps: Mutex<VecDeque<Step>>,
        attempts: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedNotifier {
        pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
            Self::named("scripted", steps)
        }

        /// Same, reporting `kind` as its transport name.
        pub fn named(kind: &'static str, steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                steps: Mutex::new(steps.into_iter().collect()),
                attempts: Mutex::new(Vec::new()),
            })
        }

        /// `(medicine_id, phone)` of every attempt so far.
        pub fn attempts(&self) -> Vec<(String, String)> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for ScriptedNotifier {
        fn kind(&self) -> &'static str {
            self.kind
        }

        async fn attempt_reminder(
            &self,
            medicine: &Medicine,
            contact: &Contact,
        ) -> Result<Outcome, NotifierError> {
            self.attempts
                .lock()
                .unwrap()
                .push((medicine.id.clone(), contact.phone.clone()));
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Reply(Outcome::Declined));
            match step {
                Step::Reply(outcome) => Ok(outcome),
                Step::Fail => Err(NotifierError::NotConfigured("scripted failure".into())),
                Step::Hang => std::future::pending().await,
            }
        }
    }
}

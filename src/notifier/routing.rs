//! Per-owner transport choice.
//!
//! Owners who saved complete calling credentials are rung through the
//! calling backend; everyone else gets the local prompt.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Contact, Notifier, NotifierError};
use crate::models::{Medicine, Outcome};

pub struct OwnerRoutedNotifier {
    prompt: Arc<dyn Notifier>,
    telephony: Option<Arc<dyn Notifier>>,
}

impl OwnerRoutedNotifier {
    pub fn new(prompt: Arc<dyn Notifier>, telephony: Option<Arc<dyn Notifier>>) -> Self {
        Self { prompt, telephony }
    }

    fn route(&self, contact: &Contact) -> &Arc<dyn Notifier> {
        match &self.telephony {
            Some(telephony) if contact.credentials.is_complete() => telephony,
            _ => &self.prompt,
        }
    }
}

#[async_trait]
impl Notifier for OwnerRoutedNotifier {
    /// The best transport this process can offer.
    fn kind(&self) -> &'static str {
        self.telephony
            .as_ref()
            .map_or_else(|| self.prompt.kind(), |t| t.kind())
    }

    fn transport_for(&self, contact: &Contact) -> &'static str {
        self.route(contact).kind()
    }

    async fn attempt_reminder(
        &self,
        medicine: &Medicine,
        contact: &Contact,
    ) -> Result<Outcome, NotifierError> {
        self.route(contact).attempt_reminder(medicine, contact).await
    }
}

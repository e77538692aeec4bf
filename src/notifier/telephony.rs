//! Phone-call transport through the hosted calling backend.
//!
//! The backend places the call with the owner's provider credentials,
//! which travel in the request body; the patient's answer reaches us later
//! through `/api/handle-response` or `/api/call-status`, which resolve the
//! call in the `CallRegistry`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CallRegistry, Contact, Notifier, NotifierError};
use crate::models::{CallingCredentials, Medicine, Outcome};

/// Body of `POST <backend>/make-call`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MakeCallRequest {
    pub phone: String,
    pub medicine_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    /// Caller id the provider rings from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_number: Option<String>,
}

/// Fields we read from the backend's reply.
#[derive(Debug, Default, Deserialize)]
pub struct MakeCallReply {
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

pub struct TelephonyNotifier {
    client: reqwest::Client,
    backend_url: String,
    calls: Arc<CallRegistry>,
}

impl TelephonyNotifier {
    pub fn new(client: reqwest::Client, backend_url: String, calls: Arc<CallRegistry>) -> Self {
        Self {
            client,
            backend_url,
            calls,
        }
    }

    /// Ask the backend to ring `phone`. Returns the provider call id.
    ///
    /// Without `credentials` the backend falls back to its own account.
    pub async fn place_call(
        &self,
        phone: &str,
        medicine_name: &str,
        credentials: Option<&CallingCredentials>,
    ) -> Result<String, NotifierError> {
        let credentials = credentials.cloned().unwrap_or_default();
        let response = self
            .client
            .post(format!("{}/make-call", self.backend_url))
            .json(&MakeCallRequest {
                phone: phone.to_string(),
                medicine_name: medicine_name.to_string(),
                account_sid: credentials.account_sid,
                auth_token: credentials.auth_token,
                from_number: credentials.phone_number,
            })
            .send()
            .await?;

        let status = response.status();
        let reply: MakeCallReply = response.json().await.unwrap_or_default();
        if !status.is_success() {
            return Err(NotifierError::Rejected {
                status: status.as_u16(),
                message: reply
                    .error
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            });
        }
        reply
            .call_sid
            .filter(|sid| !sid.trim().is_empty())
            .ok_or(NotifierError::MalformedReply)
    }
}

#[async_trait]
impl Notifier for TelephonyNotifier {
    fn kind(&self) -> &'static str {
        "telephony"
    }

    async fn attempt_reminder(
        &self,
        medicine: &Medicine,
        contact: &Contact,
    ) -> Result<Outcome, NotifierError> {
        let phone = contact.phone.trim();
        if phone.is_empty() {
            return Err(NotifierError::NotConfigured("patient phone number is empty".into()));
        }

        let call_id = self
            .place_call(phone, &medicine.name, Some(&contact.credentials))
            .await?;
        tracing::info!(owner = %contact.owner, medicine_id = %medicine.id, call_id = %call_id, "Reminder call placed");

        self.calls.register(&call_id).outcome().await
    }
}

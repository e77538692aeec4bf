//! Calling proxy and call-flow callbacks.
//!
//! - `POST /api/make-call`: forwards to the calling backend
//! - `GET|POST /api/voice-webhook`: call-flow document (forwarded or local)
//! - `POST /api/handle-response`: the caller's gathered answer
//! - `POST /api/call-status`: provider status callback
//!
//! Proxy responses keep the `{status, error}` shape the calling backend
//! uses rather than the structured API error body.

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::config::DEFAULT_SPOKEN_MEDICINE;
use crate::notifier::{NotifierError, TelephonyNotifier};
use crate::voice;

#[derive(Debug, Default, Deserialize)]
pub struct MakeCallBody {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub medicine_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MakeCallResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MakeCallResponse {
    fn failed(status: StatusCode, error: impl Into<String>) -> Response {
        let body = Self {
            status: "failed",
            call_id: None,
            error: Some(error.into()),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct MedicineQuery {
    pub medicine: Option<String>,
}

impl MedicineQuery {
    fn name(&self) -> &str {
        self.medicine
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_SPOKEN_MEDICINE)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GatherForm {
    #[serde(rename = "Digits")]
    pub digits: Option<String>,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "CallStatus")]
    pub call_status: Option<String>,
}

fn xml(body: String) -> Response {
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn backend_url(ctx: &ApiContext) -> Option<&str> {
    ctx.core.config().telephony.backend_url.as_deref()
}

// ── make-call ───────────────────────────────────────────────

/// `POST /api/make-call`
pub async fn make_call(
    State(ctx): State<ApiContext>,
    body: Result<Json<MakeCallBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let Some(phone) = body.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(MakeCallResponse::failed(StatusCode::BAD_REQUEST, "Phone number is required"));
    };
    let Some(backend) = backend_url(&ctx) else {
        return Err(ApiError::NotConfigured("No calling backend configured".into()));
    };

    let medicine = body
        .medicine_name
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_SPOKEN_MEDICINE);

    let caller = TelephonyNotifier::new(
        ctx.core.http().clone(),
        backend.to_string(),
        ctx.core.calls().clone(),
    );
    let response = match caller.place_call(phone, medicine, None).await {
        Ok(call_id) => {
            tracing::info!(call_id = %call_id, "Call initiated");
            let body = MakeCallResponse {
                status: "initiated",
                call_id: Some(call_id),
                error: None,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(NotifierError::Rejected { status, message }) => {
            tracing::warn!(status, error = %message, "Calling backend rejected the call");
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            MakeCallResponse::failed(status, message)
        }
        Err(NotifierError::MalformedReply) => {
            tracing::warn!("Calling backend returned no call id");
            MakeCallResponse::failed(StatusCode::BAD_GATEWAY, "Calling backend returned no call id")
        }
        Err(e) => {
            tracing::error!(error = %e, "Make call failed");
            MakeCallResponse::failed(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    };
    Ok(response)
}

// ── voice-webhook ───────────────────────────────────────────

/// `GET /api/voice-webhook?medicine=<name>`
pub async fn voice_webhook(
    State(ctx): State<ApiContext>,
    Query(query): Query<MedicineQuery>,
) -> Result<Response, ApiError> {
    let medicine = query.name();
    let Some(backend) = backend_url(&ctx) else {
        return Ok(render_local(&ctx, medicine));
    };

    let request = ctx
        .core
        .http()
        .get(format!("{backend}/voice-webhook"))
        .query(&[("medicine", medicine)]);
    forward_document(request).await
}

/// `POST /api/voice-webhook` (form-encoded provider callback)
pub async fn voice_webhook_post(
    State(ctx): State<ApiContext>,
    Query(query): Query<MedicineQuery>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Response, ApiError> {
    let Some(backend) = backend_url(&ctx) else {
        return Ok(render_local(&ctx, query.name()));
    };

    let mut request = ctx
        .core
        .http()
        .post(format!("{backend}/voice-webhook"))
        .form(&form);
    if let Some(medicine) = &query.medicine {
        request = request.query(&[("medicine", medicine)]);
    }
    forward_document(request).await
}

fn render_local(ctx: &ApiContext, medicine: &str) -> Response {
    let action = voice::handle_response_url(&ctx.core.config().public_base_url(), medicine);
    xml(voice::render_call_flow(medicine, &action))
}

async fn forward_document(request: reqwest::RequestBuilder) -> Result<Response, ApiError> {
    let forward_failed = |e: reqwest::Error| ApiError::Internal(format!("Voice webhook forwarding failed: {e}"));
    let response = request.send().await.map_err(forward_failed)?;
    let text = response.text().await.map_err(forward_failed)?;
    Ok(xml(text))
}

// ── call-flow callbacks ─────────────────────────────────────

/// `POST /api/handle-response`
pub async fn handle_response(
    State(ctx): State<ApiContext>,
    Query(query): Query<MedicineQuery>,
    Form(form): Form<GatherForm>,
) -> Response {
    let outcome = voice::classify_reply(form.digits.as_deref(), form.speech_result.as_deref());
    let call_sid = form.call_sid.as_deref().map(str::trim).filter(|s| !s.is_empty());

    match call_sid {
        Some(sid) => {
            let delivered = ctx.core.calls().resolve(sid, outcome);
            tracing::info!(call_id = %sid, medicine = %query.name(), outcome = %outcome, delivered, "Caller answered");
        }
        None => {
            tracing::warn!(outcome = %outcome, "Caller answer without call id");
        }
    }
    xml(voice::render_closing(outcome))
}

/// `POST /api/call-status`
pub async fn call_status(State(ctx): State<ApiContext>, Form(form): Form<StatusForm>) -> StatusCode {
    let sid = form.call_sid.as_deref().unwrap_or_default().trim();
    let status = form.call_status.as_deref().unwrap_or_default();
    tracing::info!(call_id = %sid, status, "Call status update");

    if !sid.is_empty() && voice::is_unanswered_terminal(status) {
        let resolved = ctx
            .core
            .calls()
            .resolve_if_waiting(sid, crate::models::Outcome::TimedOut);
        if resolved {
            tracing::info!(call_id = %sid, status, "Call ended without an answer");
        }
    }
    StatusCode::OK
}

//! API router.
//!
//! Returns a composable `Router`. REST routes are nested under `/api/`,
//! the change stream lives at `/ws/owners/:owner`.

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints::{calls, health, medicines, reminders, settings};
use crate::api::types::ApiContext;
use crate::api::websocket;
use crate::core_state::CoreState;

/// Build the full router over `core`.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let api = Router::new()
        .route("/health", get(health::check))
        // Calling proxy and call-flow callbacks
        .route("/make-call", post(calls::make_call))
        .route(
            "/voice-webhook",
            get(calls::voice_webhook).post(calls::voice_webhook_post),
        )
        .route("/handle-response", post(calls::handle_response))
        .route("/call-status", post(calls::call_status))
        // Medicine list (caregiver + patient)
        .route(
            "/owners/:owner/medicines",
            get(medicines::list).post(medicines::create),
        )
        .route(
            "/owners/:owner/medicines/:id",
            patch(medicines::edit).delete(medicines::delete),
        )
        .route("/owners/:owner/medicines/:id/reset", post(medicines::reset))
        .route("/owners/:owner/medicines/:id/taken", post(medicines::mark_taken))
        .route("/owners/:owner/summary", get(medicines::summary))
        .route(
            "/owners/:owner/settings",
            get(settings::get).put(settings::update),
        )
        // Reminder lifecycle
        .route("/owners/:owner/activate", post(reminders::activate))
        .route("/owners/:owner/deactivate", post(reminders::deactivate))
        .route("/owners/:owner/reminders", get(reminders::statuses))
        .route("/owners/:owner/prompts", get(reminders::prompts))
        .route("/prompts/:id/answer", post(reminders::answer_prompt));

    Router::new()
        .nest("/api", api)
        .route("/ws/owners/:owner", get(websocket::ws_upgrade))
        .with_state(ctx)
        .layer(CorsLayer::permissive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use axum::Json;
    use tower::ServiceExt;

    use crate::clock::ManualClock;
    use crate::config::AppConfig;
    use crate::models::{Outcome, OwnerId};
    use chrono::NaiveDate;

    const OWNER: &str = "family@example.org";

    fn test_core(config: AppConfig) -> Arc<CoreState> {
        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 3, 14)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        CoreState::for_tests(config, Arc::new(clock), None)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn form_request(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_str(&body_text(response).await).unwrap()
    }

    async fn send(core: &Arc<CoreState>, req: Request<Body>) -> Response {
        api_router(core.clone()).oneshot(req).await.unwrap()
    }

    async fn create_aspirin(core: &Arc<CoreState>) -> String {
        let response = send(
            core,
            json_request(
                "POST",
                &format!("/api/owners/{OWNER}/medicines"),
                serde_json::json!({"name": "Aspirin", "dosage": "1 tablet", "time": "08:00"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_str().unwrap().to_string()
    }

    // ── Health & routing ────────────────────────────────────

    #[tokio::test]
    async fn health_reports_version_and_transport() {
        let core = test_core(AppConfig::default());
        let response = send(&core, empty_request("GET", "/api/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::config::APP_VERSION);
        assert_eq!(json["transport"], "prompt");
    }

    #[tokio::test]
    async fn not_found_for_unknown_route() {
        let core = test_core(AppConfig::default());
        let response = send(&core, empty_request("GET", "/api/nonexistent")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_owner_is_bad_request() {
        let core = test_core(AppConfig::default());
        let response = send(&core, empty_request("GET", "/api/owners/%20/medicines")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // ── Medicines ───────────────────────────────────────────

    #[tokio::test]
    async fn created_medicine_is_listed() {
        let core = test_core(AppConfig::default());
        let id = create_aspirin(&core).await;

        let response = send(&core, empty_request("GET", &format!("/api/owners/{OWNER}/medicines"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["medicines"][0]["id"], id.as_str());
        assert_eq!(json["medicines"][0]["frequency"], "daily");
        assert_eq!(json["medicines"][0]["taken"], false);
        assert_eq!(json["medicines"][0]["inFlight"], false);
        assert!(json.get("warning").is_none());
    }

    #[tokio::test]
    async fn unreadable_list_answers_with_warning() {
        let db = crate::db::Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute("DROP TABLE local_storage", [])
                .map(|_| ())
                .map_err(Into::into)
        })
        .unwrap();
        let core = Arc::new(CoreState::new(AppConfig::default(), db).unwrap());

        let response = send(&core, empty_request("GET", &format!("/api/owners/{OWNER}/medicines"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["medicines"], serde_json::json!([]));
        assert_eq!(json["warning"], medicines::LOAD_FAILED_MESSAGE);
    }

    #[tokio::test]
    async fn edit_updates_given_fields() {
        let core = test_core(AppConfig::default());
        let id = create_aspirin(&core).await;

        let response = send(
            &core,
            json_request(
                "PATCH",
                &format!("/api/owners/{OWNER}/medicines/{id}"),
                serde_json::json!({"dosage": "2 tablets", "time": "20:15"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["name"], "Aspirin");
        assert_eq!(json["dosage"], "2 tablets");
        assert_eq!(json["time"], "20:15");

        let stored = &core.store().load(&OwnerId::parse(OWNER).unwrap())[0];
        assert_eq!(stored.dosage, "2 tablets");
    }

    #[tokio::test]
    async fn edit_rejects_invalid_or_unknown() {
        let core = test_core(AppConfig::default());
        let id = create_aspirin(&core).await;
        let uri = format!("/api/owners/{OWNER}/medicines/{id}");

        let response = send(&core, json_request("PATCH", &uri, serde_json::json!({"time": "8 o'clock"}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = send(&core, json_request("PATCH", &uri, serde_json::json!({}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["message"], "No fields to update");
        let response = send(&core, json_request("PATCH", &uri, serde_json::json!({"name": " "}))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &core,
            json_request(
                "PATCH",
                &format!("/api/owners/{OWNER}/medicines/missing"),
                serde_json::json!({"name": "Other"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let stored = &core.store().load(&OwnerId::parse(OWNER).unwrap())[0];
        assert_eq!((stored.name.as_str(), stored.time.to_string().as_str()), ("Aspirin", "08:00"));
    }

    #[tokio::test]
    async fn invalid_medicine_is_rejected_and_not_saved() {
        let core = test_core(AppConfig::default());
        let response = send(
            &core,
            json_request(
                "POST",
                &format!("/api/owners/{OWNER}/medicines"),
                serde_json::json!({"name": "Aspirin", "dosage": "1 tablet", "time": "25:99"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");

        let response = send(
            &core,
            json_request(
                "POST",
                &format!("/api/owners/{OWNER}/medicines"),
                serde_json::json!({"name": "Aspirin", "dosage": "1", "time": "08:00", "frequency": "hourly"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let owner = OwnerId::parse(OWNER).unwrap();
        assert!(core.store().load(&owner).is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_is_404() {
        let core = test_core(AppConfig::default());
        let response = send(
            &core,
            empty_request("DELETE", &format!("/api/owners/{OWNER}/medicines/missing")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_removes_medicine() {
        let core = test_core(AppConfig::default());
        let id = create_aspirin(&core).await;
        let response = send(
            &core,
            empty_request("DELETE", &format!("/api/owners/{OWNER}/medicines/{id}")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(core.store().load(&OwnerId::parse(OWNER).unwrap()).is_empty());
    }

    #[tokio::test]
    async fn taken_then_reset() {
        let core = test_core(AppConfig::default());
        let id = create_aspirin(&core).await;

        let response = send(
            &core,
            empty_request("POST", &format!("/api/owners/{OWNER}/medicines/{id}/taken")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["taken"], true);
        assert_eq!(json["takenAt"], "2026-03-14T09:00:00");

        let summary = body_json(send(&core, empty_request("GET", &format!("/api/owners/{OWNER}/summary"))).await).await;
        assert_eq!(summary["progress_percent"], 100);
        assert_eq!(summary["taken"], 1);

        let response = send(
            &core,
            empty_request("POST", &format!("/api/owners/{OWNER}/medicines/{id}/reset")),
        )
        .await;
        let json = body_json(response).await;
        assert_eq!(json["taken"], false);
        assert!(json.get("takenAt").is_none());
    }

    #[tokio::test]
    async fn taken_unknown_is_404() {
        let core = test_core(AppConfig::default());
        let response = send(
            &core,
            empty_request("POST", &format!("/api/owners/{OWNER}/medicines/nope/taken")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // ── Settings ────────────────────────────────────────────

    #[tokio::test]
    async fn settings_update_redacts_token() {
        let core = test_core(AppConfig::default());
        let response = send(
            &core,
            json_request(
                "PUT",
                &format!("/api/owners/{OWNER}/settings"),
                serde_json::json!({
                    "contact_phone": "+15550100",
                    "reminders_enabled": false,
                    "account_sid": "AC123",
                    "auth_token": "very-secret",
                    "phone_number": "+15550199"
                }),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&core, empty_request("GET", &format!("/api/owners/{OWNER}/settings"))).await;
        let text = body_text(response).await;
        assert!(!text.contains("very-secret"));
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["contact_phone"], "+15550100");
        assert_eq!(json["reminders_enabled"], false);
        assert_eq!(json["has_calling_credentials"], true);
    }

    #[tokio::test]
    async fn default_settings_enable_reminders() {
        let core = test_core(AppConfig::default());
        let json = body_json(send(&core, empty_request("GET", &format!("/api/owners/{OWNER}/settings"))).await).await;
        assert_eq!(json["reminders_enabled"], true);
        assert_eq!(json["has_calling_credentials"], false);
    }

    // ── Reminders & prompts ─────────────────────────────────

    #[tokio::test]
    async fn activate_and_deactivate() {
        let core = test_core(AppConfig::default());
        let json = body_json(send(&core, empty_request("POST", &format!("/api/owners/{OWNER}/activate"))).await).await;
        assert_eq!(json["active"], true);
        assert_eq!(json["changed"], true);

        let json = body_json(send(&core, empty_request("POST", &format!("/api/owners/{OWNER}/activate"))).await).await;
        assert_eq!(json["changed"], false);

        let json = body_json(send(&core, empty_request("GET", &format!("/api/owners/{OWNER}/reminders"))).await).await;
        assert_eq!(json["active"], true);

        let json = body_json(send(&core, empty_request("POST", &format!("/api/owners/{OWNER}/deactivate"))).await).await;
        assert_eq!(json["active"], false);
        assert_eq!(json["changed"], true);
        assert!(!core.is_active(&OwnerId::parse(OWNER).unwrap()));
    }

    #[tokio::test]
    async fn reminder_statuses_list_each_medicine() {
        let core = test_core(AppConfig::default());
        let id = create_aspirin(&core).await;
        let json = body_json(send(&core, empty_request("GET", &format!("/api/owners/{OWNER}/reminders"))).await).await;
        assert_eq!(json["transport"], "prompt");
        assert_eq!(json["medicines"][0]["id"], id.as_str());
        assert_eq!(json["medicines"][0]["phase"], "due");
        assert_eq!(json["blocked"], "no_contact_phone");
    }

    #[tokio::test]
    async fn reminders_say_why_nothing_is_sent() {
        let core = test_core(AppConfig::default());
        let uri = format!("/api/owners/{OWNER}/reminders");
        let json = body_json(send(&core, empty_request("GET", &uri)).await).await;
        assert_eq!(json["blocked"], "no_contact_phone");
        assert_eq!(
            json["blocked_message"],
            "Add the patient's phone number in settings to send reminders."
        );

        send(
            &core,
            json_request(
                "PUT",
                &format!("/api/owners/{OWNER}/settings"),
                serde_json::json!({"contact_phone": "+15550100", "reminders_enabled": false}),
            ),
        )
        .await;
        let json = body_json(send(&core, empty_request("GET", &uri)).await).await;
        assert_eq!(json["blocked"], "reminders_disabled");
        assert_eq!(json["blocked_message"], "Automatic reminders are turned off.");

        send(
            &core,
            json_request(
                "PUT",
                &format!("/api/owners/{OWNER}/settings"),
                serde_json::json!({"reminders_enabled": true}),
            ),
        )
        .await;
        let json = body_json(send(&core, empty_request("GET", &uri)).await).await;
        assert!(json["blocked"].is_null());
        assert!(json["last_failure"].is_null());
    }

    #[tokio::test]
    async fn reminders_report_transport_per_owner() {
        let mut config = AppConfig::default();
        config.telephony.backend_url = Some("http://127.0.0.1:9".into());
        let core = test_core(config);
        let uri = format!("/api/owners/{OWNER}/reminders");
        assert_eq!(body_json(send(&core, empty_request("GET", &uri)).await).await["transport"], "prompt");

        send(
            &core,
            json_request(
                "PUT",
                &format!("/api/owners/{OWNER}/settings"),
                serde_json::json!({
                    "contact_phone": "+15550100",
                    "account_sid": "AC123",
                    "auth_token": "very-secret",
                    "phone_number": "+15550199"
                }),
            ),
        )
        .await;
        assert_eq!(body_json(send(&core, empty_request("GET", &uri)).await).await["transport"], "telephony");
    }

    #[tokio::test]
    async fn reminders_report_last_delivery_error() {
        use crate::notifier::testing::{ScriptedNotifier, Step};
        use crate::notifier::Notifier;

        let clock = ManualClock::new(
            NaiveDate::from_ymd_opt(2026, 3, 14)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        );
        let notifier = ScriptedNotifier::new([Step::Fail]);
        let core = CoreState::for_tests(
            AppConfig::default(),
            Arc::new(clock),
            Some(notifier as Arc<dyn Notifier>),
        );
        let owner = OwnerId::parse(OWNER).unwrap();
        core.store()
            .save_settings(
                &owner,
                &crate::models::OwnerSettings {
                    contact_phone: Some("+15550100".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let id = create_aspirin(&core).await;
        core.engine_for(&owner).tick().await.unwrap().join().await;

        let json = body_json(send(&core, empty_request("GET", &format!("/api/owners/{OWNER}/reminders"))).await).await;
        assert!(json["blocked"].is_null());
        assert_eq!(json["last_failure"]["medicine_id"], id.as_str());
        assert_eq!(json["last_failure"]["setup_required"], true);
        assert_eq!(
            json["last_failure"]["message"],
            "Reminder delivery not configured: scripted failure"
        );
        assert_eq!(json["medicines"][0]["phase"], "retry_pending");
    }

    #[tokio::test]
    async fn answering_unknown_prompt_is_404() {
        let core = test_core(AppConfig::default());
        let response = send(
            &core,
            json_request("POST", "/api/prompts/nope/answer", serde_json::json!({"confirmed": true})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn prompt_answer_reaches_waiting_reminder() {
        use crate::notifier::{Contact, LocalPromptNotifier, Notifier};

        let core = test_core(AppConfig::default());
        let owner = OwnerId::parse(OWNER).unwrap();
        let med = crate::models::NewMedicine {
            name: "Aspirin".into(),
            dosage: "1 tablet".into(),
            time: "08:00".into(),
            ..Default::default()
        }
        .validate()
        .unwrap();

        let notifier = LocalPromptNotifier::new(core.prompts().clone());
        let contact = Contact {
            owner: owner.clone(),
            phone: "+15550100".into(),
            credentials: Default::default(),
        };
        let attempt = tokio::spawn(async move { notifier.attempt_reminder(&med, &contact).await });

        let mut prompts = serde_json::Value::Null;
        for _ in 0..100 {
            prompts = body_json(send(&core, empty_request("GET", &format!("/api/owners/{OWNER}/prompts"))).await).await;
            if prompts.as_array().map(|p| !p.is_empty()).unwrap_or(false) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        let prompt_id = prompts[0]["id"].as_str().unwrap().to_string();
        assert_eq!(prompts[0]["medicine_name"], "Aspirin");

        let response = send(
            &core,
            json_request(
                "POST",
                &format!("/api/prompts/{prompt_id}/answer"),
                serde_json::json!({"confirmed": false}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(attempt.await.unwrap().unwrap(), Outcome::Declined);
    }

    // ── Calling proxy ───────────────────────────────────────

    async fn spawn_backend() -> String {
        let app = Router::new()
            .route(
                "/make-call",
                post(|Json(body): Json<serde_json::Value>| async move {
                    if body["phone"] == "+15550000" {
                        (
                            StatusCode::BAD_REQUEST,
                            Json(serde_json::json!({"error": "Invalid number"})),
                        )
                    } else {
                        (
                            StatusCode::OK,
                            Json(serde_json::json!({"success": true, "call_sid": "CA42"})),
                        )
                    }
                }),
            )
            .route(
                "/voice-webhook",
                get(|| async { "<Response><Say>from backend</Say></Response>" }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn with_backend(url: String) -> AppConfig {
        let mut config = AppConfig::default();
        config.telephony.backend_url = Some(url);
        config
    }

    #[tokio::test]
    async fn make_call_requires_phone() {
        let core = test_core(AppConfig::default());
        let response = send(
            &core,
            json_request("POST", "/api/make-call", serde_json::json!({"medicine_name": "Aspirin"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "Phone number is required");
    }

    #[tokio::test]
    async fn make_call_without_backend_is_503() {
        let core = test_core(AppConfig::default());
        let response = send(
            &core,
            json_request("POST", "/api/make-call", serde_json::json!({"phone": "+15550100"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn make_call_is_forwarded() {
        let core = test_core(with_backend(spawn_backend().await));
        let response = send(
            &core,
            json_request(
                "POST",
                "/api/make-call",
                serde_json::json!({"phone": "+15550100", "medicine_name": "Aspirin"}),
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "initiated");
        assert_eq!(json["callId"], "CA42");
    }

    #[tokio::test]
    async fn make_call_backend_error_keeps_status() {
        let core = test_core(with_backend(spawn_backend().await));
        let response = send(
            &core,
            json_request("POST", "/api/make-call", serde_json::json!({"phone": "+15550000"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "Invalid number");
    }

    #[tokio::test]
    async fn make_call_unreachable_backend_is_500() {
        let core = test_core(with_backend("http://127.0.0.1:9".into()));
        let response = send(
            &core,
            json_request("POST", "/api/make-call", serde_json::json!({"phone": "+15550100"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["error"], "Internal server error");
    }

    #[tokio::test]
    async fn voice_webhook_renders_locally_without_backend() {
        let mut config = AppConfig::default();
        config.telephony.public_base_url = Some("https://reminders.example.org".into());
        let core = test_core(config);
        let response = send(&core, empty_request("GET", "/api/voice-webhook?medicine=Aspirin")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");
        let xml = body_text(response).await;
        assert!(xml.contains("Have you taken your Aspirin?"));
        assert!(xml.contains("https://reminders.example.org/api/handle-response?medicine=Aspirin"));
    }

    #[tokio::test]
    async fn voice_webhook_defaults_medicine_name() {
        let core = test_core(AppConfig::default());
        let xml = body_text(send(&core, empty_request("GET", "/api/voice-webhook")).await).await;
        assert!(xml.contains("Have you taken your your medication?"));
    }

    #[tokio::test]
    async fn voice_webhook_is_forwarded() {
        let core = test_core(with_backend(spawn_backend().await));
        let response = send(&core, empty_request("GET", "/api/voice-webhook?medicine=Aspirin")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");
        assert_eq!(body_text(response).await, "<Response><Say>from backend</Say></Response>");
    }

    #[tokio::test]
    async fn voice_webhook_post_renders_locally() {
        let core = test_core(AppConfig::default());
        let response = send(
            &core,
            form_request("/api/voice-webhook?medicine=Aspirin", "CallSid=CA1&From=%2B15550100"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Aspirin"));
    }

    #[tokio::test]
    async fn handle_response_resolves_waiting_call() {
        let core = test_core(AppConfig::default());
        let pending = core.calls().register("CA7");

        let response = send(
            &core,
            form_request("/api/handle-response?medicine=Aspirin", "Digits=1&CallSid=CA7"),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Thank you for taking your medication"));
        assert_eq!(pending.outcome().await.unwrap(), Outcome::Confirmed);
    }

    #[tokio::test]
    async fn handle_response_before_registration_is_kept() {
        let core = test_core(AppConfig::default());
        let response = send(
            &core,
            form_request("/api/handle-response", "SpeechResult=No%20not%20yet&CallSid=CA8"),
        )
        .await;
        assert!(body_text(response).await.contains("call again in 5 minutes"));
        let pending = core.calls().register("CA8");
        assert_eq!(pending.outcome().await.unwrap(), Outcome::Declined);
    }

    #[tokio::test]
    async fn call_status_times_out_unanswered_call() {
        let core = test_core(AppConfig::default());
        let pending = core.calls().register("CA9");
        let response = send(&core, form_request("/api/call-status", "CallSid=CA9&CallStatus=no-answer")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(pending.outcome().await.unwrap(), Outcome::TimedOut);
    }

    #[tokio::test]
    async fn call_status_in_progress_is_ignored() {
        let core = test_core(AppConfig::default());
        let _pending = core.calls().register("CA10");
        let response = send(&core, form_request("/api/call-status", "CallSid=CA10&CallStatus=ringing")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(core.calls().waiting_count(), 1);
    }
}

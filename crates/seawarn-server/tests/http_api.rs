use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use seawarn_common::types::{AlertStatus, Channel, DeliveryStatus, Severity};
use seawarn_ledger::normalize::sign_body;
use seawarn_ledger::state::{self, DeliveryRecord};
use seawarn_ratelimit::GuardConfig;
use seawarn_server::app::build_http_app;
use seawarn_server::auth::create_token;
use seawarn_server::config::ServerConfig;
use seawarn_server::state::AppState;
use seawarn_storage::{AlertRow, Store};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const SMS_SECRET: &str = "webhook-test-secret";

async fn test_state() -> (TempDir, AppState) {
    seawarn_common::id::init(1, 1);
    let dir = TempDir::new().unwrap();
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("seawarn.db").display()
    );
    let config: ServerConfig = toml::from_str(&format!(
        r#"
        db_url = "{db_url}"

        [auth]
        jwt_secret = "test-jwt-secret"

        [webhooks]
        sms_gateway = "{SMS_SECRET}"
        "#
    ))
    .unwrap();
    let store = Arc::new(Store::new(&config.db_url).await.unwrap());
    let state = AppState::build(config, store);
    (dir, state)
}

fn test_app(state: &AppState) -> Router {
    build_http_app(state.clone())
}

fn bearer(state: &AppState) -> String {
    let token = create_token(&state.jwt_secret, "ops@example.com", 3600).unwrap();
    format!("Bearer {token}")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn sent_attempt(pmid: &str) -> DeliveryRecord {
    let mut record = DeliveryRecord::new(
        seawarn_common::id::next_id(),
        "alert-1",
        0,
        "contact-1",
        Channel::Sms,
        "+15550001",
        Utc::now(),
    );
    state::record_dispatch(&mut record, pmid, Utc::now());
    record
}

fn pending_alert() -> AlertRow {
    AlertRow {
        id: seawarn_common::id::next_id(),
        event_type: "tsunami.warning".to_string(),
        severity: Severity::Critical,
        headline: "Tsunami warning for sector 7".to_string(),
        recommendation: None,
        target: None,
        status: AlertStatus::Pending,
        policy_id: None,
        escalation_step: 0,
        escalation_started: false,
        exhausted: false,
        acknowledged_by: None,
        created_at: Utc::now(),
        sent_at: None,
        acknowledged_at: None,
        resolved_at: None,
        expires_at: None,
    }
}

#[tokio::test]
async fn health_is_public() {
    let (_dir, state) = test_state().await;
    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["err_code"], 0);
    assert_eq!(json["data"]["storage_status"], "ok");
}

#[tokio::test]
async fn operator_routes_require_a_token() {
    let (_dir, state) = test_state().await;
    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/alerts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/alerts")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let (_dir, state) = test_state().await;
    let body = "message_id=gw-1&status=delivered&ts=1700000000";
    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/webhooks/sms_gateway")
                .header("x-webhook-signature", "bogus")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Missing signature entirely is also a 401 while a secret is set.
    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/webhooks/sms_gateway")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_for_unknown_message_id_is_discarded_with_200() {
    let (_dir, state) = test_state().await;
    let body = "message_id=never-dispatched&status=delivered&ts=1700000000";
    let sig = sign_body(SMS_SECRET, body.as_bytes());
    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/webhooks/sms_gateway")
                .header("x-webhook-signature", sig)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["events"], 1);
    assert_eq!(json["data"]["discarded"], 1);
    assert_eq!(json["data"]["applied"], 0);
}

#[tokio::test]
async fn webhook_advances_a_known_attempt() {
    let (_dir, state) = test_state().await;
    let attempt = sent_attempt("gw-100");
    state.store.insert_attempt(&attempt).await.unwrap();

    let body = "message_id=gw-100&status=delivered&ts=1700000050";
    let sig = sign_body(SMS_SECRET, body.as_bytes());
    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/webhooks/sms_gateway")
                .header("x-webhook-signature", sig)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["applied"], 1);

    let stored = state
        .store
        .get_attempt_by_provider_id(Channel::Sms, "gw-100")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DeliveryStatus::Delivered);
    assert!(stored.delivered_at.is_some());
}

#[tokio::test]
async fn malformed_webhook_body_is_a_400() {
    let (_dir, state) = test_state().await;
    let body = "status=delivered";
    let sig = sign_body(SMS_SECRET, body.as_bytes());
    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/webhooks/sms_gateway")
                .header("x-webhook-signature", sig)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn acknowledge_is_idempotent_over_http() {
    let (_dir, state) = test_state().await;
    let alert = state.store.insert_alert(&pending_alert()).await.unwrap();
    let auth = bearer(&state);

    let ack = |by: &str| {
        let body = serde_json::json!({ "by": by }).to_string();
        Request::builder()
            .method("POST")
            .uri(format!("/v1/alerts/{}/acknowledge", alert.id))
            .header(header::AUTHORIZATION, &auth)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    };

    let response = test_app(&state).oneshot(ack("capt-okafor")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "acknowledged");
    assert_eq!(json["data"]["acknowledged_by"], "capt-okafor");

    let response = test_app(&state).oneshot(ack("someone-else")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["acknowledged_by"], "capt-okafor");
}

#[tokio::test]
async fn unmatched_alert_is_stored_pending() {
    let (_dir, state) = test_state().await;
    let auth = bearer(&state);
    let body = serde_json::json!({
        "event_type": "seismic.swarm",
        "severity": "moderate",
        "headline": "Swarm near ridge"
    })
    .to_string();
    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/alerts")
                .header(header::AUTHORIZATION, &auth)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "pending");
    assert!(json["data"]["policy_id"].is_null());
}

#[tokio::test]
async fn otp_flow_issues_a_token_and_backs_off_on_failures() {
    let (_dir, mut state) = test_state().await;
    // Tight limits so the backoff path is observable in one test.
    state.guard = Arc::new(seawarn_ratelimit::RateLimitGuard::new(GuardConfig {
        window_secs: 60,
        max_in_window: 10,
        backoff_base_secs: 30,
        backoff_cap_secs: 60,
        lockout_threshold: 5,
        lockout_secs: 600,
    }));

    let request_code = Request::builder()
        .method("POST")
        .uri("/v1/auth/request-code")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "address": "+15550009" }).to_string(),
        ))
        .unwrap();
    let response = test_app(&state).oneshot(request_code).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let code = state
        .otp_codes
        .lock()
        .unwrap()
        .get("+15550009")
        .unwrap()
        .code
        .clone();

    let verify = |code: &str| {
        Request::builder()
            .method("POST")
            .uri("/v1/auth/verify-code")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "address": "+15550009", "code": code }).to_string(),
            ))
            .unwrap()
    };

    // Wrong code fails and charges the failure streak.
    let response = test_app(&state).oneshot(verify("000000")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // The streak now imposes a backoff delay on the next attempt, even
    // with the correct code.
    let response = test_app(&state).oneshot(verify(&code)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("Retry-After"));
}

#[tokio::test]
async fn fresh_otp_verification_succeeds() {
    let (_dir, state) = test_state().await;

    let request_code = Request::builder()
        .method("POST")
        .uri("/v1/auth/request-code")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            serde_json::json!({ "address": "ops@example.com" }).to_string(),
        ))
        .unwrap();
    let response = test_app(&state).oneshot(request_code).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let code = state
        .otp_codes
        .lock()
        .unwrap()
        .get("ops@example.com")
        .unwrap()
        .code
        .clone();

    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/auth/verify-code")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({ "address": "ops@example.com", "code": code }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let token = json["data"]["token"].as_str().unwrap();

    // The issued token opens operator routes.
    let response = test_app(&state)
        .oneshot(
            Request::builder()
                .uri("/v1/alerts")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

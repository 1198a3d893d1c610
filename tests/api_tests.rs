//! Router-level tests over an in-memory store

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use toolcrib_server::{
    api,
    clock::{Clock, SystemClock},
    config::{AppConfig, StoreBackend},
    repository::MemoryStore,
    services::{notifier::LogNotifier, scans::MemoryScanMailbox, Services},
    AppState,
};

fn app() -> Router {
    let mut config = AppConfig::default();
    config.database.backend = StoreBackend::Memory;
    config.notifier.supervisor_channel = Some("supervisors".to_string());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let services = Services::new(
        Arc::new(MemoryStore::new()),
        Arc::new(LogNotifier),
        Arc::new(MemoryScanMailbox::new(30, clock.clone())),
        clock,
        &config,
    );

    api::router(AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    })
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(format!("/api/v1{}", uri));
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn date_in(days: i64) -> String {
    (Utc::now().date_naive() + Duration::days(days)).to_string()
}

async fn seed(app: &Router) {
    for (id, name, role) in [
        ("USR-001", "Maria Lopez", "Supervisor"),
        ("USR-002", "Ana Ruiz", "Technician"),
        ("USR-003", "Omar Haddad", "Technician"),
    ] {
        let (status, _) = call(
            app,
            Method::POST,
            "/users",
            Some(json!({ "id": id, "name": name, "role": role })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    for (id, due) in [("TW-001", 30), ("MM-002", 30), ("CAL-003", -1)] {
        let (status, _) = call(
            app,
            Method::POST,
            "/tools",
            Some(json!({ "id": id, "name": format!("Tool {}", id), "calibration_due": date_in(due) })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call(&app, Method::GET, "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_create_tool_errors() {
    let app = app();
    seed(&app).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/tools",
        Some(json!({ "id": "TW-001", "name": "Again", "calibration_due": date_in(5) })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "DuplicateId");

    let (status, body) = call(
        &app,
        Method::POST,
        "/tools",
        Some(json!({ "id": "TW-009", "calibration_due": date_in(5) })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidInput");

    let (status, _) = call(&app, Method::GET, "/tools/NOPE", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_and_checkin_flow() {
    let app = app();
    seed(&app).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/checkout",
        Some(json!({ "user_id": "USR-002", "tool_id": "TW-001" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "In Use");
    assert_eq!(body["current_holder"], "USR-002");

    let (status, body) = call(
        &app,
        Method::POST,
        "/checkout",
        Some(json!({ "user_id": "USR-003", "tool_id": "TW-001" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ToolNotAvailable");

    let (status, body) = call(
        &app,
        Method::POST,
        "/checkout",
        Some(json!({ "user_id": "USR-003", "tool_id": "CAL-003" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ToolOverdueForCalibration");

    let (status, body) = call(
        &app,
        Method::POST,
        "/checkout",
        Some(json!({ "user_id": "USR-003", "tool_id": "NOPE" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "ToolNotFound");

    let (status, body) = call(&app, Method::GET, "/users/USR-002/tools", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = call(&app, Method::GET, "/live-view", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["tool_id"], "TW-001");
    assert_eq!(body[0]["user_name"], "Ana Ruiz");

    let (status, body) = call(
        &app,
        Method::POST,
        "/checkin",
        Some(json!({ "tool_id": "TW-001" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tool"]["status"], "Available");
    assert_eq!(body["tool"]["current_holder"], Value::Null);
    assert_eq!(body["tool"]["total_checkouts"], 1);
    assert_eq!(body["user_id"], "USR-002");

    let (status, body) = call(
        &app,
        Method::POST,
        "/checkin",
        Some(json!({ "tool_id": "TW-001" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "ToolNotCheckedOut");

    let (status, body) = call(&app, Method::GET, "/transactions?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["type"], "checkin");
}

#[tokio::test]
async fn test_batch_checkout_partitions() {
    let app = app();
    seed(&app).await;
    call(
        &app,
        Method::POST,
        "/checkout",
        Some(json!({ "user_id": "USR-003", "tool_id": "MM-002" })),
    )
    .await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/checkout/batch",
        Some(json!({ "user_id": "USR-002", "tool_ids": ["TW-001", "MM-002", "GHOST-1"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checked_out"], json!(["TW-001"]));
    assert_eq!(body["unavailable"][0]["tool_id"], "MM-002");
    assert_eq!(body["errors"][0]["tool_id"], "GHOST-1");
}

#[tokio::test]
async fn test_status_override_and_batch_update() {
    let app = app();
    seed(&app).await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/tools/TW-001/status",
        Some(json!({ "status": "Lost" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidStatus");

    let (status, body) = call(
        &app,
        Method::PUT,
        "/tools/TW-001/status",
        Some(json!({ "status": "Pending Verification" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Pending Verification");

    let (status, body) = call(
        &app,
        Method::POST,
        "/tools/batch",
        Some(json!({ "ids": ["TW-001", "MM-002"], "status": "In Use" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "InvalidBatchOperation");

    let (status, body) = call(
        &app,
        Method::POST,
        "/tools/batch",
        Some(json!({ "ids": ["TW-001", "MM-002"], "status": "Available", "calibration_due": date_in(60) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = call(&app, Method::GET, "/tools?status=available", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_issue_lifecycle() {
    let app = app();
    seed(&app).await;
    call(
        &app,
        Method::POST,
        "/checkout",
        Some(json!({ "user_id": "USR-002", "tool_id": "TW-001" })),
    )
    .await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/issues",
        Some(json!({
            "tool_id": "TW-001",
            "reporter_id": "USR-002",
            "defect_type": "Calibration drift",
            "description": "Reads high"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let report_id = body["report_id"].as_str().unwrap().to_string();

    let (_, tool) = call(&app, Method::GET, "/tools/TW-001", None).await;
    assert_eq!(tool["status"], "Under Maintenance");
    assert_eq!(tool["current_holder"], Value::Null);

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/issues/{}/close", report_id),
        Some(json!({ "make_tool_available": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Closed");

    let (_, tool) = call(&app, Method::GET, "/tools/TW-001", None).await;
    assert_eq!(tool["status"], "Available");

    let (status, _) = call(&app, Method::GET, "/issues/ISS-NOPE", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, Method::GET, "/issues?status=Closed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_user_with_tools_cannot_be_deleted() {
    let app = app();
    seed(&app).await;
    call(
        &app,
        Method::POST,
        "/checkout",
        Some(json!({ "user_id": "USR-002", "tool_id": "TW-001" })),
    )
    .await;

    let (status, body) = call(&app, Method::DELETE, "/users/USR-002", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "UserHoldsTools");

    let (status, _) = call(&app, Method::DELETE, "/users/USR-003", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, Method::GET, "/users/USR-003", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_alerts_list_overdue_tools() {
    let app = app();
    seed(&app).await;

    let (status, body) = call(&app, Method::GET, "/alerts", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overdue_tools"][0]["tool_id"], "CAL-003");
    assert_eq!(body["long_checkout_tools"], json!([]));

    let (status, _) = call(&app, Method::POST, "/alerts/evaluate", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_nfc_bridge() {
    let app = app();
    seed(&app).await;

    let (status, _) = call(
        &app,
        Method::PUT,
        "/users/USR-002/tag",
        Some(json!({ "tag": "0xd4 0x81 0x4d 0x5" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        Method::POST,
        "/nfc/scan",
        Some(json!({ "uid": "D4 81 4D 05", "device": "cabinet" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "USR-002");

    let (status, _) = call(
        &app,
        Method::POST,
        "/nfc/scan",
        Some(json!({ "uid": "01 02 03 04", "device": "station" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(&app, Method::GET, "/nfc/latest?device=station", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tag"], "01 02 03 04");

    let (status, body) = call(&app, Method::POST, "/nfc/resolve", Some(json!({ "tag": "d4814d05" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "user");
    assert_eq!(body["id"], "USR-002");

    let (status, _) = call(
        &app,
        Method::POST,
        "/nfc/session/end",
        Some(json!({ "device": "cabinet" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = call(&app, Method::GET, "/nfc/latest?device=cabinet", None).await;
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_calibration_endpoints() {
    let app = app();
    seed(&app).await;

    let (status, body) = call(&app, Method::GET, "/calibration/usage-stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, body) = call(
        &app,
        Method::POST,
        "/calibration/proposals",
        Some(json!([
            { "tool_id": "TW-001", "recommended_date": date_in(10), "reason": "heavy use" },
            { "tool_id": "MM-002", "recommended_date": date_in(90) }
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], json!(["TW-001"]));
    assert_eq!(body["skipped"], json!(["MM-002"]));

    let (status, _) = call(&app, Method::GET, "/calibration/events?year=2026&month=13", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, Method::GET, "/audit-trail?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["action"], "CALIBRATION_RESCHEDULED");
}

#[tokio::test]
async fn test_emergency_unlock() {
    let app = app();
    seed(&app).await;

    let (status, _) = call(&app, Method::POST, "/unlock/emergency", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &app,
        Method::POST,
        "/unlock/emergency",
        Some(json!({ "supervisor_id": "USR-001", "reason": "Fire drill" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["actor_user_id"], "USR-001");
    assert_eq!(body["supervisor_notified"], true);
}

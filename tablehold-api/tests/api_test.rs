use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tablehold_api::middleware::Claims;
use tablehold_api::{app, AppState, AuthConfig};
use tablehold_booking::{Collaborators, ReservationServices, ServiceSettings};
use tablehold_core::identity::StaticUserDirectory;
use tablehold_core::notify::RecordingNotifier;
use tablehold_core::usage::InMemoryUsageCounter;
use tablehold_core::{LockId, LockStatus, ManualClock, ReservationStore};
use tablehold_store::app_config::BusinessRules;
use tablehold_store::InMemoryReservationStore;
use tower::ServiceExt;

const SECRET: &str = "test-secret";
const SWEEP_SECRET: &str = "sweep-secret";

struct TestApp {
    router: Router,
    clock: Arc<ManualClock>,
    store: Arc<InMemoryReservationStore>,
}

fn test_app() -> TestApp {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap()));
    let store = Arc::new(InMemoryReservationStore::new());
    let services = ReservationServices::new(
        Collaborators {
            store: store.clone(),
            clock: clock.clone(),
            users: Arc::new(StaticUserDirectory::new(["user-1", "user-2"])),
            usage: Arc::new(InMemoryUsageCounter::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        },
        ServiceSettings::default(),
    );
    let state = AppState {
        services,
        redis: None,
        auth: AuthConfig {
            secret: SECRET.to_string(),
        },
        sweep_secret: SWEEP_SECRET.to_string(),
        business_rules: BusinessRules::default(),
    };
    TestApp {
        router: app(state),
        clock,
        store,
    }
}

fn token(user: &str, role: &str) -> String {
    let claims = Claims {
        sub: user.to_string(),
        role: role.to_string(),
        exp: (Utc::now() + Duration::hours(1)).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

async fn call(router: &Router, method: Method, uri: &str, bearer: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", t));
    }
    let body = match body {
        Some(v) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };

    let response = router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn hold_body() -> Value {
    json!({
        "restaurant_id": "r1",
        "table_id": "t4",
        "date": "2025-03-01",
        "start_time": "19:00",
        "end_time": "20:30",
        "guest_count": 2,
        "hold_minutes": 5,
        "contact": { "name": "Ada", "email": "ada@example.com" }
    })
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = test_app();
    let (status, body) = call(&app.router, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let app = test_app();
    let (status, body) = call(&app.router, Method::POST, "/v1/holds", None, Some(hold_body())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_hold_confirm_flow() {
    let app = test_app();
    let customer = token("user-1", "CUSTOMER");

    let (status, hold) = call(&app.router, Method::POST, "/v1/holds", Some(&customer), Some(hold_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(hold["status"], "active");
    assert_eq!(hold["remaining_seconds"], 300);
    let lock_id = hold["lock_id"].as_str().unwrap().to_string();

    // Same slot, different customer
    let other = token("user-2", "CUSTOMER");
    let (status, body) = call(&app.router, Method::POST, "/v1/holds", Some(&other), Some(hold_body())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "slot_taken");
    assert_eq!(body["message"], "This table was just taken");
    assert_eq!(body["details"]["conflicts"][0]["type"], "lock");

    let uri = format!("/v1/holds/{}/confirm", lock_id);
    let (status, booking) = call(&app.router, Method::POST, &uri, Some(&customer), Some(json!({ "guest_count": 3 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "confirmed");
    assert_eq!(booking["guest_count"], 3);
    assert_eq!(booking["version"], 1);

    // Retrying returns the same booking
    let (status, again) = call(&app.router, Method::POST, &uri, Some(&customer), Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["id"], booking["id"]);

    let (status, body) = call(&app.router, Method::GET, &format!("/v1/holds/{}", lock_id), Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn test_expired_hold_is_gone() {
    let app = test_app();
    let customer = token("user-1", "CUSTOMER");
    let (_, hold) = call(&app.router, Method::POST, "/v1/holds", Some(&customer), Some(hold_body())).await;
    let lock_id = hold["lock_id"].as_str().unwrap().to_string();

    app.clock.advance(Duration::minutes(6));
    let uri = format!("/v1/holds/{}/confirm", lock_id);
    let (status, body) = call(&app.router, Method::POST, &uri, Some(&customer), Some(json!({}))).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "hold_expired");
    assert_eq!(body["message"], "Your hold expired, please try again");
}

#[tokio::test]
async fn test_stranger_read_leaves_stale_hold_untouched() {
    let app = test_app();
    let customer = token("user-1", "CUSTOMER");
    let (_, hold) = call(&app.router, Method::POST, "/v1/holds", Some(&customer), Some(hold_body())).await;
    let lock_id = hold["lock_id"].as_str().unwrap().to_string();
    let uri = format!("/v1/holds/{}", lock_id);

    app.clock.advance(Duration::minutes(6));
    let other = token("user-2", "CUSTOMER");
    let (status, _) = call(&app.router, Method::GET, &uri, Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let id = LockId::parse(&lock_id).unwrap();
    let stored = app.store.get_lock(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, LockStatus::Active);

    // The owner's read records the expiry
    let (status, body) = call(&app.router, Method::GET, &uri, Some(&customer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "expired");
    let stored = app.store.get_lock(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, LockStatus::Expired);
}

#[tokio::test]
async fn test_bad_time_is_validation_error() {
    let app = test_app();
    let customer = token("user-1", "CUSTOMER");
    let mut body = hold_body();
    body["start_time"] = json!("25:00");

    let (status, body) = call(&app.router, Method::POST, "/v1/holds", Some(&customer), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_booking_patch_is_version_checked_and_role_gated() {
    let app = test_app();
    let customer = token("user-1", "CUSTOMER");
    let staff = token("staff-1", "STAFF");

    let (status, booking) = call(&app.router, Method::POST, "/v1/bookings", Some(&customer), Some(hold_body())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "pending");
    let uri = format!("/v1/bookings/{}", booking["id"].as_str().unwrap());

    // Customers cannot confirm
    let confirm = json!({ "type": "confirm", "expected_version": 1 });
    let (status, _) = call(&app.router, Method::PATCH, &uri, Some(&customer), Some(confirm.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, confirmed) = call(&app.router, Method::PATCH, &uri, Some(&staff), Some(confirm.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");
    assert_eq!(confirmed["version"], 2);

    let (status, body) = call(&app.router, Method::PATCH, &uri, Some(&staff), Some(confirm)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "version_conflict");
    assert_eq!(body["details"]["current_version"], 2);

    // Only terminal bookings can be deleted
    let (status, _) = call(&app.router, Method::DELETE, &uri, Some(&staff), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let cancel = json!({ "type": "cancel", "reason": "plans changed", "expected_version": 2 });
    let (status, _) = call(&app.router, Method::PATCH, &uri, Some(&customer), Some(cancel)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app.router, Method::DELETE, &uri, Some(&staff), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_overlapping_booking_is_distinguished() {
    let app = test_app();
    let customer = token("user-1", "CUSTOMER");
    call(&app.router, Method::POST, "/v1/bookings", Some(&customer), Some(hold_body())).await;

    let mut overlapping = hold_body();
    overlapping["start_time"] = json!("8:00 PM");
    overlapping["end_time"] = json!("9:00 PM");
    let (status, body) = call(&app.router, Method::POST, "/v1/bookings", Some(&customer), Some(overlapping)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "slot_overlaps");

    let check = json!({
        "restaurant_id": "r1",
        "table_id": "t4",
        "date": "2025-03-01",
        "start_time": "20:30",
        "end_time": "21:30"
    });
    let (status, report) = call(&app.router, Method::POST, "/v1/conflicts/check", Some(&customer), Some(check)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["exact"].as_array().unwrap().len(), 0);
    assert_eq!(report["overlapping"].as_array().unwrap().len(), 0);
    assert_eq!(report["availability_score"], 100);
}

#[tokio::test]
async fn test_resolution_requires_staff() {
    let app = test_app();
    let customer = token("user-1", "CUSTOMER");
    let admin = token("admin-1", "ADMIN");

    let (_, hold) = call(&app.router, Method::POST, "/v1/holds", Some(&customer), Some(hold_body())).await;
    let request = json!({
        "target": { "kind": "lock", "id": hold["lock_id"] },
        "action": "expire",
        "reason": "table out of service"
    });

    let (status, _) = call(&app.router, Method::POST, "/v1/admin/conflicts/resolve", Some(&customer), Some(request.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, outcome) = call(&app.router, Method::POST, "/v1/admin/conflicts/resolve", Some(&admin), Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["kind"], "lock");
    assert_eq!(outcome["record"]["status"], "expired");
}

#[tokio::test]
async fn test_sweep_requires_shared_secret() {
    let app = test_app();

    let (status, _) = call(&app.router, Method::POST, "/internal/sweep", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/internal/sweep")
        .header("x-sweep-secret", SWEEP_SECRET)
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let report: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(report["expired_locks"], 0);
}

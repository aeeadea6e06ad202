//! HTTP API integration tests

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{deps, start_time, FakeAccountStore, FakeClock, FakeGenerator, TOKEN, USER_ID};
use gdf_common::config::AdminEntry;
use gdf_profile::catalog::AdminDirectory;
use gdf_profile::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const DEVICE: &str = "device-1";
const ADMIN_TOKEN: &str = "token-admin";
const ADMIN_EMAIL: &str = "admin@example.com";

async fn setup() -> (Arc<FakeAccountStore>, Router) {
    let store = Arc::new(FakeAccountStore::new());
    store.add_user(TOKEN, USER_ID, Some(common::EMAIL), json!({}));
    store.add_user(ADMIN_TOKEN, "user-admin", Some(ADMIN_EMAIL), json!({}));
    let clock = FakeClock::new(start_time());
    let admins = AdminDirectory::new(&[AdminEntry {
        email: ADMIN_EMAIL.to_string(),
        viht_id: "VIHT-ADMIN0000000001".to_string(),
    }]);
    let deps = deps(store.clone(), &clock)
        .with_generator(Arc::new(FakeGenerator::text("hello")))
        .with_admins(admins);

    let pool = gdf_common::db::init_in_memory_pool().await.unwrap();
    let app = build_router(AppState::new(pool, deps));
    (store, app)
}

fn request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-device-id", DEVICE);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let (_store, app) = setup().await;
    let (status, body) = send(&app, request("GET", "/health", None, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "gdf-profile");
}

#[tokio::test]
async fn test_profile_requires_token() {
    let (_store, app) = setup().await;

    let (status, body) = send(&app, request("GET", "/profile", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, request("GET", "/profile", Some("bogus"), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_profile_reconciles_and_persists() {
    let (store, app) = setup().await;

    let (status, body) = send(&app, request("GET", "/profile", Some(TOKEN), None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"]["user_id"], USER_ID);
    assert_eq!(body["profile"]["metadata"]["ai_requests_limit"], 10);
    assert_eq!(body["write"]["status"], "persisted");
    assert_eq!(store.metadata(TOKEN)["ai_requests_limit"], json!(10));
}

#[tokio::test]
async fn test_signed_in_awards_first_sign_in() {
    let (_store, app) = setup().await;

    let (status, body) = send(
        &app,
        request("POST", "/session", Some(TOKEN), Some(json!({"event": "signed_in"}))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"], "signed_in");
    let subjects: Vec<&str> = body["notifications"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|n| n["kind"] == "achievement_unlocked")
        .filter_map(|n| n["subject_id"].as_str())
        .collect();
    assert_eq!(subjects, vec!["first_sign_in"]);
    assert_eq!(body["profile"]["metadata"]["activity_points"], 10);
}

#[tokio::test]
async fn test_signed_out_restores_guest_counter() {
    let (_store, app) = setup().await;

    let (status, _) = send(
        &app,
        request("POST", "/ai/chat", None, Some(json!({"prompt": "hi"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("POST", "/session", None, Some(json!({"event": "signed_out"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["guest_quota"]["requests_made"], 1);
    assert_eq!(body["guest_quota"]["remaining"], 4);
}

#[tokio::test]
async fn test_claim_unknown_task_is_not_found() {
    let (_store, app) = setup().await;

    let (status, body) = send(
        &app,
        request("POST", "/profile/tasks/no_such_task/claim", Some(TOKEN), None),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_actions_endpoint_rejects_ai_request() {
    let (_store, app) = setup().await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/profile/actions",
            Some(TOKEN),
            Some(json!({"action": "ai_request"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        request(
            "POST",
            "/profile/actions",
            Some(TOKEN),
            Some(json!({"action": "support_ticket_created"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"]["metadata"]["support_tickets_created"], 1);
}

#[tokio::test]
async fn test_signed_in_chat_counts_against_account() {
    let (store, app) = setup().await;

    let (status, body) = send(
        &app,
        request("POST", "/ai/chat", Some(TOKEN), Some(json!({"prompt": "hello?"}))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"]["type"], "text");
    assert_eq!(body["reply"]["text"], "hello");
    assert_eq!(body["quota"]["requests_made"], 1);
    assert_eq!(body["quota"]["remaining"], 9);
    assert_eq!(store.metadata(TOKEN)["ai_requests_made"], json!(1));
}

#[tokio::test]
async fn test_guest_chat_until_quota_exhausted() {
    let (_store, app) = setup().await;

    for expected in 1..=5 {
        let (status, body) = send(
            &app,
            request("POST", "/ai/chat", None, Some(json!({"prompt": "hi"}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["quota"]["requests_made"], expected);
    }

    let (status, body) = send(
        &app,
        request("POST", "/ai/chat", None, Some(json!({"prompt": "hi"}))),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "QUOTA_EXCEEDED");

    let (status, body) = send(&app, request("GET", "/guest/quota", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requests_made"], 5);
    assert_eq!(body["remaining"], 0);
}

#[tokio::test]
async fn test_guest_quota_requires_device_header() {
    let (_store, app) = setup().await;

    let req = Request::builder()
        .uri("/guest/quota")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_premium_grant_requires_admin() {
    let (store, app) = setup().await;

    let (status, body) = send(
        &app,
        request("POST", "/admin/premium", Some(TOKEN), Some(json!({"user_id": USER_ID}))),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert!(store.procedure_calls().is_empty());
    assert_ne!(store.metadata(TOKEN).get("is_premium"), Some(&json!(true)));
}

#[tokio::test]
async fn test_profile_actions_do_not_grant_premium() {
    let (store, app) = setup().await;

    let (status, _) = send(
        &app,
        request(
            "POST",
            "/profile/actions",
            Some(TOKEN),
            Some(json!({"action": "premium_granted"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_ne!(store.metadata(TOKEN).get("is_premium"), Some(&json!(true)));
}

#[tokio::test]
async fn test_admin_grants_premium_to_online_user() {
    let (store, app) = setup().await;
    let (status, _) = send(&app, request("GET", "/profile", Some(TOKEN), None)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        request("POST", "/admin/premium", Some(ADMIN_TOKEN), Some(json!({"user_id": USER_ID}))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], USER_ID);
    assert_eq!(body["profile"]["metadata"]["is_premium"], true);
    assert_eq!(body["profile"]["metadata"]["ai_requests_limit"], 100);
    assert_eq!(store.procedure_calls().len(), 1);
    assert_eq!(store.procedure_calls()[0].0, "grant_premium");
    assert_eq!(store.metadata(TOKEN)["ai_requests_limit"], json!(100));
}

#[tokio::test]
async fn test_sign_out_releases_only_the_authenticated_account() {
    let (_store, app) = setup().await;
    send(&app, request("GET", "/profile", Some(TOKEN), None)).await;

    let (status, _) = send(
        &app,
        request("POST", "/session", None, Some(json!({"event": "signed_out"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, health) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(health["active_sessions"], 1);

    let (status, _) = send(
        &app,
        request("POST", "/session", Some(ADMIN_TOKEN), Some(json!({"event": "signed_out"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, health) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(health["active_sessions"], 1);

    send(
        &app,
        request("POST", "/session", Some(TOKEN), Some(json!({"event": "signed_out"}))),
    )
    .await;
    let (_, health) = send(&app, request("GET", "/health", None, None)).await;
    assert_eq!(health["active_sessions"], 0);
}

#[tokio::test]
async fn test_actions_see_store_changes_between_requests() {
    let (store, app) = setup().await;
    send(&app, request("GET", "/profile", Some(TOKEN), None)).await;

    store.patch_metadata(TOKEN, json!({"activity_points": 40}));
    let (status, body) = send(
        &app,
        request(
            "POST",
            "/profile/actions",
            Some(TOKEN),
            Some(json!({"action": "support_ticket_created"})),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["profile"]["metadata"]["activity_points"], 40 + 10);
    assert_eq!(store.metadata(TOKEN)["activity_points"], json!(50));
}

//! Router tests against a mocked database.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use rstest::rstest;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, Transaction, Value};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{AppState, create_router};
use meridian_db::entities::{chat_sessions, users};
use meridian_shared::{HostedAuthClient, JwtService};

const SECRET: &str = "test-secret-key-for-testing-at-least-32b";

fn app(db: Arc<DatabaseConnection>) -> Router {
    let state = AppState::new(
        db,
        JwtService::new(SECRET),
        HostedAuthClient::new("http://127.0.0.1:9", "anon"),
        None,
        2,
    );
    create_router(state)
}

/// Takes the log once the router, and every handle it held, is dropped.
fn transaction_log(db: Arc<DatabaseConnection>) -> Vec<Transaction> {
    Arc::into_inner(db)
        .expect("connection still shared")
        .into_transaction_log()
}

fn token(user_id: Uuid) -> String {
    JwtService::new(SECRET)
        .sign_for_testing(user_id, None, Duration::minutes(5))
        .unwrap()
}

fn user_row(id: Uuid, is_admin: bool, is_manager: bool) -> users::Model {
    role_row(id, is_admin, is_manager, false)
}

fn role_row(id: Uuid, is_admin: bool, is_manager: bool, is_superiormanager: bool) -> users::Model {
    let now: DateTimeWithTimeZone = Utc::now().into();
    users::Model {
        id,
        email: format!("{id}@example.com"),
        full_name: None,
        is_admin,
        is_manager,
        is_superiormanager,
        kyc_status: "not_submitted".into(),
        created_at: now,
        updated_at: now,
    }
}

fn request(method: Method, uri: &str, bearer: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health_is_public() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let (status, body) = send(app(Arc::new(db)), request(Method::GET, "/api/v1/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let (status, body) = send(app(Arc::new(db)), request(Method::GET, "/api/v1/me", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
    let forged = JwtService::new("another-secret-key-that-is-32-bytes!")
        .sign_for_testing(Uuid::now_v7(), None, Duration::minutes(5))
        .unwrap();
    let (status, _) = send(app(Arc::new(db)), request(Method::GET, "/api/v1/me", Some(&forged), None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_me_returns_profile() {
    let id = Uuid::now_v7();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user_row(id, false, false)]])
        .into_connection();
    let (status, body) = send(app(Arc::new(db)), request(Method::GET, "/api/v1/me", Some(&token(id)), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.to_string());
    assert_eq!(body["kyc_status"], "not_submitted");
    assert_eq!(body["is_admin"], false);
}

#[rstest]
#[case::plain_user(false, false, false, StatusCode::FORBIDDEN, None)]
#[case::full_admin(true, false, false, StatusCode::OK, Some("all"))]
#[case::manager(false, true, false, StatusCode::OK, Some("only"))]
#[case::superior_manager(true, false, true, StatusCode::OK, Some("only"))]
#[tokio::test]
async fn test_admin_scope_by_tier(
    #[case] is_admin: bool,
    #[case] is_manager: bool,
    #[case] is_superiormanager: bool,
    #[case] expected: StatusCode,
    #[case] kind: Option<&str>,
) {
    let id = Uuid::now_v7();
    // Managers without assignments narrow to themselves.
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![role_row(id, is_admin, is_manager, is_superiormanager)]])
        .append_query_results([Vec::<BTreeMap<String, Value>>::new()])
        .into_connection();
    let (status, body) = send(
        app(Arc::new(db)),
        request(Method::GET, "/api/v1/admin/scope", Some(&token(id)), None),
    )
    .await;

    assert_eq!(status, expected);
    match kind {
        Some(kind) => {
            assert_eq!(body["scope"]["kind"], kind);
            if kind == "only" {
                assert_eq!(body["scope"]["user_ids"], json!([id.to_string()]));
            }
        }
        None => assert_eq!(body["message"], "Admin access required"),
    }
}

#[tokio::test]
async fn test_invalid_balance_is_rejected_before_any_write() {
    let id = Uuid::now_v7();
    let db = Arc::new(
        MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user_row(id, true, false)]])
            .into_connection(),
    );
    let uri = format!("/api/v1/admin/users/{}/balances/usd", Uuid::now_v7());
    let (status, body) = send(
        app(Arc::clone(&db)),
        request(Method::PUT, &uri, Some(&token(id)), Some(json!({ "amount": "-5" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    // Only the identity lookup reached the database.
    assert_eq!(transaction_log(db).len(), 1);
}

#[tokio::test]
async fn test_unknown_currency_is_rejected() {
    let id = Uuid::now_v7();
    let db = MockDatabase::new(DatabaseBackend::Postgres)
        .append_query_results([vec![user_row(id, true, false)]])
        .into_connection();
    let uri = format!("/api/v1/admin/users/{}/balances/jpy", Uuid::now_v7());
    let (status, _) = send(
        app(Arc::new(db)),
        request(Method::PUT, &uri, Some(&token(id)), Some(json!({ "amount": "5" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_manager_cannot_touch_unassigned_user() {
    let manager = Uuid::now_v7();
    let db = Arc::new(
        MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user_row(manager, false, true)]])
            .append_query_results([Vec::<BTreeMap<String, Value>>::new()])
            .into_connection(),
    );
    let uri = format!("/api/v1/admin/users/{}/balances/euro", Uuid::now_v7());
    let (status, body) = send(
        app(Arc::clone(&db)),
        request(Method::PUT, &uri, Some(&token(manager)), Some(json!({ "amount": "10" }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["message"], "You don't have permission to act on this user");
    // Identity and assignment lookups only; nothing was written.
    assert_eq!(transaction_log(db).len(), 2);
}

#[tokio::test]
async fn test_chat_body_validated_before_lookup() {
    let id = Uuid::now_v7();
    let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
    let uri = format!("/api/v1/chat/sessions/{}/messages", Uuid::now_v7());
    let (status, _) = send(
        app(Arc::clone(&db)),
        request(Method::POST, &uri, Some(&token(id)), Some(json!({ "body": "   " }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(transaction_log(db).is_empty());
}

#[rstest]
#[case::reply(Method::POST, Some(json!({ "body": "Still there?" })))]
#[case::poll(Method::GET, None)]
#[tokio::test]
async fn test_claiming_admin_out_of_scope_loses_the_session(
    #[case] method: Method,
    #[case] body: Option<serde_json::Value>,
) {
    let manager = Uuid::now_v7();
    let customer = Uuid::now_v7();
    let now: DateTimeWithTimeZone = Utc::now().into();
    let session = chat_sessions::Model {
        id: Uuid::now_v7(),
        user_id: customer,
        admin_id: Some(manager),
        status: "open".into(),
        created_at: now,
        updated_at: now,
    };
    // The customer is no longer assigned to the manager who claimed the session.
    let db = Arc::new(
        MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![session.clone()]])
            .append_query_results([vec![user_row(manager, false, true)]])
            .append_query_results([Vec::<BTreeMap<String, Value>>::new()])
            .into_connection(),
    );
    let uri = format!("/api/v1/chat/sessions/{}/messages", session.id);
    let (status, response) = send(
        app(Arc::clone(&db)),
        request(method, &uri, Some(&token(manager)), body),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(response["message"], "You don't have permission to act on this user");
    // Session, identity and assignment lookups; no message was read or written.
    assert_eq!(transaction_log(db).len(), 3);
}

mod common;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{Duration, Utc};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use apys::config::ApiConfig;
use apys::credentials::CredentialRecord;
use apys::error::ApiError;
use apys::iol::IolClient;
use apys::primary::PrimaryClient;
use apys::token::{RefreshPolicy, Token, EXPIRY_FORMAT};

async fn iol_token(
    State(calls): State<Arc<AtomicUsize>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    calls.fetch_add(1, Ordering::SeqCst);
    if form.get("grant_type").map(String::as_str) != Some("password")
        || form.get("password").map(String::as_str) != Some("secret")
    {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"}))).into_response();
    }
    let expires = (Utc::now() + Duration::days(3)).format(EXPIRY_FORMAT).to_string();
    Json(json!({
        "access_token": "fresh",
        "refresh_token": "refresh",
        "token_type": "bearer",
        ".expires": expires
    }))
    .into_response()
}

async fn iol_account(headers: HeaderMap) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if auth == "Bearer fresh" {
        Json(json!({"cuentas": []})).into_response()
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "invalid token"}))).into_response()
    }
}

async fn iol_server() -> (IolClient, Arc<AtomicUsize>) {
    iol_server_with_password("secret").await
}

async fn iol_server_with_password(password: &str) -> (IolClient, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/token", post(iol_token))
        .route("/api/v2/estadocuenta", get(iol_account))
        .with_state(calls.clone());
    let addr = common::spawn(app).await;

    let client = IolClient::new(&ApiConfig::new(format!("http://{}", addr)), "user", password).unwrap();
    (client, calls)
}

#[tokio::test]
async fn test_fresh_token_is_reused() {
    let (client, calls) = iol_server().await;
    let cached = Token::new("cached", Utc::now() + Duration::days(3));

    let token = client.fresh_token(Some(cached.clone())).await.unwrap();

    assert_eq!(token, cached);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_expired_token_triggers_one_login() {
    let (client, calls) = iol_server().await;
    let stale = Token::new("stale", Utc::now() - Duration::hours(1));

    let token = client.fresh_token(Some(stale)).await.unwrap();

    assert_eq!(token.access_token, "fresh");
    assert!(token.expires > Utc::now() + Duration::days(2));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_same_day_expiry_is_refreshed() {
    let (client, calls) = iol_server().await;
    let expiring = Token::new("expiring", Utc::now() + Duration::hours(2));

    let token = client.fresh_token(Some(expiring)).await.unwrap();

    assert_eq!(token.access_token, "fresh");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_custom_margin_keeps_short_lived_token() {
    let (client, calls) = iol_server().await;
    let client = client.with_policy(RefreshPolicy::with_margin(Duration::hours(1)));
    let expiring = Token::new("expiring", Utc::now() + Duration::hours(2));

    let token = client.fresh_token(Some(expiring.clone())).await.unwrap();

    assert_eq!(token, expiring);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_token_logs_in() {
    let (client, calls) = iol_server().await;

    let token = client.fresh_token(None).await.unwrap();

    assert_eq!(token.access_token, "fresh");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_login_reports_status_and_body() {
    let (client, calls) = iol_server_with_password("wrong").await;

    let err = client.fresh_token(None).await.unwrap_err();

    let api_err = err.downcast_ref::<ApiError>().unwrap();
    assert_eq!(api_err.status(), Some(400));
    assert_eq!(api_err.message(), Some("invalid_grant"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unauthorized_exposes_status_and_message() {
    let (client, _) = iol_server().await;
    let bogus = Token::new("bogus", Utc::now() + Duration::days(3));

    let err = client
        .get_generic(&bogus, "api/v2/estadocuenta", &[])
        .await
        .unwrap_err();

    let api_err = err.downcast_ref::<ApiError>().unwrap();
    assert_eq!(api_err.status(), Some(401));
    assert_eq!(api_err.message(), Some("invalid token"));
}

#[tokio::test]
async fn test_expired_token_is_refused_before_sending() {
    let (client, _) = iol_server().await;
    let stale = Token::new("fresh", Utc::now() - Duration::minutes(5));

    let err = client
        .get_generic(&stale, "api/v2/estadocuenta", &[])
        .await
        .unwrap_err();

    assert!(err.to_string().contains("expired"));
}

#[tokio::test]
async fn test_stale_token_works_after_fresh_token() {
    let (client, calls) = iol_server().await;
    let stale = Token::new("fresh", Utc::now() - Duration::minutes(5));

    let refused = client.get_generic(&stale, "api/v2/estadocuenta", &[]).await;
    assert!(refused.unwrap_err().to_string().contains("fresh_token"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let token = client.fresh_token(Some(stale)).await.unwrap();
    let payload = client
        .get_generic(&token, "api/v2/estadocuenta", &[])
        .await
        .unwrap();
    assert_eq!(payload.into_json().unwrap(), json!({"cuentas": []}));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_credential_file_round_trip() {
    let (client, calls) = iol_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("iol.json");
    CredentialRecord::new("user", "secret").save(&path).unwrap();

    let record = CredentialRecord::load(&path).unwrap();
    let token = client.fresh_token(record.token()).await.unwrap();
    record.with_token(&token).save(&path).unwrap();

    let reloaded = CredentialRecord::load(&path).unwrap();
    let cached = reloaded.token().unwrap();
    assert_eq!(cached.access_token, "fresh");

    // Second run reuses the stored token
    let again = client.fresh_token(Some(cached)).await.unwrap();
    assert_eq!(again.access_token, "fresh");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let payload = client
        .get_generic(&again, "api/v2/estadocuenta", &[])
        .await
        .unwrap();
    assert_eq!(payload.into_json().unwrap(), json!({"cuentas": []}));
}

async fn primary_login(headers: HeaderMap) -> Response {
    let user = headers.get("x-username").and_then(|v| v.to_str().ok());
    let password = headers.get("x-password").and_then(|v| v.to_str().ok());
    if user == Some("trader") && password == Some("pw") {
        ([("X-Auth-Token", "primary-token")], "").into_response()
    } else {
        (StatusCode::UNAUTHORIZED, "bad credentials").into_response()
    }
}

async fn primary_segments(headers: HeaderMap) -> Response {
    match headers.get("x-auth-token").and_then(|v| v.to_str().ok()) {
        Some("primary-token") => Json(json!({
            "status": "OK",
            "segments": [
                {"marketSegmentId": "DDF", "marketId": "ROFX"},
                {"marketSegmentId": "MERV", "marketId": "ROFX"}
            ]
        }))
        .into_response(),
        _ => (StatusCode::UNAUTHORIZED, Json(json!({"message": "Unauthorized"}))).into_response(),
    }
}

async fn primary_detail() -> Json<serde_json::Value> {
    Json(json!({"status": "ERROR", "description": "Instrument not found"}))
}

async fn primary_server() -> String {
    let app = Router::new()
        .route("/auth/getToken", post(primary_login))
        .route("/rest/segment/all", get(primary_segments))
        .route("/rest/instruments/detail", get(primary_detail));
    let addr = common::spawn(app).await;
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_primary_login_reads_header_token() {
    let base = primary_server().await;
    let client = PrimaryClient::new(&ApiConfig::new(base), "trader", "pw").unwrap();

    let token = client.fresh_token(None).await.unwrap();
    assert_eq!(token.access_token, "primary-token");
    assert!(token.expires > Utc::now() + Duration::hours(23));

    let segments = client.segments(&token).await.unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(
        segments.get(&"DDF".into(), "market"),
        Some(&apys::table::Cell::from("ROFX"))
    );
}

#[tokio::test]
async fn test_primary_bad_credentials() {
    let base = primary_server().await;
    let client = PrimaryClient::new(&ApiConfig::new(base), "trader", "wrong").unwrap();

    let err = client.fresh_token(None).await.unwrap_err();
    let api_err = err.downcast_ref::<ApiError>().unwrap();
    assert_eq!(api_err.status(), Some(401));
    assert_eq!(api_err.message(), Some("bad credentials"));
}

#[tokio::test]
async fn test_primary_error_status_in_body() {
    let base = primary_server().await;
    let client = PrimaryClient::new(&ApiConfig::new(base), "trader", "pw").unwrap();
    let token = client.fresh_token(None).await.unwrap();

    let err = client
        .instrument_detail(&token, "DLR/NOPE", "ROFX")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Instrument not found"));
}

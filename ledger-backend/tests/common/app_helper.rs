// tests/common/app_helper.rs

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use ledger_backend::{
    api::{create_router, AppState},
    config::{AppConfig, GatewayConfig},
};
use serde::Serialize;
use serde_json::Value;

use crate::common;

pub const TEST_SIGNATURE_KEY: &str = "test-signature-key";
pub const TEST_NOTIFICATION_URL: &str = "https://ledger.example.com/webhooks/payments";

/// 署名検証なしのアプリのセットアップ
pub async fn setup_app() -> (Router, AppState, common::db::TestDatabase) {
    common::init_test_env();
    let db = common::db::TestDatabase::new().await;
    let config = AppConfig::for_testing(db.url.clone());
    let app_state = AppState::new(db.connection.clone(), config);
    (create_router(app_state.clone()), app_state, db)
}

/// Webhook 署名検証付きのアプリのセットアップ
pub async fn setup_signed_app() -> (Router, AppState, common::db::TestDatabase) {
    common::init_test_env();
    let db = common::db::TestDatabase::new().await;
    let mut config = AppConfig::for_testing(db.url.clone());
    config.gateway = GatewayConfig {
        signature_key: Some(TEST_SIGNATURE_KEY.to_string()),
        notification_url: TEST_NOTIFICATION_URL.to_string(),
        default_currency: "USD".to_string(),
    };
    let app_state = AppState::new(db.connection.clone(), config);
    (create_router(app_state.clone()), app_state, db)
}

/// JSONリクエストを作成
pub fn json_request<T: Serialize>(method: &str, uri: &str, body: &T) -> Request<Body> {
    Request::builder()
        .method(Method::from_bytes(method.as_bytes()).unwrap())
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::from_bytes(method.as_bytes()).unwrap())
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Webhook リクエスト（生のボディと任意の署名）
pub fn webhook_request(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

use crate::common::app_helper::{
    body_json, empty_request, json_request, setup_app, setup_signed_app, webhook_request,
    TEST_NOTIFICATION_URL, TEST_SIGNATURE_KEY,
};
use crate::common::test_data::{company_request_body, payment_payload, seed_subscription};
use axum::http::StatusCode;
use ledger_backend::service::webhook::sign_payload;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _app_state, _db) = setup_app().await;

    let response = app.oneshot(empty_request("GET", "/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["database"], true);
}

#[tokio::test]
async fn test_company_lifecycle_over_http() {
    let (app, _app_state, _db) = setup_app().await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/companies", &company_request_body("Acme")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/companies", &company_request_body("Acme")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let mut invalid = company_request_body("Bad Mail");
    invalid["contact"]["email"] = json!("not-an-email");
    let response = app
        .clone()
        .oneshot(json_request("POST", "/companies", &invalid))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/companies/Acme"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", "/companies/Acme"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(empty_request("GET", "/companies/Acme"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_subscription_for_missing_company_returns_422() {
    let (app, _app_state, _db) = setup_app().await;

    let body = json!({
        "company_name": "Ghost Corp",
        "unit_kind": "word",
        "units_per_cycle": 10000,
        "price_per_unit": "0.08",
        "price": 80000,
        "currency": "USD"
    });
    let response = app
        .oneshot(json_request("POST", "/subscriptions", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["error_type"], "reference_not_found");
}

#[tokio::test]
async fn test_usage_endpoint_and_insufficient_units() {
    let (app, app_state, _db) = setup_app().await;
    let (subscription, _) = seed_subscription(&app_state, "Acme", 10, 0).await;
    let uri = format!("/subscriptions/{}/usage", subscription.id);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &uri,
            &json!({ "units": 4, "idempotency_key": "job-7" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["period"]["units_remaining"], 6);
    assert_eq!(body["data"]["replayed"], false);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &uri,
            &json!({ "units": 4, "idempotency_key": "job-7" }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["replayed"], true);

    let response = app
        .clone()
        .oneshot(json_request("POST", &uri, &json!({ "units": 20 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error_type"], "insufficient_units");
    assert_eq!(body["details"]["available"], 6);

    let response = app
        .oneshot(empty_request(
            "GET",
            &format!("/subscriptions/{}/summary", subscription.id),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["total_remaining"], 6);
}

#[tokio::test]
async fn test_malformed_subscription_id_returns_400() {
    let (app, _app_state, _db) = setup_app().await;

    let response = app
        .oneshot(empty_request("GET", "/subscriptions/not-a-uuid/summary"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_without_transaction_id_returns_400() {
    let (app, _app_state, _db) = setup_app().await;

    let response = app
        .oneshot(webhook_request(r#"{"status":"completed","amount":100}"#, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_replay_returns_success() {
    let (app, app_state, _db) = setup_app().await;
    let body = payment_payload("sq_http", "completed", 1200).to_string();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(webhook_request(&body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let payments = app_state
        .reporting_service
        .list_payments(&Default::default(), &Default::default(), Default::default())
        .await
        .unwrap();
    assert_eq!(payments.total, 1);
}

#[tokio::test]
async fn test_webhook_signature_is_enforced() {
    let (app, _app_state, _db) = setup_signed_app().await;
    let body = payment_payload("sq_signed", "completed", 1200).to_string();

    let response = app
        .clone()
        .oneshot(webhook_request(&body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(webhook_request(&body, Some("aW52YWxpZA==")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let signature = sign_payload(TEST_SIGNATURE_KEY, TEST_NOTIFICATION_URL, body.as_bytes()).unwrap();
    let response = app
        .oneshot(webhook_request(&body, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["data"]["event"], "payment");
    assert_eq!(body["data"]["outcome"]["kind"], "created");
}

#[tokio::test]
async fn test_integrity_admin_endpoints() {
    let (app, _app_state, _db) = setup_app().await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/admin/integrity/audit"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(empty_request("POST", "/admin/integrity/schema-rules"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(empty_request("POST", "/admin/integrity/index-policy"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["dropped"], json!([]));
    assert_eq!(body["data"]["created"], json!([]));
}

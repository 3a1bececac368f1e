// src/api/handlers/payment_handler.rs

use crate::api::dto::payment_dto::{PaymentListQuery, RelinkQuery};
use crate::api::AppState;
use crate::domain::payment_model;
use crate::error::AppResult;
use crate::service::reconciler_service::{RelinkReport, WebhookAck};
use crate::service::webhook::SIGNATURE_HEADER;
use crate::types::{ApiResponse, PaginatedResponse};
use axum::{
    body::Bytes,
    extract::{Json, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use tracing::info;

/// 決済ゲートウェイからの通知。署名は生のボディに対して検証する
pub async fn payment_webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let ack = app_state
        .reconciler_service
        .handle_webhook(&body, signature)
        .await?;

    Ok(Json(ApiResponse::success(ack)))
}

pub async fn list_payments_handler(
    State(app_state): State<AppState>,
    Query(query): Query<PaymentListQuery>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<payment_model::Model>>>> {
    let (filter, pagination, sort) = query.into_parts()?;
    let payments = app_state
        .reporting_service
        .list_payments(&filter, &pagination, sort)
        .await?;
    Ok(Json(ApiResponse::success(payments)))
}

/// 利用記録に紐付いていない完了済み支払いを再連携する
pub async fn relink_payments_handler(
    State(app_state): State<AppState>,
    Query(query): Query<RelinkQuery>,
) -> AppResult<Json<ApiResponse<RelinkReport>>> {
    let report = app_state
        .reconciler_service
        .relink_completed_payments(query.limit())
        .await?;

    info!(
        scanned = report.scanned,
        linked = report.linked,
        failed = report.failed.len(),
        "Relink sweep requested"
    );

    Ok(Json(ApiResponse::success(report)))
}

pub fn payment_router(app_state: AppState) -> Router {
    Router::new()
        .route("/webhooks/payments", post(payment_webhook_handler))
        .route("/payments", get(list_payments_handler))
        .route("/payments/relink", post(relink_payments_handler))
        .with_state(app_state)
}

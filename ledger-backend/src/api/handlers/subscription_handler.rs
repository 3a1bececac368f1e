// src/api/handlers/subscription_handler.rs

use super::UuidPath;
use crate::api::dto::subscription_dto::*;
use crate::api::AppState;
use crate::domain::subscription_model;
use crate::domain::usage_period_model;
use crate::error::AppResult;
use crate::service::usage_ledger_service::{UsageRequest, UsageSummary};
use crate::types::{ApiResponse, PaginatedResponse};
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Router,
};
use chrono::Utc;
use tracing::info;
use validator::Validate;

/// サブスクリプション作成。会社が存在しなければ 422
pub async fn create_subscription_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<subscription_model::Model>>)> {
    payload.validate()?;

    let subscription = app_state
        .ledger_service
        .create_subscription(payload.into_new_subscription(Utc::now()))
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(subscription))))
}

pub async fn list_subscriptions_handler(
    State(app_state): State<AppState>,
    Query(query): Query<SubscriptionListQuery>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<subscription_model::Model>>>> {
    let (filter, pagination, sort) = query.into_parts()?;
    let subscriptions = app_state
        .reporting_service
        .list_subscriptions(&filter, &pagination, sort)
        .await?;
    Ok(Json(ApiResponse::success(subscriptions)))
}

pub async fn get_summary_handler(
    State(app_state): State<AppState>,
    UuidPath(subscription_id): UuidPath,
) -> AppResult<Json<ApiResponse<UsageSummary>>> {
    let summary = app_state.ledger_service.get_summary(subscription_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

pub async fn add_usage_period_handler(
    State(app_state): State<AppState>,
    UuidPath(subscription_id): UuidPath,
    Json(payload): Json<AddUsagePeriodRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<usage_period_model::Model>>)> {
    payload.validate()?;

    let period = app_state
        .ledger_service
        .add_usage_period(
            subscription_id,
            payload.period_start,
            payload.period_end,
            payload.units_allocated,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(period))))
}

/// 利用記録。不足時は 409 で、期間は変更されない
pub async fn record_usage_handler(
    State(app_state): State<AppState>,
    UuidPath(subscription_id): UuidPath,
    Json(payload): Json<RecordUsageRequest>,
) -> AppResult<Json<ApiResponse<RecordUsageResponse>>> {
    payload.validate()?;

    let response = match payload.idempotency_key {
        Some(key) => {
            let outcome = app_state
                .ledger_service
                .record_usage_once(
                    &format!("usage:{}", key.trim()),
                    UsageRequest {
                        subscription_id: Some(subscription_id),
                        units: payload.units,
                        prefer_promotional: payload.prefer_promotional,
                        ..Default::default()
                    },
                )
                .await?;
            RecordUsageResponse {
                period: outcome.period,
                transaction: Some(outcome.transaction),
                replayed: outcome.replayed,
            }
        }
        None => {
            let period = app_state
                .ledger_service
                .record_usage(subscription_id, payload.units, payload.prefer_promotional)
                .await?;
            RecordUsageResponse {
                period: Some(period),
                transaction: None,
                replayed: false,
            }
        }
    };

    Ok(Json(ApiResponse::success(response)))
}

pub async fn update_status_handler(
    State(app_state): State<AppState>,
    UuidPath(subscription_id): UuidPath,
    Json(payload): Json<UpdateSubscriptionStatusRequest>,
) -> AppResult<Json<ApiResponse<subscription_model::Model>>> {
    let subscription = app_state
        .ledger_service
        .set_subscription_status(subscription_id, payload.status)
        .await?;
    Ok(Json(ApiResponse::success(subscription)))
}

/// 期限切れスイープ
pub async fn expire_subscriptions_handler(
    State(app_state): State<AppState>,
    payload: Option<Json<ExpireSubscriptionsRequest>>,
) -> AppResult<Json<ApiResponse<ExpireSubscriptionsResponse>>> {
    let as_of = payload
        .and_then(|Json(request)| request.as_of)
        .unwrap_or_else(Utc::now);

    let expired = app_state.ledger_service.expire_subscriptions(as_of).await?;
    info!(expired, as_of = %as_of, "Expire sweep requested");

    Ok(Json(ApiResponse::success(ExpireSubscriptionsResponse {
        as_of,
        expired,
    })))
}

pub fn subscription_router(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/subscriptions",
            post(create_subscription_handler).get(list_subscriptions_handler),
        )
        .route("/subscriptions/expire", post(expire_subscriptions_handler))
        .route("/subscriptions/{id}/summary", get(get_summary_handler))
        .route("/subscriptions/{id}/periods", post(add_usage_period_handler))
        .route("/subscriptions/{id}/usage", post(record_usage_handler))
        .route("/subscriptions/{id}/status", patch(update_status_handler))
        .with_state(app_state)
}

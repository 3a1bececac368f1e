// src/api/handlers/work_item_handler.rs

use crate::api::dto::report_dto::TransactionListQuery;
use crate::api::dto::work_item_dto::CompleteWorkItemRequest;
use crate::api::AppState;
use crate::domain::translation_transaction_model;
use crate::error::AppResult;
use crate::service::usage_ledger_service::UsageOutcome;
use crate::types::{ApiResponse, PaginatedResponse};
use axum::{
    extract::{Json, Query, State},
    routing::{get, post},
    Router,
};
use validator::Validate;

/// 翻訳作業の完了。work_item_id ごとに一度だけ課金される
pub async fn complete_work_item_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<CompleteWorkItemRequest>,
) -> AppResult<Json<ApiResponse<UsageOutcome>>> {
    payload.validate()?;

    let outcome = app_state
        .translation_service
        .complete_work_item(payload.into())
        .await?;

    let response = if outcome.replayed {
        ApiResponse::success(outcome).with_message("Work item already recorded")
    } else {
        ApiResponse::success(outcome)
    };
    Ok(Json(response))
}

pub async fn list_transactions_handler(
    State(app_state): State<AppState>,
    Query(query): Query<TransactionListQuery>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<translation_transaction_model::Model>>>> {
    let company_name = query
        .company_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let transactions = app_state
        .translation_service
        .list_transactions(company_name, &query.pagination())
        .await?;
    Ok(Json(ApiResponse::success(transactions)))
}

pub fn work_item_router(app_state: AppState) -> Router {
    Router::new()
        .route("/work-items/complete", post(complete_work_item_handler))
        .route("/transactions", get(list_transactions_handler))
        .with_state(app_state)
}

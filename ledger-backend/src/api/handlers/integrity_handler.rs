// src/api/handlers/integrity_handler.rs

use crate::api::AppState;
use crate::domain::integrity::{AuditReport, IndexPolicyReport, SchemaRulesReport};
use crate::error::AppResult;
use crate::types::ApiResponse;
use axum::{
    extract::{Json, State},
    routing::{get, post},
    Router,
};

/// 孤立したサブスクリプションの検出。読み取りのみ
pub async fn audit_handler(
    State(app_state): State<AppState>,
) -> AppResult<Json<ApiResponse<AuditReport>>> {
    let report = app_state.integrity_service.audit().await?;
    let message = if report.is_clean() {
        "No orphaned subscriptions"
    } else {
        "Orphaned subscriptions found"
    };
    Ok(Json(ApiResponse::success(report).with_message(message)))
}

/// スキーマルールの適用。違反があれば 409 で何も変更しない
pub async fn apply_schema_rules_handler(
    State(app_state): State<AppState>,
) -> AppResult<Json<ApiResponse<SchemaRulesReport>>> {
    let report = app_state.integrity_service.apply_schema_rules().await?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn fix_index_policy_handler(
    State(app_state): State<AppState>,
) -> AppResult<Json<ApiResponse<IndexPolicyReport>>> {
    let report = app_state.integrity_service.fix_index_policy().await?;
    Ok(Json(ApiResponse::success(report)))
}

pub fn integrity_router(app_state: AppState) -> Router {
    Router::new()
        .route("/admin/integrity/audit", get(audit_handler))
        .route(
            "/admin/integrity/schema-rules",
            post(apply_schema_rules_handler),
        )
        .route(
            "/admin/integrity/index-policy",
            post(fix_index_policy_handler),
        )
        .with_state(app_state)
}

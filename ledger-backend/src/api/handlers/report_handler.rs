// src/api/handlers/report_handler.rs

use crate::api::dto::report_dto::StatementQuery;
use crate::api::AppState;
use crate::error::AppResult;
use crate::service::reporting_service::{CompanyStatement, DashboardMetrics};
use crate::types::ApiResponse;
use axum::{
    extract::{Json, Path, Query, State},
    routing::get,
    Router,
};

pub async fn dashboard_handler(
    State(app_state): State<AppState>,
) -> AppResult<Json<ApiResponse<DashboardMetrics>>> {
    let metrics = app_state.reporting_service.dashboard_metrics().await?;
    Ok(Json(ApiResponse::success(metrics)))
}

/// 会社ごとの明細書
pub async fn company_statement_handler(
    State(app_state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<StatementQuery>,
) -> AppResult<Json<ApiResponse<CompanyStatement>>> {
    let statement = app_state
        .reporting_service
        .company_statement(&name, query.from, query.to)
        .await?;
    Ok(Json(ApiResponse::success(statement)))
}

pub fn report_router(app_state: AppState) -> Router {
    Router::new()
        .route("/reports/dashboard", get(dashboard_handler))
        .route(
            "/reports/companies/{name}/statement",
            get(company_statement_handler),
        )
        .with_state(app_state)
}

// src/api/handlers/company_handler.rs

use crate::api::dto::company_dto::CreateCompanyRequest;
use crate::api::AppState;
use crate::domain::company_model;
use crate::error::AppResult;
use crate::types::{ApiResponse, PaginatedResponse, PaginationQuery};
use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use validator::Validate;

/// 会社作成
pub async fn create_company_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateCompanyRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<company_model::Model>>)> {
    payload.validate()?;

    let company = app_state
        .company_service
        .create_company(payload.into())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(company))))
}

pub async fn list_companies_handler(
    State(app_state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> AppResult<Json<ApiResponse<PaginatedResponse<company_model::Model>>>> {
    let companies = app_state.company_service.list_companies(&query).await?;
    Ok(Json(ApiResponse::success(companies)))
}

pub async fn get_company_handler(
    State(app_state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<Json<ApiResponse<company_model::Model>>> {
    let company = app_state.company_service.get_company(&name).await?;
    Ok(Json(ApiResponse::success(company)))
}

/// 会社削除（有効なサブスクリプションがあれば 409）
pub async fn delete_company_handler(
    State(app_state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<StatusCode> {
    app_state.company_service.delete_company(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn company_router(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/companies",
            post(create_company_handler).get(list_companies_handler),
        )
        .route(
            "/companies/{name}",
            get(get_company_handler).delete(delete_company_handler),
        )
        .with_state(app_state)
}

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::{api::AppState, error::AppError, types::ApiResponse};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: String,
    pub database: bool,
    pub version: &'static str,
}

pub async fn health_handler(
    State(app_state): State<AppState>,
) -> Result<Json<ApiResponse<HealthResponse>>, AppError> {
    let database = app_state.db.ping().await.is_ok();
    if !database {
        tracing::warn!("Health check: database ping failed");
    }

    Ok(Json(ApiResponse::success(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        environment: app_state.config.environment.clone(),
        database,
        version: env!("CARGO_PKG_VERSION"),
    })))
}

pub fn system_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(app_state)
}

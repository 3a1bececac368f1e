// src/api/handlers/mod.rs
pub mod company_handler;
pub mod integrity_handler;
pub mod payment_handler;
pub mod report_handler;
pub mod subscription_handler;
pub mod system_handler;
pub mod work_item_handler;

use crate::error::AppError;
use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use uuid::Uuid;

/// UUID パス抽出器（不正な形式は AppError の 400 で返す）
pub struct UuidPath(pub Uuid);

impl<S> FromRequestParts<S> for UuidPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(path_str) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::BadRequest("Invalid path parameter".to_string()))?;

        let uuid = Uuid::parse_str(&path_str)
            .map_err(|_| AppError::BadRequest(format!("Invalid UUID format: '{}'", path_str)))?;

        Ok(UuidPath(uuid))
    }
}
